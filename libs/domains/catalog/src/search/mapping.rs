use serde_json::{Value, json};

/// Explicit mapping applied when the index is first created.
///
/// Per-shop maps are `flattened` so new shop ids never grow the mapping.
/// Timestamps stay strings and sort through their `keyword` sub-field.
pub(crate) fn index_mapping() -> Value {
    let timestamp = json!({
        "type": "text",
        "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
    });

    json!({
        "mappings": {
            "properties": {
                "measurement_values": { "type": "flattened" },
                "shop_prices": { "type": "flattened" },
                "created_at": timestamp,
                "updated_at": timestamp
            }
        }
    })
}
