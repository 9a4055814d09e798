use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::filters::filter_clause;
use super::scripts::TOTAL_PRICE;
use crate::error::CatalogResult;
use crate::models::{Page, ProductQuery, Sort, SortOrder};

const DEFAULT_SORT_FIELD: &str = "updated_at.keyword";
const SEARCH_FIELDS: [&str; 3] = ["sku", "name", "barcodes"];

/// Characters with meaning in `query_string` syntax
const RESERVED: &[char] = &[
    '\\', '+', '-', '=', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '/',
];

/// Make user text safe for `query_string`: reserved characters are escaped,
/// `<` and `>` (which cannot be escaped) are dropped.
pub fn escape_query_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.trim().chars() {
        match c {
            '<' | '>' => {}
            c if RESERVED.contains(&c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn company_term(company_id: Uuid) -> Value {
    json!({ "term": { "company_id.keyword": { "value": company_id } } })
}

pub(crate) fn ids_terms(ids: &[Uuid]) -> Value {
    json!({ "terms": { "id.keyword": ids } })
}

/// Tenant's documents among `ids`
pub(crate) fn ids_query(company_id: Uuid, ids: &[Uuid]) -> Value {
    json!({ "bool": { "must": [company_term(company_id), ids_terms(ids)] } })
}

fn sort_clause(sort: Option<&Sort>) -> Value {
    let (field, order) = match sort {
        Some(sort) => {
            let field = match sort.field.as_str() {
                "name" | "sku" | "created_at" | "updated_at" => format!("{}.keyword", sort.field),
                other => other.to_string(),
            };
            (field, sort.order)
        }
        None => (DEFAULT_SORT_FIELD.to_string(), SortOrder::Desc),
    };

    let mut clause = Map::new();
    clause.insert(field, json!({ "order": order.as_ref() }));
    json!([clause])
}

fn total_aggregation(price_field: &str) -> Value {
    json!({
        "sum": {
            "script": {
                "lang": "painless",
                "source": TOTAL_PRICE,
                "params": { "price_field": price_field }
            },
            "missing": 0
        }
    })
}

/// Search body for a paginated listing
pub(crate) fn get_all_body(company_id: Uuid, query: &ProductQuery) -> CatalogResult<Value> {
    let mut must = vec![company_term(company_id)];
    let mut must_not = Vec::new();

    if !query.category_ids.is_empty() {
        must.push(json!({ "terms": { "categories.id.keyword": query.category_ids } }));
    }
    if !query.measurement_unit_ids.is_empty() {
        must.push(json!({ "terms": { "measurement_unit.id.keyword": query.measurement_unit_ids } }));
    }
    if !query.product_ids.is_empty() {
        must.push(ids_terms(&query.product_ids));
    }

    if let Some(text) = query.search.as_deref().map(escape_query_string).filter(|t| !t.is_empty()) {
        must.push(json!({ "query_string": { "query": text, "default_operator": "AND" } }));
    }

    for filter in &query.filters {
        let clause = filter_clause(filter)?;
        if filter.relation.is_positive() {
            must.push(clause);
        } else {
            must_not.push(clause);
        }
    }

    let mut body = Map::new();
    body.insert(
        "query".into(),
        json!({ "bool": { "must": must, "must_not": must_not } }),
    );
    body.insert("sort".into(), sort_clause(query.sort.as_ref()));
    body.insert("from".into(), json!(query.page.offset()));
    body.insert("size".into(), json!(query.page.limit));
    body.insert("track_total_hits".into(), json!(true));

    if query.with_totals {
        body.insert(
            "aggs".into(),
            json!({
                "total_retail_price": total_aggregation("retail_price"),
                "total_supply_price": total_aggregation("supply_price")
            }),
        );
    }

    Ok(Value::Object(body))
}

/// Search body for the sku/name/barcode lookup
pub(crate) fn search_body(company_id: Uuid, text: &str, page: Page) -> Value {
    let mut must = vec![company_term(company_id)];
    let text = escape_query_string(text);
    if !text.is_empty() {
        must.push(json!({
            "query_string": {
                "query": format!("*{}*", text),
                "fields": SEARCH_FIELDS,
                "default_operator": "AND"
            }
        }));
    }

    json!({
        "query": { "bool": { "must": must } },
        "sort": [{ "created_at.keyword": { "order": "desc" } }],
        "from": page.offset(),
        "size": page.limit,
        "track_total_hits": true
    })
}
