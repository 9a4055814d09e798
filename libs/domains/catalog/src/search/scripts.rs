//! Painless sources for server-side partial updates.
//!
//! Every script reads its inputs from `params.products`, keyed by product id,
//! and marks documents without an entry as `noop`.

/// Applies one bulk-edit field. `params.field` selects the branch.
pub(crate) const BULK_UPDATE: &str = r#"
def patch = params.products[ctx._source.id];
if (patch == null) {
    ctx.op = 'noop';
} else if (params.field == 'name') {
    ctx._source.name = patch.name;
} else if (params.field == 'measurement_value') {
    ctx._source.measurement_unit = patch.measurement_unit;
} else if (params.field == 'category') {
    if (ctx._source.categories == null) {
        ctx._source.categories = [];
    }
    for (def category : patch.categories) {
        boolean present = false;
        for (def existing : ctx._source.categories) {
            if (existing.id == category.id) {
                present = true;
            }
        }
        if (!present) {
            ctx._source.categories.add(category);
        }
    }
} else if (params.field == 'low_stock') {
    def values = ctx._source.measurement_values;
    if (values != null) {
        for (def shopId : params.shop_ids) {
            if (values[shopId] != null) {
                values[shopId].small_left = patch.low_stock;
            }
        }
    }
}
"#;

/// Writes each given value into its own shop slot of `params.target`
pub(crate) const UPSERT_SHOP_SLOTS: &str = r#"
def values = params.products[ctx._source.id];
if (values == null) {
    ctx.op = 'noop';
} else {
    if (ctx._source[params.target] == null) {
        ctx._source[params.target] = [:];
    }
    for (def value : values) {
        ctx._source[params.target][value.shop_id] = value;
    }
}
"#;

/// Stock valuation of one document: sum of amount times `params.price_field`
/// over shops that have both a stock and a price entry
pub(crate) const TOTAL_PRICE: &str = r#"
double total = 0;
def values = params._source['measurement_values'];
def prices = params._source['shop_prices'];
if (values != null && prices != null) {
    for (def entry : values.entrySet()) {
        def value = entry.getValue();
        def price = prices[entry.getKey()];
        if (value != null && price != null && value.amount != null && price[params.price_field] != null) {
            total += value.amount * price[params.price_field];
        }
    }
}
return total;
"#;
