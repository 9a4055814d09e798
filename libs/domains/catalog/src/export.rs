//! CSV export of the products matching a listing query

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, EnumIter, IntoEnumIterator};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::FILE_BUCKET;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{Page, ProductDocument, ProductQuery, RequestContext};
use crate::service::CatalogService;

/// Documents fetched per index round trip
const EXPORT_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportField {
    ProductId,
    Name,
    Sku,
    MxikCode,
    Barcode,
    Category,
    RetailPrice,
    SupplyPrice,
    LowStock,
    Amount,
}

impl ExportField {
    /// Fields exported as one column per shop
    pub fn is_per_shop(&self) -> bool {
        matches!(
            self,
            ExportField::RetailPrice | ExportField::SupplyPrice | ExportField::LowStock | ExportField::Amount
        )
    }

    fn product_value(&self, document: &ProductDocument) -> String {
        match self {
            ExportField::ProductId => document.id.to_string(),
            ExportField::Name => document.name.clone(),
            ExportField::Sku => document.sku.clone(),
            ExportField::MxikCode => document.mxik_code.clone(),
            ExportField::Barcode => document.barcodes.join(", "),
            ExportField::Category => document
                .categories
                .iter()
                .map(|category| category.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            _ => String::new(),
        }
    }

    fn shop_value(&self, document: &ProductDocument, shop_id: &Uuid) -> String {
        let price = document.shop_prices.get(shop_id);
        let stock = document.measurement_values.get(shop_id);
        let value = match self {
            ExportField::RetailPrice => price.map(|p| p.retail_price),
            ExportField::SupplyPrice => price.map(|p| p.supply_price),
            ExportField::LowStock => stock.map(|v| v.small_left),
            ExportField::Amount => stock.map(|v| v.amount),
            _ => None,
        };
        value.map(|v| v.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    /// Selection; its page is ignored
    pub query: ProductQuery,
    /// Columns in order; all of them when empty
    pub fields: Vec<ExportField>,
    /// Shops of the per-shop columns; every shop seen in the result when empty
    pub shop_ids: Vec<Uuid>,
}

/// Shops present in the documents, by id
fn shops_of(documents: &[ProductDocument]) -> BTreeMap<Uuid, String> {
    let mut shops = BTreeMap::new();
    for document in documents {
        for (shop_id, value) in &document.measurement_values {
            shops.entry(*shop_id).or_insert_with(|| value.shop_name.clone());
        }
        for (shop_id, price) in &document.shop_prices {
            shops.entry(*shop_id).or_insert_with(|| price.shop_name.clone());
        }
    }
    shops
}

pub(crate) fn write_csv(
    documents: &[ProductDocument],
    fields: &[ExportField],
    shop_ids: &[Uuid],
) -> CatalogResult<Vec<u8>> {
    let fields: Vec<ExportField> = if fields.is_empty() {
        ExportField::iter().collect()
    } else {
        fields.to_vec()
    };

    let known = shops_of(documents);
    let shops: Vec<(Uuid, String)> = if shop_ids.is_empty() {
        known.into_iter().collect()
    } else {
        shop_ids
            .iter()
            .map(|id| (*id, known.get(id).cloned().unwrap_or_else(|| id.to_string())))
            .collect()
    };

    let (product_fields, shop_fields): (Vec<ExportField>, Vec<ExportField>) =
        fields.into_iter().partition(|field| !field.is_per_shop());

    let mut header: Vec<String> = product_fields.iter().map(|f| f.as_ref().to_string()).collect();
    for (_, shop_name) in &shops {
        for field in &shop_fields {
            header.push(format!("{}({})", field.as_ref(), shop_name));
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| CatalogError::dependency("csv export", "products", e);

    writer.write_record(&header).map_err(csv_error)?;
    for document in documents {
        let mut row: Vec<String> = product_fields.iter().map(|f| f.product_value(document)).collect();
        for (shop_id, _) in &shops {
            for field in &shop_fields {
                row.push(field.shop_value(document, shop_id));
            }
        }
        writer.write_record(&row).map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| CatalogError::dependency("csv export", "products", e.to_string()))
}

impl CatalogService {
    /// Every document matching the query, page by page
    async fn collect_documents(&self, ctx: RequestContext, mut query: ProductQuery) -> CatalogResult<Vec<ProductDocument>> {
        query.with_totals = false;
        let mut documents = Vec::new();
        let mut page = 1;

        loop {
            query.page = Page::new(page, EXPORT_PAGE_SIZE);
            let result = self.index.get_all(ctx.company_id, query.clone()).await?;
            let fetched = result.items.len();
            documents.extend(result.items);

            if fetched < EXPORT_PAGE_SIZE as usize || documents.len() as u64 >= result.total {
                return Ok(documents);
            }
            page += 1;
        }
    }

    /// Export matching products as CSV into object storage; returns its URL
    #[instrument(skip(self, request), fields(company_id = %ctx.company_id))]
    pub async fn export_products(&self, ctx: RequestContext, request: ExportRequest) -> CatalogResult<String> {
        let documents = self.collect_documents(ctx, request.query).await?;
        let bytes = write_csv(&documents, &request.fields, &request.shop_ids)?;

        let key = format!("{}.csv", Uuid::new_v4());
        let url = self.storage.put(FILE_BUCKET, &key, bytes, "text/csv").await?;

        info!(rows = documents.len(), %url, "Products exported");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductPage, ShopMeasurementValue, ShopPrice, ShortCategory};
    use crate::test_fixtures::TestDeps;

    fn document(name: &str, shop_id: Uuid) -> ProductDocument {
        ProductDocument {
            id: Uuid::new_v4(),
            name: name.into(),
            sku: "SKU-1".into(),
            barcodes: vec!["111".into(), "222".into()],
            categories: vec![
                ShortCategory {
                    name: "Dairy".into(),
                    ..Default::default()
                },
                ShortCategory {
                    name: "Fresh".into(),
                    ..Default::default()
                },
            ],
            measurement_values: BTreeMap::from([(
                shop_id,
                ShopMeasurementValue {
                    shop_id,
                    shop_name: "Main".into(),
                    amount: 12.0,
                    small_left: 3.0,
                    ..Default::default()
                },
            )]),
            shop_prices: BTreeMap::from([(
                shop_id,
                ShopPrice {
                    shop_id,
                    shop_name: "Main".into(),
                    retail_price: 9.5,
                    ..Default::default()
                },
            )]),
            ..Default::default()
        }
    }

    #[test]
    fn test_csv_columns_per_shop() {
        let shop_id = Uuid::new_v4();
        let bytes = write_csv(
            &[document("Milk, 1L", shop_id)],
            &[ExportField::Name, ExportField::Barcode, ExportField::Category, ExportField::RetailPrice, ExportField::Amount],
            &[],
        )
        .unwrap();

        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,barcode,category,retail_price(Main),amount(Main)");
        assert_eq!(lines[1], r#""Milk, 1L","111, 222","Dairy, Fresh",9.5,12"#);
    }

    #[test]
    fn test_requested_shop_without_values_is_blank() {
        let shop_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let bytes = write_csv(&[document("Milk", shop_id)], &[ExportField::Sku, ExportField::LowStock], &[other]).unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, format!("sku,low_stock({})\nSKU-1,\n", other));
    }

    #[tokio::test]
    async fn test_export_pages_through_index() {
        let shop_id = Uuid::new_v4();
        let first: Vec<ProductDocument> = (0..EXPORT_PAGE_SIZE).map(|_| document("Milk", shop_id)).collect();
        let second = vec![document("Kefir", shop_id)];

        let mut deps = TestDeps::default();
        deps.index.expect_get_all().times(2).returning(move |_, query| {
            let items = if query.page.page == 1 { first.clone() } else { second.clone() };
            Ok(ProductPage {
                items,
                total: EXPORT_PAGE_SIZE as u64 + 1,
                ..Default::default()
            })
        });
        deps.storage
            .expect_put()
            .withf(|bucket, key, bytes, content_type| {
                let rows = String::from_utf8_lossy(bytes).lines().count();
                bucket == FILE_BUCKET && key.ends_with(".csv") && content_type == "text/csv" && rows == 502
            })
            .times(1)
            .returning(|_, key, _, _| Ok(format!("https://cdn.example.com/file/{}", key)));

        let url = deps
            .service()
            .export_products(RequestContext::new(Uuid::new_v4(), Uuid::new_v4()), ExportRequest::default())
            .await
            .unwrap();
        assert!(url.ends_with(".csv"));
    }
}
