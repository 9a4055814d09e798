//! Printable product labels rendered to an HTML sheet.
//!
//! Each product becomes one label card. Its fields are rendered
//! concurrently, one task per field, and joined back in field order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{CatalogConfig, FILE_BUCKET};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{DATE_TIME_FORMAT, ProductDocument, RequestContext};
use crate::service::CatalogService;

/// Field name rendered as the print time instead of a product value
pub const DATE_FIELD: &str = "date";

const QRCODE_LIB: &str = "https://cdn.jsdelivr.net/gh/davidshimjs/qrcodejs/qrcode.min.js";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFormat {
    pub font_size: u32,
    pub font_weight: u32,
}

/// What a label field shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LabelContent {
    Text { field_name: String, format: TextFormat },
    /// A fixed stored file, or the product's own image when `file_name` is empty
    Image {
        #[serde(default)]
        file_name: Option<String>,
    },
    /// QR code of a product value
    Barcode { field_name: String },
}

/// One positioned element of a label, sizes in px
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelField {
    pub id: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub bottom: u32,
    #[serde(default)]
    pub right: u32,
    pub content: LabelContent,
}

/// Card layout, sizes in mm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTemplate {
    pub width: u32,
    pub height: u32,
    pub fields: Vec<LabelField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderLabelsRequest {
    pub product_ids: Vec<Uuid>,
    /// Shop whose prices are printed
    pub shop_id: Option<Uuid>,
    #[serde(default)]
    pub currency: String,
    pub template: LabelTemplate,
}

/// Rendered markup of one field plus the script that draws its QR code
#[derive(Debug, Clone, Default, PartialEq)]
struct Fragment {
    html: String,
    script: String,
}

type LabelValues = BTreeMap<&'static str, String>;

/// Values a label can print for one product
fn label_values(document: &ProductDocument, shop_id: Option<Uuid>, currency: &str) -> LabelValues {
    let retail_price = shop_id
        .and_then(|shop_id| document.shop_prices.get(&shop_id))
        .map(|price| price.retail_price.to_string())
        .unwrap_or_default();
    let image = document
        .images
        .iter()
        .min_by_key(|image| image.sequence_number)
        .map(|image| image.file_name.clone())
        .unwrap_or_default();

    BTreeMap::from([
        ("name", document.name.clone()),
        ("sku", document.sku.clone()),
        ("mxik_code", document.mxik_code.clone()),
        ("barcode", document.barcodes.first().cloned().unwrap_or_default()),
        ("retail_price", retail_price),
        ("currency", currency.to_string()),
        ("image", image),
    ])
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn value<'a>(values: &'a LabelValues, field_name: &str) -> CatalogResult<&'a str> {
    values
        .get(field_name)
        .map(String::as_str)
        .ok_or_else(|| CatalogError::Validation(format!("unknown label field: {}", field_name)))
}

fn render_field(field: &LabelField, values: &LabelValues, config: &CatalogConfig, now: &str) -> CatalogResult<Fragment> {
    match &field.content {
        LabelContent::Text { field_name, format } => {
            let text = if field_name == DATE_FIELD {
                now
            } else {
                value(values, field_name)?
            };
            Ok(Fragment {
                html: format!(
                    r#"<div class="content" style="top: {}px; left: {}px; width: {}px; font-weight: {}; font-size: {}px;">{}</div>"#,
                    field.position.y,
                    field.position.x,
                    field.width,
                    format.font_weight,
                    format.font_size,
                    escape_html(text)
                ),
                script: String::new(),
            })
        }
        LabelContent::Image { file_name } => {
            let key = match file_name.as_deref().filter(|name| !name.is_empty()) {
                Some(name) => name,
                None => value(values, "image")?,
            };
            Ok(Fragment {
                html: format!(
                    r#"<div class="content" style="width: {}px; height: {}px; top: {}px; left: {}px;"><img src="{}" width="100%" height="100%" /></div>"#,
                    field.width,
                    field.height,
                    field.position.y,
                    field.position.x,
                    escape_html(&config.file_url(key))
                ),
                script: String::new(),
            })
        }
        LabelContent::Barcode { field_name } => {
            let text = value(values, field_name)?;
            let id = escape_html(&field.id);
            Ok(Fragment {
                html: format!(
                    r#"<div class="qrcode" id="{}" style="width: {}px; height: {}px; bottom: {}px; right: {}px;"></div>"#,
                    id, field.width, field.height, field.bottom, field.right
                ),
                script: format!(
                    "new QRCode(document.getElementById({}), {{ text: {}, width: {}, height: {}, colorDark: '#000', colorLight: '#fff', correctLevel: QRCode.CorrectLevel.H }});",
                    serde_json::Value::String(field.id.clone()),
                    serde_json::Value::String(text.to_string()),
                    field.width,
                    field.height
                ),
            })
        }
    }
}

/// Render one card, one task per field. The first failing field aborts the
/// remaining tasks.
async fn render_card(
    template: &LabelTemplate,
    values: Arc<LabelValues>,
    config: Arc<CatalogConfig>,
    now: Arc<str>,
) -> CatalogResult<Vec<Fragment>> {
    let mut tasks = JoinSet::new();
    for (index, field) in template.fields.iter().cloned().enumerate() {
        let values = Arc::clone(&values);
        let config = Arc::clone(&config);
        let now = Arc::clone(&now);
        tasks.spawn(async move { render_field(&field, &values, &config, &now).map(|fragment| (index, fragment)) });
    }

    let mut fragments = vec![Fragment::default(); template.fields.len()];
    while let Some(joined) = tasks.join_next().await {
        let rendered = joined.map_err(|e| CatalogError::dependency("label render", "field task", e));
        match rendered.and_then(|result| result) {
            Ok((index, fragment)) => fragments[index] = fragment,
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }
    Ok(fragments)
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8" />
<title>Labels</title>
<style>
* { margin: 0; padding: 0; box-sizing: border-box; font-family: "Inter", sans-serif; }
.wrapper { display: flex; flex-wrap: wrap; align-items: center; }
.label { border: 1px solid #000; position: relative; }
.label * { position: absolute; overflow: hidden; text-overflow: ellipsis; letter-spacing: 0.06em; }
</style>
"#;

/// HTML sheet with one card per product, in product order
async fn render_sheet(
    template: &LabelTemplate,
    products: Vec<LabelValues>,
    config: CatalogConfig,
    now: String,
) -> CatalogResult<String> {
    let config = Arc::new(config);
    let now: Arc<str> = Arc::from(now);

    let mut cards = String::new();
    let mut scripts = String::new();
    for values in products {
        let fragments = render_card(template, Arc::new(values), Arc::clone(&config), Arc::clone(&now)).await?;

        cards.push_str(&format!(
            r#"<div class="label" style="width: {}mm; height: {}mm">"#,
            template.width, template.height
        ));
        for fragment in fragments {
            cards.push_str(&fragment.html);
            scripts.push_str(&fragment.script);
        }
        cards.push_str("</div>");
    }

    Ok(format!(
        r#"{PAGE_HEAD}<script src="{QRCODE_LIB}"></script>
</head>
<body>
<div class="wrapper" style="width: 210mm">{cards}</div>
<script>{scripts}</script>
</body>
</html>"#
    ))
}

impl CatalogService {
    /// Render labels for the products and upload the sheet; returns its URL
    #[instrument(skip(self, request), fields(company_id = %ctx.company_id, count = request.product_ids.len()))]
    pub async fn render_labels(&self, ctx: RequestContext, request: RenderLabelsRequest) -> CatalogResult<String> {
        if request.product_ids.is_empty() {
            return Err(CatalogError::Validation("no products selected".to_string()));
        }
        if request.template.fields.is_empty() {
            return Err(CatalogError::Validation("label template has no fields".to_string()));
        }

        let documents = self
            .index
            .get_many(ctx.company_id, request.product_ids.clone())
            .await?;
        if let Some(missing) = request
            .product_ids
            .iter()
            .find(|id| !documents.iter().any(|document| document.id == **id))
        {
            return Err(CatalogError::not_found("product", missing));
        }

        let products = documents
            .iter()
            .map(|document| label_values(document, request.shop_id, &request.currency))
            .collect();
        let now = Utc::now().format(DATE_TIME_FORMAT).to_string();
        let html = render_sheet(&request.template, products, self.config.clone(), now).await?;

        let key = format!("{}.html", Uuid::new_v4());
        let url = self
            .storage
            .put(FILE_BUCKET, &key, html.into_bytes(), "text/html")
            .await?;

        info!(%url, "Labels rendered");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductImage, ShopPrice};
    use crate::test_fixtures::TestDeps;

    fn document() -> (ProductDocument, Uuid) {
        let shop_id = Uuid::new_v4();
        let document = ProductDocument {
            id: Uuid::new_v4(),
            name: "Milk <1L>".into(),
            sku: "SKU-1".into(),
            barcodes: vec!["4780000000017".into()],
            images: vec![ProductImage {
                file_name: "milk.png".into(),
                sequence_number: 1,
            }],
            shop_prices: BTreeMap::from([(
                shop_id,
                ShopPrice {
                    shop_id,
                    retail_price: 12000.0,
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        (document, shop_id)
    }

    fn field(id: &str, content: LabelContent) -> LabelField {
        LabelField {
            id: id.into(),
            position: Position { x: 4, y: 8 },
            width: 60,
            height: 60,
            bottom: 2,
            right: 2,
            content,
        }
    }

    fn text(field_name: &str) -> LabelContent {
        LabelContent::Text {
            field_name: field_name.into(),
            format: TextFormat {
                font_size: 12,
                font_weight: 600,
            },
        }
    }

    fn template(fields: Vec<LabelField>) -> LabelTemplate {
        LabelTemplate {
            width: 58,
            height: 40,
            fields,
        }
    }

    #[test]
    fn test_content_wire_shape() {
        let content: LabelContent =
            serde_json::from_value(serde_json::json!({ "type": "barcode", "field_name": "barcode" })).unwrap();
        assert_eq!(content, LabelContent::Barcode { field_name: "barcode".into() });
    }

    #[tokio::test]
    async fn test_fragments_keep_field_order() {
        let (document, shop_id) = document();
        let values = label_values(&document, Some(shop_id), "UZS");
        let template = template(vec![
            field("f1", text("name")),
            field("f2", text("retail_price")),
            field("f3", LabelContent::Image { file_name: None }),
            field("qr", LabelContent::Barcode { field_name: "barcode".into() }),
            field("f5", text(DATE_FIELD)),
        ]);

        let html = render_sheet(
            &template,
            vec![values],
            CatalogConfig::new("cdn.example.com"),
            "2025-03-01 10:00:00".into(),
        )
        .await
        .unwrap();

        let name = html.find("Milk &lt;1L&gt;").unwrap();
        let price = html.find(">12000<").unwrap();
        let image = html.find("https://cdn.example.com/file/milk.png").unwrap();
        let qr = html.find(r#"id="qr""#).unwrap();
        let date = html.find("2025-03-01 10:00:00").unwrap();
        assert!(name < price && price < image && image < qr && qr < date);

        assert!(html.contains(r#"style="width: 210mm""#));
        assert!(html.contains(r#"style="width: 58mm; height: 40mm""#));
        assert!(html.contains(r#"new QRCode(document.getElementById("qr"), { text: "4780000000017""#));
    }

    #[tokio::test]
    async fn test_unknown_field_fails_the_sheet() {
        let (document, _) = document();
        let template = template(vec![field("f1", text("name")), field("f2", text("brand"))]);

        let result = render_sheet(
            &template,
            vec![label_values(&document, None, "")],
            CatalogConfig::new("cdn.example.com"),
            String::new(),
        )
        .await;
        assert!(matches!(result, Err(CatalogError::Validation(msg)) if msg.contains("brand")));
    }

    #[tokio::test]
    async fn test_render_labels_uploads_sheet() {
        let (document, shop_id) = document();
        let product_id = document.id;

        let mut deps = TestDeps::default();
        deps.index
            .expect_get_many()
            .returning(move |_, _| Ok(vec![document.clone()]));
        deps.storage
            .expect_put()
            .withf(|bucket, key, bytes, content_type| {
                bucket == FILE_BUCKET && key.ends_with(".html") && !bytes.is_empty() && content_type == "text/html"
            })
            .times(1)
            .returning(|bucket, key, _, _| Ok(format!("https://cdn.example.com/{}/{}", bucket, key)));

        let url = deps
            .service()
            .render_labels(
                RequestContext::new(Uuid::new_v4(), Uuid::new_v4()),
                RenderLabelsRequest {
                    product_ids: vec![product_id],
                    shop_id: Some(shop_id),
                    currency: "UZS".into(),
                    template: template(vec![field("f1", text("name"))]),
                },
            )
            .await
            .unwrap();
        assert!(url.starts_with("https://cdn.example.com/file/"));
    }

    #[tokio::test]
    async fn test_render_labels_requires_every_product() {
        let mut deps = TestDeps::default();
        deps.index.expect_get_many().returning(|_, _| Ok(vec![]));
        deps.storage.expect_put().times(0);

        let result = deps
            .service()
            .render_labels(
                RequestContext::new(Uuid::new_v4(), Uuid::new_v4()),
                RenderLabelsRequest {
                    product_ids: vec![Uuid::new_v4()],
                    shop_id: None,
                    currency: String::new(),
                    template: template(vec![field("f1", text("name"))]),
                },
            )
            .await;
        assert!(matches!(result, Err(CatalogError::NotFound { entity: "product", .. })));
    }
}
