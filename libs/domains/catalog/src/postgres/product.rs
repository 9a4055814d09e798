use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult, TransactionTrait, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CountRow, NOW_EPOCH, dedup_ids, statement, translations, values_placeholders};
use crate::bulk_edit::BulkChange;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    CreatedProduct, OrderItem, PriceUpdate, Product, ProductCopy, ProductImage, ProductInput, RequestContext,
    ShopMeasurementValue, ShopPrice, ShortCategory, ShortMeasurementUnit, ShortSupplier, ShortVat, StockDecrement,
    StockLevel, StockUpdate,
};
use crate::repository::ProductStore;

/// PostgreSQL implementation of [`ProductStore`]
#[derive(Clone)]
pub struct PgProductStore {
    db: DatabaseConnection,
}

impl PgProductStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct VersionRow {
    current_version: i32,
}

#[derive(Debug, FromQueryResult)]
struct ProductRow {
    id: Uuid,
    company_id: Uuid,
    product_type_id: String,
    parent_id: Option<Uuid>,
    current_version: i32,
    created_by: Option<Uuid>,
    created_at: NaiveDateTime,
    detail_id: Uuid,
    sku: String,
    name: String,
    mxik_code: String,
    is_marking: bool,
    brand_id: Option<Uuid>,
    description: String,
    updated_at: NaiveDateTime,
    mu_id: Option<Uuid>,
    mu_short_name: Option<String>,
    mu_long_name: Option<String>,
    mu_precision: Option<String>,
    mu_short_translation: Option<serde_json::Value>,
    mu_long_translation: Option<serde_json::Value>,
    supplier_id: Option<Uuid>,
    supplier_name: Option<String>,
    vat_id: Option<Uuid>,
    vat_name: Option<String>,
    vat_percentage: Option<f64>,
}

#[derive(Debug, FromQueryResult)]
struct BarcodeRow {
    barcode: String,
}

#[derive(Debug, FromQueryResult)]
struct ImageRow {
    file_name: String,
    sequence_number: i32,
}

#[derive(Debug, FromQueryResult)]
struct CategoryRow {
    id: Uuid,
    name: String,
    parent_id: Option<Uuid>,
}

#[derive(Debug, FromQueryResult)]
struct TagRow {
    tag_id: Uuid,
}

#[derive(Debug, FromQueryResult)]
struct StockRow {
    product_id: Uuid,
    shop_id: Uuid,
    shop_name: String,
    is_available: bool,
    has_trigger: bool,
    amount: f64,
    small_left: f64,
}

impl From<StockRow> for StockUpdate {
    fn from(row: StockRow) -> Self {
        StockUpdate {
            product_id: row.product_id,
            value: ShopMeasurementValue {
                shop_id: row.shop_id,
                shop_name: row.shop_name,
                is_available: row.is_available,
                has_trigger: row.has_trigger,
                amount: row.amount,
                small_left: row.small_left,
            },
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct PriceRow {
    product_id: Uuid,
    shop_id: Uuid,
    shop_name: String,
    min_price: f64,
    max_price: f64,
    supply_price: f64,
    retail_price: f64,
    whole_sale_price: f64,
}

impl From<PriceRow> for PriceUpdate {
    fn from(row: PriceRow) -> Self {
        PriceUpdate {
            product_id: row.product_id,
            price: ShopPrice {
                shop_id: row.shop_id,
                shop_name: row.shop_name,
                min_price: row.min_price,
                max_price: row.max_price,
                supply_price: row.supply_price,
                retail_price: row.retail_price,
                whole_sale_price: row.whole_sale_price,
            },
        }
    }
}

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.company_id, p.product_type_id, p.parent_id, p.current_version, p.created_by, p.created_at,
           d.id AS detail_id, d.sku, d.name, d.mxik_code, d.is_marking, d.brand_id, d.description,
           d.created_at AS updated_at,
           mu.id AS mu_id, dmu.short_name AS mu_short_name, dmu.long_name AS mu_long_name,
           mp.value AS mu_precision, dmu.short_name_translation AS mu_short_translation,
           dmu.long_name_translation AS mu_long_translation,
           s.id AS supplier_id, s.name AS supplier_name,
           v.id AS vat_id, v.name AS vat_name, v.percentage AS vat_percentage
    FROM product p
    JOIN product_detail d ON d.product_id = p.id AND d.version = p.current_version
    LEFT JOIN measurement_unit mu ON mu.id = d.measurement_unit_id AND mu.company_id = p.company_id
    LEFT JOIN default_measurement_unit dmu ON dmu.id = mu.unit_id
    LEFT JOIN measurement_precision mp ON mp.id = mu.precision_id
    LEFT JOIN supplier s ON s.id = d.supplier_id
    LEFT JOIN vat v ON v.id = d.vat_id
    WHERE p.id = $1 AND p.company_id = $2 AND p.deleted_at = 0
"#;

const INSERT_DETAIL: &str = r#"
    INSERT INTO product_detail
        (id, product_id, sku, name, mxik_code, is_marking, brand_id, description,
         measurement_unit_id, supplier_id, vat_id, created_by, version)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
"#;

/// First detail of a new product, versioned after the parent row
const INSERT_FIRST_DETAIL: &str = r#"
    INSERT INTO product_detail
        (id, product_id, sku, name, mxik_code, is_marking, brand_id, description,
         measurement_unit_id, supplier_id, vat_id, created_by, version)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            (SELECT current_version FROM product WHERE id = $2))
"#;

/// Rows written by a stock upsert, with the shop name resolved
const STOCK_RETURNING: &str = r#"
        RETURNING product_id, shop_id, is_available, has_trigger, amount, small_left
    )
    SELECT u.product_id, u.shop_id, COALESCE(s.name, '') AS shop_name,
           u.is_available, u.has_trigger, u.amount, u.small_left
    FROM upserted u
    LEFT JOIN shop s ON s.id = u.shop_id
"#;

const PRICE_RETURNING: &str = r#"
        RETURNING product_id, shop_id, min_price, max_price, supply_price, retail_price, whole_sale_price
    )
    SELECT u.product_id, u.shop_id, COALESCE(s.name, '') AS shop_name,
           u.min_price, u.max_price, u.supply_price, u.retail_price, u.whole_sale_price
    FROM upserted u
    LEFT JOIN shop s ON s.id = u.shop_id
"#;

/// Restricts an upsert source to live products of the tenant in `$1`
const LIVE_PRODUCT_JOIN: &str = r#"
    JOIN product p ON p.id = v.product_id
    WHERE p.company_id = $1 AND p.deleted_at = 0
"#;

/// Current detail of each live product in `$1` owned by `$2`
const CURRENT_DETAILS: &str = r#"
    SELECT d.id FROM product_detail d
    JOIN product p ON p.id = d.product_id AND d.version = p.current_version
    WHERE p.id = ANY($1) AND p.company_id = $2 AND p.deleted_at = 0
"#;

/// Insert a detail at `version`, or at the parent's current version when `None`
async fn insert_detail<C: ConnectionTrait>(
    conn: &C,
    ctx: RequestContext,
    product_id: Uuid,
    version: Option<i32>,
    input: &ProductInput,
) -> Result<Uuid, DbErr> {
    let detail_id = Uuid::new_v4();
    let mut values: Vec<Value> = vec![
        detail_id.into(),
        product_id.into(),
        input.sku.clone().into(),
        input.name.clone().into(),
        input.mxik_code.clone().into(),
        input.is_marking.into(),
        input.brand_id.into(),
        input.description.clone().into(),
        input.measurement_unit_id.into(),
        Some(input.supplier_id).into(),
        Some(input.vat_id).into(),
        Some(ctx.user_id).into(),
    ];

    let sql = match version {
        Some(version) => {
            values.push(version.into());
            INSERT_DETAIL
        }
        None => INSERT_FIRST_DETAIL,
    };
    conn.execute_raw(statement(sql, values)).await?;
    Ok(detail_id)
}

/// Bulk-insert the child collections of a fresh detail, one statement each
async fn insert_children<C: ConnectionTrait>(conn: &C, detail_id: Uuid, input: &ProductInput) -> Result<(), DbErr> {
    let mut barcodes = input.barcodes.clone();
    barcodes.sort();
    barcodes.dedup();
    if !barcodes.is_empty() {
        let sql = format!(
            "INSERT INTO product_barcode (product_detail_id, barcode) VALUES {}",
            values_placeholders(barcodes.len(), 2, 0)
        );
        let values = barcodes
            .into_iter()
            .flat_map(|barcode| [Value::from(detail_id), Value::from(barcode)]);
        conn.execute_raw(statement(&sql, values)).await?;
    }

    if !input.images.is_empty() {
        let sql = format!(
            "INSERT INTO product_image (id, product_detail_id, file_name, sequence_number) VALUES {}",
            values_placeholders(input.images.len(), 4, 0)
        );
        let values = input.images.iter().flat_map(|image| {
            [
                Value::from(Uuid::new_v4()),
                Value::from(detail_id),
                Value::from(image.file_name.clone()),
                Value::from(image.sequence_number),
            ]
        });
        conn.execute_raw(statement(&sql, values)).await?;
    }

    for (table, column, ids) in [
        ("product_category", "category_id", dedup_ids(&input.category_ids)),
        ("product_tag", "tag_id", dedup_ids(&input.tag_ids)),
    ] {
        if ids.is_empty() {
            continue;
        }
        let sql = format!(
            "INSERT INTO {} (product_detail_id, {}) VALUES {}",
            table,
            column,
            values_placeholders(ids.len(), 2, 0)
        );
        let values = ids.into_iter().flat_map(|id| [Value::from(detail_id), Value::from(id)]);
        conn.execute_raw(statement(&sql, values)).await?;
    }

    Ok(())
}

/// Full upsert of stock rows; a repeated (product, shop) pair keeps the last value
async fn upsert_stock_rows<C: ConnectionTrait>(
    conn: &C,
    company_id: Uuid,
    rows: &[StockUpdate],
) -> Result<Vec<StockUpdate>, DbErr> {
    let rows: BTreeMap<(Uuid, Uuid), &ShopMeasurementValue> = rows
        .iter()
        .map(|row| ((row.product_id, row.value.shop_id), &row.value))
        .collect();
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        r#"
        WITH upserted AS (
            INSERT INTO measurement_values (product_id, shop_id, is_available, has_trigger, amount, small_left)
            SELECT v.product_id, v.shop_id, v.is_available, v.has_trigger, v.amount, v.small_left
            FROM unnest($2::uuid[], $3::uuid[], $4::bool[], $5::bool[], $6::float8[], $7::float8[])
                AS v(product_id, shop_id, is_available, has_trigger, amount, small_left)
            {LIVE_PRODUCT_JOIN}
            ON CONFLICT (product_id, shop_id) DO UPDATE SET
                is_available = EXCLUDED.is_available,
                has_trigger = EXCLUDED.has_trigger,
                amount = EXCLUDED.amount,
                small_left = EXCLUDED.small_left
        {STOCK_RETURNING}
        "#
    );
    let stmt = statement(
        &sql,
        [
            company_id.into(),
            rows.keys().map(|(product, _)| *product).collect::<Vec<_>>().into(),
            rows.keys().map(|(_, shop)| *shop).collect::<Vec<_>>().into(),
            rows.values().map(|v| v.is_available).collect::<Vec<_>>().into(),
            rows.values().map(|v| v.has_trigger).collect::<Vec<_>>().into(),
            rows.values().map(|v| v.amount).collect::<Vec<_>>().into(),
            rows.values().map(|v| v.small_left).collect::<Vec<_>>().into(),
        ],
    );

    let stored = StockRow::find_by_statement(stmt).all(conn).await?;
    Ok(stored.into_iter().map(Into::into).collect())
}

async fn upsert_price_rows<C: ConnectionTrait>(
    conn: &C,
    company_id: Uuid,
    rows: &[PriceUpdate],
) -> Result<Vec<PriceUpdate>, DbErr> {
    let rows: BTreeMap<(Uuid, Uuid), &ShopPrice> = rows
        .iter()
        .map(|row| ((row.product_id, row.price.shop_id), &row.price))
        .collect();
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        r#"
        WITH upserted AS (
            INSERT INTO shop_price
                (id, product_id, shop_id, min_price, max_price, supply_price, retail_price, whole_sale_price)
            SELECT gen_random_uuid(), v.product_id, v.shop_id, v.min_price, v.max_price,
                   v.supply_price, v.retail_price, v.whole_sale_price
            FROM unnest($2::uuid[], $3::uuid[], $4::float8[], $5::float8[], $6::float8[], $7::float8[], $8::float8[])
                AS v(product_id, shop_id, min_price, max_price, supply_price, retail_price, whole_sale_price)
            {LIVE_PRODUCT_JOIN}
            ON CONFLICT (product_id, shop_id) DO UPDATE SET
                min_price = EXCLUDED.min_price,
                max_price = EXCLUDED.max_price,
                supply_price = EXCLUDED.supply_price,
                retail_price = EXCLUDED.retail_price,
                whole_sale_price = EXCLUDED.whole_sale_price
        {PRICE_RETURNING}
        "#
    );
    let stmt = statement(
        &sql,
        [
            company_id.into(),
            rows.keys().map(|(product, _)| *product).collect::<Vec<_>>().into(),
            rows.keys().map(|(_, shop)| *shop).collect::<Vec<_>>().into(),
            rows.values().map(|p| p.min_price).collect::<Vec<_>>().into(),
            rows.values().map(|p| p.max_price).collect::<Vec<_>>().into(),
            rows.values().map(|p| p.supply_price).collect::<Vec<_>>().into(),
            rows.values().map(|p| p.retail_price).collect::<Vec<_>>().into(),
            rows.values().map(|p| p.whole_sale_price).collect::<Vec<_>>().into(),
        ],
    );

    let stored = PriceRow::find_by_statement(stmt).all(conn).await?;
    Ok(stored.into_iter().map(Into::into).collect())
}

fn stock_rows(product_id: Uuid, values: &[ShopMeasurementValue]) -> Vec<StockUpdate> {
    values
        .iter()
        .map(|value| StockUpdate {
            product_id,
            value: value.clone(),
        })
        .collect()
}

fn price_rows(product_id: Uuid, prices: &[ShopPrice]) -> Vec<PriceUpdate> {
    prices
        .iter()
        .map(|price| PriceUpdate {
            product_id,
            price: price.clone(),
        })
        .collect()
}

impl PgProductStore {
    async fn load_children(&self, row: ProductRow) -> Result<Product, DbErr> {
        let detail = [Value::from(row.detail_id)];

        let barcodes = BarcodeRow::find_by_statement(statement(
            "SELECT barcode FROM product_barcode WHERE product_detail_id = $1 ORDER BY barcode",
            detail.clone(),
        ))
        .all(&self.db)
        .await?;

        let images = ImageRow::find_by_statement(statement(
            "SELECT file_name, sequence_number FROM product_image WHERE product_detail_id = $1 ORDER BY sequence_number",
            detail.clone(),
        ))
        .all(&self.db)
        .await?;

        let categories = CategoryRow::find_by_statement(statement(
            r#"
            SELECT c.id, c.name, c.parent_id FROM product_category pc
            JOIN category c ON c.id = pc.category_id AND c.deleted_at = 0
            WHERE pc.product_detail_id = $1
            ORDER BY c.name
            "#,
            detail.clone(),
        ))
        .all(&self.db)
        .await?;

        let tags = TagRow::find_by_statement(statement(
            "SELECT tag_id FROM product_tag WHERE product_detail_id = $1",
            detail,
        ))
        .all(&self.db)
        .await?;

        let product = [Value::from(row.id)];

        let stock = StockRow::find_by_statement(statement(
            r#"
            SELECT mv.product_id, mv.shop_id, COALESCE(s.name, '') AS shop_name,
                   mv.is_available, mv.has_trigger, mv.amount, mv.small_left
            FROM measurement_values mv
            LEFT JOIN shop s ON s.id = mv.shop_id
            WHERE mv.product_id = $1
            ORDER BY mv.shop_id
            "#,
            product.clone(),
        ))
        .all(&self.db)
        .await?;

        let prices = PriceRow::find_by_statement(statement(
            r#"
            SELECT sp.product_id, sp.shop_id, COALESCE(s.name, '') AS shop_name,
                   sp.min_price, sp.max_price, sp.supply_price, sp.retail_price, sp.whole_sale_price
            FROM shop_price sp
            LEFT JOIN shop s ON s.id = sp.shop_id
            WHERE sp.product_id = $1
            ORDER BY sp.shop_id
            "#,
            product,
        ))
        .all(&self.db)
        .await?;

        let measurement_unit = row.mu_id.map(|id| ShortMeasurementUnit {
            id,
            short_name: row.mu_short_name.unwrap_or_default(),
            long_name: row.mu_long_name.unwrap_or_default(),
            precision: row.mu_precision.unwrap_or_default(),
            short_name_translation: row.mu_short_translation.map(translations).unwrap_or_default(),
            long_name_translation: row.mu_long_translation.map(translations).unwrap_or_default(),
        });

        Ok(Product {
            id: row.id,
            company_id: row.company_id,
            product_type_id: row.product_type_id,
            parent_id: row.parent_id,
            current_version: row.current_version,
            detail_id: row.detail_id,
            sku: row.sku,
            name: row.name,
            mxik_code: row.mxik_code,
            is_marking: row.is_marking,
            brand_id: row.brand_id,
            description: row.description,
            measurement_unit,
            supplier: row.supplier_id.map(|id| ShortSupplier {
                id,
                name: row.supplier_name.unwrap_or_default(),
            }),
            vat: row.vat_id.map(|id| ShortVat {
                id,
                name: row.vat_name.unwrap_or_default(),
                percentage: row.vat_percentage.unwrap_or_default(),
            }),
            barcodes: barcodes.into_iter().map(|b| b.barcode).collect(),
            images: images
                .into_iter()
                .map(|i| ProductImage {
                    file_name: i.file_name,
                    sequence_number: i.sequence_number,
                })
                .collect(),
            categories: categories
                .into_iter()
                .map(|c| ShortCategory {
                    id: c.id,
                    name: c.name,
                    parent_id: c.parent_id,
                })
                .collect(),
            tag_ids: tags.into_iter().map(|t| t.tag_id).collect(),
            measurement_values: stock.into_iter().map(|s| StockUpdate::from(s).value).collect(),
            shop_prices: prices.into_iter().map(|p| PriceUpdate::from(p).price).collect(),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn insert_copy<C: ConnectionTrait>(conn: &C, product: &ProductCopy) -> Result<(), DbErr> {
        conn.execute_raw(statement(
            r#"
            INSERT INTO product (id, company_id, product_type_id, parent_id, created_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
            [
                product.id.into(),
                product.company_id.into(),
                product.product_type_id.clone().into(),
                product.parent_id.into(),
                product.created_by.into(),
            ],
        ))
        .await?;

        // A copy gets one detail; replays find it and leave it alone
        conn.execute_raw(statement(
            r#"
            INSERT INTO product_detail
                (id, product_id, version, sku, name, mxik_code, is_marking, brand_id, description,
                 measurement_unit_id, supplier_id, vat_id, created_by)
            SELECT $1, $2, COALESCE(MAX(d.version), 0) + 1, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
            FROM product_detail d
            WHERE d.product_id = $2
            HAVING COUNT(d.id) = 0
            ON CONFLICT (product_id, version) DO NOTHING
            "#,
            [
                Uuid::new_v4().into(),
                product.id.into(),
                product.sku.clone().into(),
                product.name.clone().into(),
                product.mxik_code.clone().into(),
                product.is_marking.into(),
                product.brand_id.into(),
                product.description.clone().into(),
                product.measurement_unit_id.into(),
                product.supplier_id.into(),
                product.vat_id.into(),
                product.created_by.into(),
            ],
        ))
        .await?;

        conn.execute_raw(statement(
            r#"
            UPDATE product p SET current_version = d.version
            FROM product_detail d
            WHERE p.id = $1 AND d.product_id = p.id
              AND d.version = (SELECT MAX(version) FROM product_detail WHERE product_id = $1)
            "#,
            [product.id.into()],
        ))
        .await?;

        if !product.barcodes.is_empty() {
            conn.execute_raw(statement(
                r#"
                INSERT INTO product_barcode (product_detail_id, barcode)
                SELECT d.id, b.barcode
                FROM product_detail d
                JOIN product p ON p.id = d.product_id AND d.version = p.current_version,
                     unnest($2::text[]) AS b(barcode)
                WHERE p.id = $1
                ON CONFLICT DO NOTHING
                "#,
                [product.id.into(), product.barcodes.clone().into()],
            ))
            .await?;
        }

        if !product.image.is_empty() {
            conn.execute_raw(statement(
                r#"
                INSERT INTO product_image (id, product_detail_id, file_name, sequence_number)
                SELECT $2, d.id, $3, 0
                FROM product_detail d
                JOIN product p ON p.id = d.product_id AND d.version = p.current_version
                WHERE p.id = $1
                  AND NOT EXISTS (SELECT 1 FROM product_image i WHERE i.product_detail_id = d.id)
                "#,
                [product.id.into(), Uuid::new_v4().into(), product.image.clone().into()],
            ))
            .await?;
        }

        let stock: Vec<StockUpdate> = product
            .shop_measurement_values
            .iter()
            .map(|value| StockUpdate {
                product_id: product.id,
                value: ShopMeasurementValue {
                    shop_id: value.shop_id,
                    is_available: value.is_available,
                    amount: value.in_stock,
                    ..Default::default()
                },
            })
            .collect();
        upsert_stock_rows(conn, product.company_id, &stock).await?;

        let prices: Vec<PriceUpdate> = product
            .shop_measurement_values
            .iter()
            .map(|value| PriceUpdate {
                product_id: product.id,
                price: ShopPrice {
                    shop_id: value.shop_id,
                    min_price: value.min_price,
                    max_price: value.max_price,
                    supply_price: value.supply_price,
                    retail_price: value.retail_price,
                    whole_sale_price: value.whole_sale_price,
                    ..Default::default()
                },
            })
            .collect();
        upsert_price_rows(conn, product.company_id, &prices).await?;

        Ok(())
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn create(&self, ctx: RequestContext, input: ProductInput) -> CatalogResult<CreatedProduct> {
        let product_id = Uuid::new_v4();
        let txn = self.db.begin().await?;

        txn.execute_raw(statement(
            r#"
            INSERT INTO product (id, company_id, product_type_id, parent_id, created_by)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            [
                product_id.into(),
                ctx.company_id.into(),
                input.product_type_id.clone().into(),
                input.parent_id.into(),
                Some(ctx.user_id).into(),
            ],
        ))
        .await?;

        let detail_id = insert_detail(&txn, ctx, product_id, None, &input).await?;
        insert_children(&txn, detail_id, &input).await?;
        upsert_stock_rows(&txn, ctx.company_id, &stock_rows(product_id, &input.measurement_values)).await?;
        upsert_price_rows(&txn, ctx.company_id, &price_rows(product_id, &input.shop_prices)).await?;

        txn.commit().await?;
        debug!(%product_id, %detail_id, "Product created");

        Ok(CreatedProduct {
            product_id,
            product_detail_id: detail_id,
        })
    }

    async fn update(&self, ctx: RequestContext, id: Uuid, input: ProductInput) -> CatalogResult<CreatedProduct> {
        let txn = self.db.begin().await?;

        let bumped = VersionRow::find_by_statement(statement(
            r#"
            UPDATE product
            SET current_version = current_version + 1, product_type_id = $3, parent_id = $4
            WHERE id = $1 AND company_id = $2 AND deleted_at = 0
            RETURNING current_version
            "#,
            [
                id.into(),
                ctx.company_id.into(),
                input.product_type_id.clone().into(),
                input.parent_id.into(),
            ],
        ))
        .one(&txn)
        .await?
        .ok_or_else(|| CatalogError::not_found("product", id))?;

        let detail_id = insert_detail(&txn, ctx, id, Some(bumped.current_version), &input).await?;
        insert_children(&txn, detail_id, &input).await?;
        upsert_stock_rows(&txn, ctx.company_id, &stock_rows(id, &input.measurement_values)).await?;
        upsert_price_rows(&txn, ctx.company_id, &price_rows(id, &input.shop_prices)).await?;

        txn.commit().await?;
        debug!(product_id = %id, version = bumped.current_version, "Product updated");

        Ok(CreatedProduct {
            product_id: id,
            product_detail_id: detail_id,
        })
    }

    async fn get_by_id(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<Product> {
        let row = ProductRow::find_by_statement(statement(PRODUCT_SELECT, [id.into(), ctx.company_id.into()]))
            .one(&self.db)
            .await?
            .ok_or_else(|| CatalogError::not_found("product", id))?;

        Ok(self.load_children(row).await?)
    }

    async fn delete(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<()> {
        let sql = format!(
            "UPDATE product SET deleted_at = {NOW_EPOCH} WHERE id = $1 AND company_id = $2 AND deleted_at = 0"
        );
        let result = self
            .db
            .execute_raw(statement(&sql, [id.into(), ctx.company_id.into()]))
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::not_found("product", id));
        }
        Ok(())
    }

    async fn delete_many(&self, ctx: RequestContext, ids: Vec<Uuid>) -> CatalogResult<u64> {
        let ids = dedup_ids(&ids);
        if ids.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;
        let sql = format!(
            "UPDATE product SET deleted_at = {NOW_EPOCH} WHERE id = ANY($1) AND company_id = $2 AND deleted_at = 0"
        );
        let affected = txn
            .execute_raw(statement(&sql, [ids.clone().into(), ctx.company_id.into()]))
            .await?
            .rows_affected();

        if affected != ids.len() as u64 {
            txn.rollback().await?;
            warn!(requested = ids.len(), affected, "Batch delete rolled back");
            return Err(CatalogError::PartialBatch {
                requested: ids.len(),
                affected,
            });
        }

        txn.commit().await?;
        Ok(affected)
    }

    async fn upsert_measurement_values(
        &self,
        ctx: RequestContext,
        shop_id: Uuid,
        levels: Vec<StockLevel>,
    ) -> CatalogResult<Vec<StockUpdate>> {
        let levels: BTreeMap<Uuid, f64> = levels.into_iter().map(|l| (l.product_id, l.amount)).collect();
        if levels.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            WITH upserted AS (
                INSERT INTO measurement_values (product_id, shop_id, amount)
                SELECT v.product_id, $2, v.amount
                FROM unnest($3::uuid[], $4::float8[]) AS v(product_id, amount)
                {LIVE_PRODUCT_JOIN}
                ON CONFLICT (product_id, shop_id) DO UPDATE SET amount = EXCLUDED.amount
            {STOCK_RETURNING}
            "#
        );
        let stmt = statement(
            &sql,
            [
                ctx.company_id.into(),
                shop_id.into(),
                levels.keys().copied().collect::<Vec<_>>().into(),
                levels.values().copied().collect::<Vec<_>>().into(),
            ],
        );

        let stored: Vec<StockUpdate> = StockRow::find_by_statement(stmt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        if stored.is_empty() {
            return Err(CatalogError::not_found("product", format!("{} in shop {}", levels.len(), shop_id)));
        }
        Ok(stored)
    }

    async fn upsert_shop_prices(
        &self,
        ctx: RequestContext,
        shop_id: Uuid,
        prices: Vec<PriceUpdate>,
    ) -> CatalogResult<Vec<PriceUpdate>> {
        if prices.is_empty() {
            return Ok(Vec::new());
        }
        let requested = prices.len();
        let prices: Vec<PriceUpdate> = prices
            .into_iter()
            .map(|mut update| {
                update.price.shop_id = shop_id;
                update
            })
            .collect();

        let stored = upsert_price_rows(&self.db, ctx.company_id, &prices).await?;
        if stored.is_empty() {
            return Err(CatalogError::not_found("product", format!("{} in shop {}", requested, shop_id)));
        }
        Ok(stored)
    }

    async fn bulk_edit(&self, ctx: RequestContext, product_ids: Vec<Uuid>, change: BulkChange) -> CatalogResult<u64> {
        let ids = dedup_ids(&product_ids);
        let txn = self.db.begin().await?;

        let affected = match &change {
            BulkChange::Name(name) => {
                txn.execute_raw(statement(
                    r#"
                    UPDATE product_detail d SET name = $3
                    FROM product p
                    WHERE d.product_id = p.id AND d.version = p.current_version
                      AND p.id = ANY($1) AND p.company_id = $2 AND p.deleted_at = 0
                    "#,
                    [ids.clone().into(), ctx.company_id.into(), name.clone().into()],
                ))
                .await?
                .rows_affected()
            }
            BulkChange::MeasurementUnit(unit_id) => {
                txn.execute_raw(statement(
                    r#"
                    UPDATE product_detail d SET measurement_unit_id = $3
                    FROM product p
                    WHERE d.product_id = p.id AND d.version = p.current_version
                      AND p.id = ANY($1) AND p.company_id = $2 AND p.deleted_at = 0
                    "#,
                    [ids.clone().into(), ctx.company_id.into(), (*unit_id).into()],
                ))
                .await?
                .rows_affected()
            }
            BulkChange::Category(category_id) => {
                // Already-linked details insert nothing, so count the matches
                let matched = CountRow::find_by_statement(statement(
                    &format!("SELECT COUNT(*) AS count FROM ({CURRENT_DETAILS}) current"),
                    [ids.clone().into(), ctx.company_id.into()],
                ))
                .one(&txn)
                .await?
                .map(|row| row.count as u64)
                .unwrap_or_default();

                txn.execute_raw(statement(
                    &format!(
                        r#"
                        INSERT INTO product_category (product_detail_id, category_id)
                        SELECT current.id, $3 FROM ({CURRENT_DETAILS}) current
                        ON CONFLICT DO NOTHING
                        "#
                    ),
                    [ids.clone().into(), ctx.company_id.into(), (*category_id).into()],
                ))
                .await?;
                matched
            }
            BulkChange::LowStock { small_left, shop_ids } => {
                txn.execute_raw(statement(
                    r#"
                    UPDATE measurement_values mv SET small_left = $3
                    FROM product p
                    WHERE mv.product_id = p.id AND mv.shop_id = ANY($4)
                      AND p.id = ANY($1) AND p.company_id = $2 AND p.deleted_at = 0
                    "#,
                    [
                        ids.clone().into(),
                        ctx.company_id.into(),
                        (*small_left).into(),
                        dedup_ids(shop_ids).into(),
                    ],
                ))
                .await?
                .rows_affected()
            }
        };

        if affected == 0 {
            txn.rollback().await?;
            return Err(CatalogError::not_found("product", format!("{} selected", ids.len())));
        }

        txn.commit().await?;
        debug!(field = %change.field(), affected, "Bulk edit committed");
        Ok(affected)
    }

    async fn insert_many(&self, products: Vec<ProductCopy>) -> CatalogResult<()> {
        if products.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;
        for product in &products {
            Self::insert_copy(&txn, product).await?;
        }
        txn.commit().await?;

        debug!(count = products.len(), "Copied products");
        Ok(())
    }

    async fn decrement_stock(
        &self,
        company_id: Uuid,
        order_id: Uuid,
        shop_id: Uuid,
        items: Vec<OrderItem>,
    ) -> CatalogResult<StockDecrement> {
        let mut quantities: BTreeMap<Uuid, f64> = BTreeMap::new();
        for item in &items {
            *quantities.entry(item.product_id).or_default() += item.value;
        }
        if quantities.is_empty() {
            return Ok(StockDecrement::default());
        }
        let product_ids: Vec<Uuid> = quantities.keys().copied().collect();

        let txn = self.db.begin().await?;

        let replayed = txn
            .execute_raw(statement(
                r#"
                INSERT INTO applied_order (order_id, shop_id, company_id) VALUES ($1, $2, $3)
                ON CONFLICT (order_id, shop_id) DO NOTHING
                "#,
                [order_id.into(), shop_id.into(), company_id.into()],
            ))
            .await?
            .rows_affected()
            == 0;

        let stmt = if replayed {
            statement(
                r#"
                SELECT mv.product_id, mv.shop_id, COALESCE(s.name, '') AS shop_name,
                       mv.is_available, mv.has_trigger, mv.amount, mv.small_left
                FROM measurement_values mv
                JOIN product p ON p.id = mv.product_id AND p.company_id = $1
                LEFT JOIN shop s ON s.id = mv.shop_id
                WHERE mv.shop_id = $2 AND mv.product_id = ANY($3)
                "#,
                [company_id.into(), shop_id.into(), product_ids.clone().into()],
            )
        } else {
            statement(
                r#"
                WITH decremented AS (
                    UPDATE measurement_values mv SET amount = mv.amount - v.value
                    FROM unnest($3::uuid[], $4::float8[]) AS v(product_id, value), product p
                    WHERE mv.product_id = v.product_id AND mv.shop_id = $2
                      AND p.id = mv.product_id AND p.company_id = $1
                    RETURNING mv.product_id, mv.shop_id, mv.is_available, mv.has_trigger, mv.amount, mv.small_left
                )
                SELECT d.product_id, d.shop_id, COALESCE(s.name, '') AS shop_name,
                       d.is_available, d.has_trigger, d.amount, d.small_left
                FROM decremented d
                LEFT JOIN shop s ON s.id = d.shop_id
                "#,
                [
                    company_id.into(),
                    shop_id.into(),
                    product_ids.clone().into(),
                    quantities.values().copied().collect::<Vec<_>>().into(),
                ],
            )
        };

        let stored: Vec<StockUpdate> = StockRow::find_by_statement(stmt)
            .all(&txn)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        txn.commit().await?;

        let missing = product_ids
            .into_iter()
            .filter(|id| !stored.iter().any(|row| row.product_id == *id))
            .collect();
        Ok(StockDecrement {
            stored,
            missing,
            replayed,
        })
    }
}
