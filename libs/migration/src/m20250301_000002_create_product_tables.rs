use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Versioned product storage.
///
/// `product` carries identity and the current version pointer; each update
/// appends a `product_detail` row. Child collections hang off the detail id so
/// older versions keep their own barcodes, images, categories and tags.
/// Stock and prices are per (product, shop) and are updated in place.
const UP: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS product (
        id               UUID PRIMARY KEY,
        company_id       UUID NOT NULL,
        product_type_id  TEXT NOT NULL DEFAULT 'single',
        parent_id        UUID,
        current_version  INTEGER NOT NULL DEFAULT 1,
        created_by       UUID,
        created_at       TIMESTAMP NOT NULL DEFAULT NOW(),
        deleted_at       BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS product_company_idx ON product (company_id) WHERE deleted_at = 0",
    r#"
    CREATE TABLE IF NOT EXISTS product_detail (
        id                   UUID PRIMARY KEY,
        product_id           UUID NOT NULL REFERENCES product (id),
        version              INTEGER NOT NULL,
        sku                  TEXT NOT NULL DEFAULT '',
        name                 TEXT NOT NULL,
        mxik_code            TEXT NOT NULL DEFAULT '',
        is_marking           BOOLEAN NOT NULL DEFAULT FALSE,
        brand_id             UUID,
        description          TEXT NOT NULL DEFAULT '',
        measurement_unit_id  UUID NOT NULL,
        supplier_id          UUID,
        vat_id               UUID,
        created_by           UUID,
        created_at           TIMESTAMP NOT NULL DEFAULT NOW(),
        UNIQUE (product_id, version)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_barcode (
        product_detail_id  UUID NOT NULL REFERENCES product_detail (id),
        barcode            TEXT NOT NULL,
        UNIQUE (product_detail_id, barcode)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_image (
        id                 UUID PRIMARY KEY,
        product_detail_id  UUID NOT NULL REFERENCES product_detail (id),
        file_name          TEXT NOT NULL,
        sequence_number    INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_category (
        product_detail_id  UUID NOT NULL REFERENCES product_detail (id),
        category_id        UUID NOT NULL,
        UNIQUE (product_detail_id, category_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_tag (
        product_detail_id  UUID NOT NULL REFERENCES product_detail (id),
        tag_id             UUID NOT NULL,
        UNIQUE (product_detail_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS measurement_values (
        product_id    UUID NOT NULL REFERENCES product (id),
        shop_id       UUID NOT NULL,
        is_available  BOOLEAN NOT NULL DEFAULT TRUE,
        has_trigger   BOOLEAN NOT NULL DEFAULT FALSE,
        amount        DOUBLE PRECISION NOT NULL DEFAULT 0,
        small_left    DOUBLE PRECISION NOT NULL DEFAULT 0,
        UNIQUE (product_id, shop_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS shop_price (
        id                UUID PRIMARY KEY,
        product_id        UUID NOT NULL REFERENCES product (id),
        shop_id           UUID NOT NULL,
        min_price         DOUBLE PRECISION NOT NULL DEFAULT 0,
        max_price         DOUBLE PRECISION NOT NULL DEFAULT 0,
        supply_price      DOUBLE PRECISION NOT NULL DEFAULT 0,
        retail_price      DOUBLE PRECISION NOT NULL DEFAULT 0,
        whole_sale_price  DOUBLE PRECISION NOT NULL DEFAULT 0,
        UNIQUE (product_id, shop_id)
    )
    "#,
];

const DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS shop_price",
    "DROP TABLE IF EXISTS measurement_values",
    "DROP TABLE IF EXISTS product_tag",
    "DROP TABLE IF EXISTS product_category",
    "DROP TABLE IF EXISTS product_image",
    "DROP TABLE IF EXISTS product_barcode",
    "DROP TABLE IF EXISTS product_detail",
    "DROP TABLE IF EXISTS product",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in UP {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in DOWN {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }
}
