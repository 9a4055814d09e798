use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Replicated tenant entities plus the reference data products point at.
///
/// Tombstoned rows keep `deleted_at` as epoch seconds; live rows have 0.
const UP: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS company (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        created_by  UUID,
        created_at  TIMESTAMP NOT NULL DEFAULT NOW(),
        deleted_at  BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS shop (
        id          UUID PRIMARY KEY,
        company_id  UUID NOT NULL,
        name        TEXT NOT NULL,
        created_at  TIMESTAMP NOT NULL DEFAULT NOW(),
        deleted_at  BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS shop_company_idx ON shop (company_id) WHERE deleted_at = 0",
    r#"
    CREATE TABLE IF NOT EXISTS supplier (
        id            UUID PRIMARY KEY,
        company_id    UUID NOT NULL,
        name          TEXT NOT NULL,
        phone_number  TEXT NOT NULL DEFAULT '',
        created_at    TIMESTAMP NOT NULL DEFAULT NOW(),
        deleted_at    BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vat (
        id          UUID PRIMARY KEY,
        company_id  UUID NOT NULL,
        name        TEXT NOT NULL,
        percentage  DOUBLE PRECISION NOT NULL DEFAULT 0,
        created_by  UUID,
        created_at  TIMESTAMP NOT NULL DEFAULT NOW(),
        deleted_at  BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS default_measurement_unit (
        id                      UUID PRIMARY KEY,
        short_name              TEXT NOT NULL,
        long_name               TEXT NOT NULL,
        short_name_translation  JSONB NOT NULL DEFAULT '{}',
        long_name_translation   JSONB NOT NULL DEFAULT '{}',
        deleted_at              BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS measurement_precision (
        id     UUID PRIMARY KEY,
        value  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS measurement_unit (
        id            UUID PRIMARY KEY,
        company_id    UUID NOT NULL,
        unit_id       UUID NOT NULL REFERENCES default_measurement_unit (id),
        precision_id  UUID REFERENCES measurement_precision (id),
        is_deletable  BOOLEAN NOT NULL DEFAULT TRUE,
        created_by    UUID,
        created_at    TIMESTAMP NOT NULL DEFAULT NOW(),
        deleted_at    BIGINT NOT NULL DEFAULT 0,
        UNIQUE (company_id, unit_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS category (
        id          UUID PRIMARY KEY,
        company_id  UUID NOT NULL,
        name        TEXT NOT NULL,
        parent_id   UUID REFERENCES category (id),
        created_by  UUID,
        created_at  TIMESTAMP NOT NULL DEFAULT NOW(),
        deleted_at  BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS category_parent_idx ON category (parent_id)",
];

const DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS category",
    "DROP TABLE IF EXISTS measurement_unit",
    "DROP TABLE IF EXISTS measurement_precision",
    "DROP TABLE IF EXISTS default_measurement_unit",
    "DROP TABLE IF EXISTS vat",
    "DROP TABLE IF EXISTS supplier",
    "DROP TABLE IF EXISTS shop",
    "DROP TABLE IF EXISTS company",
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
