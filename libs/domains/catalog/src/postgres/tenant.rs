use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, TransactionTrait};
use tracing::debug;
use uuid::Uuid;

use super::{MEASUREMENT_UNIT_SELECT, MeasurementUnitRow, NOW_EPOCH, statement};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{Company, MeasurementUnit, Shop, Supplier};
use crate::repository::TenantStore;

/// PostgreSQL implementation of [`TenantStore`]
#[derive(Clone)]
pub struct PgTenantStore {
    db: DatabaseConnection,
}

impl PgTenantStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct SupplierRow {
    id: Uuid,
    company_id: Uuid,
    name: String,
    phone_number: String,
}

const UPSERT_SHOP: &str = r#"
    INSERT INTO shop (id, company_id, name) VALUES ($1, $2, $3)
    ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
"#;

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn provision_company(&self, company: Company, shop: Shop) -> CatalogResult<Vec<MeasurementUnit>> {
        let txn = self.db.begin().await?;

        txn.execute_raw(statement(
            r#"
            INSERT INTO company (id, name, created_by) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
            [company.id.into(), company.name.into(), company.created_by.into()],
        ))
        .await?;

        txn.execute_raw(statement(
            UPSERT_SHOP,
            [shop.id.into(), company.id.into(), shop.name.into()],
        ))
        .await?;

        let copied = txn
            .execute_raw(statement(
                r#"
                INSERT INTO measurement_unit (id, company_id, unit_id, is_deletable, created_by)
                SELECT gen_random_uuid(), $1, dmu.id, FALSE, $2
                FROM default_measurement_unit dmu
                WHERE dmu.deleted_at = 0
                ON CONFLICT (company_id, unit_id) DO NOTHING
                "#,
                [company.id.into(), company.created_by.into()],
            ))
            .await?
            .rows_affected();

        let sql = format!(
            r#"
            {MEASUREMENT_UNIT_SELECT}
            WHERE mu.company_id = $1 AND mu.deleted_at = 0 AND dmu.deleted_at = 0
            ORDER BY dmu.short_name
            "#
        );
        let units = MeasurementUnitRow::find_by_statement(statement(&sql, [company.id.into()]))
            .all(&txn)
            .await?;

        txn.commit().await?;
        debug!(company_id = %company.id, copied, units = units.len(), "Company provisioned");

        Ok(units.into_iter().map(Into::into).collect())
    }

    async fn upsert_shop(&self, shop: Shop) -> CatalogResult<()> {
        self.db
            .execute_raw(statement(
                UPSERT_SHOP,
                [shop.id.into(), shop.company_id.into(), shop.name.into()],
            ))
            .await?;
        Ok(())
    }

    async fn delete_shop(&self, company_id: Uuid, id: Uuid) -> CatalogResult<bool> {
        let sql = format!("UPDATE shop SET deleted_at = {NOW_EPOCH} WHERE id = $1 AND company_id = $2 AND deleted_at = 0");
        let result = self
            .db
            .execute_raw(statement(&sql, [id.into(), company_id.into()]))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_supplier(&self, supplier: Supplier) -> CatalogResult<()> {
        self.db
            .execute_raw(statement(
                r#"
                INSERT INTO supplier (id, company_id, name, phone_number) VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, phone_number = EXCLUDED.phone_number
                "#,
                [
                    supplier.id.into(),
                    supplier.company_id.into(),
                    supplier.name.into(),
                    supplier.phone_number.into(),
                ],
            ))
            .await?;
        Ok(())
    }

    async fn delete_supplier(&self, company_id: Uuid, id: Uuid) -> CatalogResult<bool> {
        let sql =
            format!("UPDATE supplier SET deleted_at = {NOW_EPOCH} WHERE id = $1 AND company_id = $2 AND deleted_at = 0");
        let result = self
            .db
            .execute_raw(statement(&sql, [id.into(), company_id.into()]))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_supplier(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Supplier> {
        SupplierRow::find_by_statement(statement(
            r#"
            SELECT id, company_id, name, phone_number FROM supplier
            WHERE id = $1 AND company_id = $2 AND deleted_at = 0
            "#,
            [id.into(), company_id.into()],
        ))
        .one(&self.db)
        .await?
        .map(|row| Supplier {
            id: row.id,
            company_id: row.company_id,
            name: row.name,
            phone_number: row.phone_number,
        })
        .ok_or_else(|| CatalogError::not_found("supplier", id))
    }
}
