use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult};
use uuid::Uuid;

use super::{CountRow, MEASUREMENT_UNIT_SELECT, MeasurementUnitRow, NOW_EPOCH, statement, translations};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    Category, CategoryInput, CreateMeasurementUnit, DefaultMeasurementUnit, MeasurementUnit, RequestContext, Vat,
    VatInput,
};
use crate::repository::ReferenceStore;

/// PostgreSQL implementation of [`ReferenceStore`]
#[derive(Clone)]
pub struct PgReferenceStore {
    db: DatabaseConnection,
}

impl PgReferenceStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct DefaultUnitRow {
    id: Uuid,
    short_name: String,
    long_name: String,
    short_name_translation: serde_json::Value,
    long_name_translation: serde_json::Value,
}

impl From<DefaultUnitRow> for DefaultMeasurementUnit {
    fn from(row: DefaultUnitRow) -> Self {
        DefaultMeasurementUnit {
            id: row.id,
            short_name: row.short_name,
            long_name: row.long_name,
            short_name_translation: translations(row.short_name_translation),
            long_name_translation: translations(row.long_name_translation),
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct CategoryRow {
    id: Uuid,
    company_id: Uuid,
    name: String,
    parent_id: Option<Uuid>,
    created_by: Option<Uuid>,
    created_at: NaiveDateTime,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            company_id: row.company_id,
            name: row.name,
            parent_id: row.parent_id,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct VatRow {
    id: Uuid,
    company_id: Uuid,
    name: String,
    percentage: f64,
    created_at: NaiveDateTime,
}

impl From<VatRow> for Vat {
    fn from(row: VatRow) -> Self {
        Vat {
            id: row.id,
            company_id: row.company_id,
            name: row.name,
            percentage: row.percentage,
            created_at: row.created_at,
        }
    }
}

const CATEGORY_COLUMNS: &str = "id, company_id, name, parent_id, created_by, created_at";

impl PgReferenceStore {
    /// Keep the tree one level deep: the parent is a live root category of
    /// the same company, and a category with live children cannot get a parent
    async fn check_parent(&self, company_id: Uuid, id: Option<Uuid>, parent_id: Option<Uuid>) -> CatalogResult<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        if Some(parent_id) == id {
            return Err(CatalogError::Validation("category cannot be its own parent".to_string()));
        }

        let parent = self.get_category(company_id, parent_id).await?;
        if parent.parent_id.is_some() {
            return Err(CatalogError::Validation(format!(
                "category {} is already a child and cannot have children",
                parent_id
            )));
        }

        if let Some(id) = id {
            let children = CountRow::find_by_statement(statement(
                r#"
                SELECT COUNT(*) AS count FROM category
                WHERE parent_id = $1 AND company_id = $2 AND deleted_at = 0
                "#,
                [id.into(), company_id.into()],
            ))
            .one(&self.db)
            .await?
            .map(|row| row.count)
            .unwrap_or_default();

            if children > 0 {
                return Err(CatalogError::Validation(format!(
                    "category {} has children and cannot become a child",
                    id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    async fn create_measurement_unit(
        &self,
        ctx: RequestContext,
        input: CreateMeasurementUnit,
    ) -> CatalogResult<MeasurementUnit> {
        let id = Uuid::new_v4();
        self.db
            .execute_raw(statement(
                r#"
                INSERT INTO measurement_unit (id, company_id, unit_id, precision_id, is_deletable, created_by)
                VALUES ($1, $2, $3, $4, TRUE, $5)
                "#,
                [
                    id.into(),
                    ctx.company_id.into(),
                    input.unit_id.into(),
                    input.precision_id.into(),
                    Some(ctx.user_id).into(),
                ],
            ))
            .await?;

        self.get_measurement_unit(ctx.company_id, id).await
    }

    async fn get_measurement_unit(&self, company_id: Uuid, id: Uuid) -> CatalogResult<MeasurementUnit> {
        let sql = format!("{MEASUREMENT_UNIT_SELECT} WHERE mu.id = $1 AND mu.company_id = $2 AND mu.deleted_at = 0");
        MeasurementUnitRow::find_by_statement(statement(&sql, [id.into(), company_id.into()]))
            .one(&self.db)
            .await?
            .map(Into::into)
            .ok_or_else(|| CatalogError::not_found("measurement unit", id))
    }

    async fn list_measurement_units(&self, company_id: Uuid) -> CatalogResult<Vec<MeasurementUnit>> {
        let sql = format!(
            "{MEASUREMENT_UNIT_SELECT} WHERE mu.company_id = $1 AND mu.deleted_at = 0 ORDER BY dmu.short_name"
        );
        let rows = MeasurementUnitRow::find_by_statement(statement(&sql, [company_id.into()]))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_default_units(&self) -> CatalogResult<Vec<DefaultMeasurementUnit>> {
        let rows = DefaultUnitRow::find_by_statement(statement(
            r#"
            SELECT id, short_name, long_name, short_name_translation, long_name_translation
            FROM default_measurement_unit
            WHERE deleted_at = 0
            ORDER BY short_name
            "#,
            [],
        ))
        .all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_category(&self, ctx: RequestContext, input: CategoryInput) -> CatalogResult<Category> {
        self.check_parent(ctx.company_id, None, input.parent_id).await?;

        let sql = format!(
            r#"
            INSERT INTO category (id, company_id, name, parent_id, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        CategoryRow::find_by_statement(statement(
            &sql,
            [
                Uuid::new_v4().into(),
                ctx.company_id.into(),
                input.name.into(),
                input.parent_id.into(),
                Some(ctx.user_id).into(),
            ],
        ))
        .one(&self.db)
        .await?
        .map(Into::into)
        .ok_or_else(|| CatalogError::Database("category insert returned no row".to_string()))
    }

    async fn update_category(&self, ctx: RequestContext, id: Uuid, input: CategoryInput) -> CatalogResult<Category> {
        self.check_parent(ctx.company_id, Some(id), input.parent_id).await?;

        let sql = format!(
            r#"
            UPDATE category SET name = $3, parent_id = $4
            WHERE id = $1 AND company_id = $2 AND deleted_at = 0
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        CategoryRow::find_by_statement(statement(
            &sql,
            [id.into(), ctx.company_id.into(), input.name.into(), input.parent_id.into()],
        ))
        .one(&self.db)
        .await?
        .map(Into::into)
        .ok_or_else(|| CatalogError::not_found("category", id))
    }

    async fn delete_category(&self, ctx: RequestContext, id: Uuid) -> CatalogResult<u64> {
        let sql = format!(
            r#"
            UPDATE category SET deleted_at = {NOW_EPOCH}
            WHERE company_id = $2 AND deleted_at = 0 AND (id = $1 OR parent_id = $1)
            "#
        );
        let affected = self
            .db
            .execute_raw(statement(&sql, [id.into(), ctx.company_id.into()]))
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(CatalogError::not_found("category", id));
        }
        Ok(affected)
    }

    async fn get_category(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Category> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM category WHERE id = $1 AND company_id = $2 AND deleted_at = 0");
        CategoryRow::find_by_statement(statement(&sql, [id.into(), company_id.into()]))
            .one(&self.db)
            .await?
            .map(Into::into)
            .ok_or_else(|| CatalogError::not_found("category", id))
    }

    async fn list_categories(&self, company_id: Uuid) -> CatalogResult<Vec<Category>> {
        let sql = format!(
            r#"
            SELECT {CATEGORY_COLUMNS} FROM category
            WHERE company_id = $1 AND deleted_at = 0
            ORDER BY parent_id NULLS FIRST, name
            "#
        );
        let rows = CategoryRow::find_by_statement(statement(&sql, [company_id.into()]))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_vat(&self, ctx: RequestContext, input: VatInput) -> CatalogResult<Vat> {
        VatRow::find_by_statement(statement(
            r#"
            INSERT INTO vat (id, company_id, name, percentage, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, company_id, name, percentage, created_at
            "#,
            [
                Uuid::new_v4().into(),
                ctx.company_id.into(),
                input.name.into(),
                input.percentage.into(),
                Some(ctx.user_id).into(),
            ],
        ))
        .one(&self.db)
        .await?
        .map(Into::into)
        .ok_or_else(|| CatalogError::Database("vat insert returned no row".to_string()))
    }

    async fn get_vat(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Vat> {
        VatRow::find_by_statement(statement(
            r#"
            SELECT id, company_id, name, percentage, created_at FROM vat
            WHERE id = $1 AND company_id = $2 AND deleted_at = 0
            "#,
            [id.into(), company_id.into()],
        ))
        .one(&self.db)
        .await?
        .map(Into::into)
        .ok_or_else(|| CatalogError::not_found("vat", id))
    }
}
