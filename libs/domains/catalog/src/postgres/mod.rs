//! Raw-SQL stores over a SeaORM connection

mod product;
mod reference;
mod tenant;

pub use product::PgProductStore;
pub use reference::PgReferenceStore;
pub use tenant::PgTenantStore;

use chrono::NaiveDateTime;
use sea_orm::{DbBackend, FromQueryResult, Statement, Value};
use uuid::Uuid;

use crate::models::{MeasurementUnit, Precision, Translations};

/// Tombstone value for `deleted_at`
pub(crate) const NOW_EPOCH: &str = "extract(epoch from now())::bigint";

pub(crate) fn statement<I>(sql: &str, values: I) -> Statement
where
    I: IntoIterator<Item = Value>,
{
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

/// `($1, $2), ($3, $4)` for a multi-row `VALUES` list, numbering from
/// `offset + 1`
pub(crate) fn values_placeholders(rows: usize, columns: usize, offset: usize) -> String {
    (0..rows)
        .map(|row| {
            let cells = (1..=columns)
                .map(|col| format!("${}", offset + row * columns + col))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", cells)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Order-preserving de-duplication
pub(crate) fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

pub(crate) fn translations(value: serde_json::Value) -> Translations {
    serde_json::from_value(value).unwrap_or_default()
}

/// Company unit joined with its global row and precision
pub(crate) const MEASUREMENT_UNIT_SELECT: &str = r#"
    SELECT mu.id, mu.company_id, mu.unit_id, mu.is_deletable, mu.created_by, mu.created_at,
           dmu.short_name, dmu.long_name, dmu.short_name_translation, dmu.long_name_translation,
           mp.id AS precision_id, mp.value AS precision_value
    FROM measurement_unit mu
    JOIN default_measurement_unit dmu ON dmu.id = mu.unit_id
    LEFT JOIN measurement_precision mp ON mp.id = mu.precision_id
"#;

#[derive(Debug, FromQueryResult)]
pub(crate) struct CountRow {
    pub count: i64,
}

#[derive(Debug, FromQueryResult)]
pub(crate) struct MeasurementUnitRow {
    id: Uuid,
    company_id: Uuid,
    unit_id: Uuid,
    is_deletable: bool,
    created_by: Option<Uuid>,
    created_at: NaiveDateTime,
    short_name: String,
    long_name: String,
    short_name_translation: serde_json::Value,
    long_name_translation: serde_json::Value,
    precision_id: Option<Uuid>,
    precision_value: Option<String>,
}

impl From<MeasurementUnitRow> for MeasurementUnit {
    fn from(row: MeasurementUnitRow) -> Self {
        let precision = match (row.precision_id, row.precision_value) {
            (Some(id), Some(value)) => Some(Precision { id, value }),
            _ => None,
        };

        MeasurementUnit {
            id: row.id,
            company_id: row.company_id,
            unit_id: row.unit_id,
            short_name: row.short_name,
            long_name: row.long_name,
            precision,
            is_deletable: row.is_deletable,
            short_name_translation: translations(row.short_name_translation),
            long_name_translation: translations(row.long_name_translation),
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_placeholders() {
        assert_eq!(values_placeholders(2, 2, 0), "($1, $2), ($3, $4)");
        assert_eq!(values_placeholders(1, 3, 4), "($5, $6, $7)");
        assert_eq!(values_placeholders(0, 3, 0), "");
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(dedup_ids(&[a, b, a, b, a]), vec![a, b]);
    }

    #[test]
    fn test_translations_tolerate_bad_json() {
        let parsed = translations(serde_json::json!({"ru": "шт"}));
        assert_eq!(parsed.get("ru").map(String::as_str), Some("шт"));
        assert!(translations(serde_json::json!([1, 2])).is_empty());
    }
}
