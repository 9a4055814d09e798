use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// Per-locale display names, e.g. `{"ru": "шт", "uz": "dona"}`
pub type Translations = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
    pub id: Uuid,
    pub value: String,
}

/// A company's copy of a global measurement unit. Names and translations
/// come from the global row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementUnit {
    pub id: Uuid,
    pub company_id: Uuid,
    pub unit_id: Uuid,
    pub short_name: String,
    pub long_name: String,
    pub precision: Option<Precision>,
    pub is_deletable: bool,
    pub short_name_translation: Translations,
    pub long_name_translation: Translations,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

/// Global unit every company gets a copy of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultMeasurementUnit {
    pub id: Uuid,
    pub short_name: String,
    pub long_name: String,
    pub short_name_translation: Translations,
    pub long_name_translation: Translations,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMeasurementUnit {
    /// Global unit being adopted
    pub unit_id: Uuid,
    pub precision_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vat {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub percentage: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct VatInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 0.0, max = 100.0))]
    pub percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vat_percentage_bounds() {
        let vat = VatInput { name: "VAT".into(), percentage: 12.0 };
        assert!(vat.validate().is_ok());

        let vat = VatInput { percentage: 120.0, ..vat };
        assert!(vat.validate().is_err());
    }

    #[test]
    fn test_category_requires_name() {
        assert!(CategoryInput::default().validate().is_err());
    }
}
