//! Mocked dependencies and sample rows shared by unit tests

use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::models::{MeasurementUnit, Precision, Product, ShortMeasurementUnit, Vat};
use crate::repository::{
    MockEventPublisher, MockObjectStorage, MockProductIndex, MockProductStore, MockReferenceStore,
    MockTenantStore,
};
use crate::service::{CatalogDeps, CatalogService};

#[derive(Default)]
pub struct TestDeps {
    pub products: MockProductStore,
    pub index: MockProductIndex,
    pub references: MockReferenceStore,
    pub tenants: MockTenantStore,
    pub publisher: MockEventPublisher,
    pub storage: MockObjectStorage,
}

impl TestDeps {
    pub fn service(self) -> CatalogService {
        CatalogService::new(
            CatalogDeps {
                products: Arc::new(self.products),
                index: Arc::new(self.index),
                references: Arc::new(self.references),
                tenants: Arc::new(self.tenants),
                publisher: Arc::new(self.publisher),
                storage: Arc::new(self.storage),
            },
            CatalogConfig::new("cdn.example.com"),
        )
    }
}

pub fn measurement_unit(company_id: Uuid, id: Uuid) -> MeasurementUnit {
    MeasurementUnit {
        id,
        company_id,
        unit_id: Uuid::new_v4(),
        short_name: "kg".into(),
        long_name: "kilogram".into(),
        precision: Some(Precision {
            id: Uuid::new_v4(),
            value: "0.001".into(),
        }),
        is_deletable: false,
        short_name_translation: Default::default(),
        long_name_translation: Default::default(),
        created_by: None,
        created_at: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
    }
}

pub fn vat(company_id: Uuid, id: Uuid) -> Vat {
    Vat {
        id,
        company_id,
        name: "VAT 12%".into(),
        percentage: 12.0,
        created_at: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
    }
}

pub fn product(company_id: Uuid, id: Uuid, version: i32, name: &str) -> Product {
    let at = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
    Product {
        id,
        company_id,
        product_type_id: "single".into(),
        parent_id: None,
        current_version: version,
        detail_id: Uuid::new_v4(),
        sku: format!("SKU-{}", version),
        name: name.to_string(),
        mxik_code: String::new(),
        is_marking: false,
        brand_id: None,
        description: String::new(),
        measurement_unit: Some(ShortMeasurementUnit::from(&measurement_unit(company_id, Uuid::new_v4()))),
        supplier: None,
        vat: None,
        barcodes: vec!["4780000000017".into()],
        images: vec![],
        categories: vec![],
        tag_ids: vec![],
        measurement_values: vec![],
        shop_prices: vec![],
        created_by: None,
        created_at: at,
        updated_at: at,
    }
}
