//! Store tests against a real PostgreSQL, started with testcontainers.
//!
//! Run with `cargo test -p domain_catalog -- --ignored`.

use domain_catalog::models::{
    CategoryInput, Company, OrderItem, PriceUpdate, ProductCopy, ProductInput, Shop, ShopMeasurementValue, ShopPrice,
    ShopValueCopy, StockLevel,
};
use domain_catalog::{
    BulkChange, CatalogError, PgProductStore, PgReferenceStore, PgTenantStore, ProductStore, ReferenceStore,
    RequestContext, TenantStore,
};
use sea_orm::{DatabaseConnection, DbBackend, FromQueryResult, Statement};
use test_utils::{TestDataBuilder, TestDatabase};
use uuid::Uuid;

fn input(name: &str, shop_id: Uuid) -> ProductInput {
    ProductInput {
        product_type_id: "single".into(),
        name: name.into(),
        sku: "SKU-1".into(),
        measurement_unit_id: Uuid::new_v4(),
        supplier_id: Uuid::new_v4(),
        vat_id: Uuid::new_v4(),
        barcodes: vec!["4780000000017".into(), "4780000000017".into()],
        measurement_values: vec![ShopMeasurementValue {
            shop_id,
            amount: 10.0,
            is_available: true,
            ..Default::default()
        }],
        shop_prices: vec![ShopPrice {
            shop_id,
            retail_price: 100.0,
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[derive(Debug, FromQueryResult)]
struct DetailRow {
    name: String,
    measurement_unit_id: Uuid,
}

async fn detail_at(db: &DatabaseConnection, product_id: Uuid, version: i32) -> Option<DetailRow> {
    DetailRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT name, measurement_unit_id FROM product_detail WHERE product_id = $1 AND version = $2",
        [product_id.into(), version.into()],
    ))
    .one(db)
    .await
    .unwrap()
}

async fn setup(test_name: &str) -> (TestDatabase, TestDataBuilder, RequestContext, Uuid) {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name(test_name);
    let company_id = db.seed_company(builder.company_id()).await;
    let shop_id = db.seed_shop(company_id, builder.shop_id(1), "Main").await;
    let ctx = RequestContext::new(company_id, builder.user_id());
    (db, builder, ctx, shop_id)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_appends_a_version() {
    let (db, _, ctx, shop_id) = setup("test_update_appends_a_version").await;
    let store = PgProductStore::new(db.connection());

    let created = store.create(ctx, input("Milk", shop_id)).await.unwrap();
    let v1 = store.get_by_id(ctx, created.product_id).await.unwrap();
    assert_eq!(v1.current_version, 1);
    assert_eq!(v1.barcodes.len(), 1);
    assert_eq!(v1.measurement_values[0].shop_name, "Main");

    let updated = store
        .update(ctx, created.product_id, input("Kefir", shop_id))
        .await
        .unwrap();
    assert_ne!(updated.product_detail_id, created.product_detail_id);

    let v2 = store.get_by_id(ctx, created.product_id).await.unwrap();
    assert_eq!(v2.current_version, 2);
    assert_eq!(v2.name, "Kefir");
    assert_eq!(v2.detail_id, updated.product_detail_id);

    let v1_row = detail_at(&db.connection(), created.product_id, 1).await.unwrap();
    assert_eq!(v1_row.name, "Milk");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_other_tenant_sees_nothing() {
    let (db, _, ctx, shop_id) = setup("test_other_tenant_sees_nothing").await;
    let store = PgProductStore::new(db.connection());

    let created = store.create(ctx, input("Milk", shop_id)).await.unwrap();
    let stranger = RequestContext::new(Uuid::new_v4(), ctx.user_id);

    assert!(matches!(
        store.get_by_id(stranger, created.product_id).await,
        Err(CatalogError::NotFound { .. })
    ));
    assert!(matches!(
        store.update(stranger, created.product_id, input("Kefir", shop_id)).await,
        Err(CatalogError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_many_is_all_or_nothing() {
    let (db, _, ctx, shop_id) = setup("test_delete_many_is_all_or_nothing").await;
    let store = PgProductStore::new(db.connection());

    let a = store.create(ctx, input("A", shop_id)).await.unwrap().product_id;
    let b = store.create(ctx, input("B", shop_id)).await.unwrap().product_id;

    let result = store.delete_many(ctx, vec![a, b, Uuid::new_v4()]).await;
    assert!(matches!(result, Err(CatalogError::PartialBatch { requested: 3, affected: 2 })));
    assert!(store.get_by_id(ctx, a).await.is_ok());

    assert_eq!(store.delete_many(ctx, vec![a, b, a]).await.unwrap(), 2);
    assert!(matches!(store.get_by_id(ctx, a).await, Err(CatalogError::NotFound { .. })));
    assert!(matches!(store.delete(ctx, b).await, Err(CatalogError::NotFound { .. })));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stock_and_price_upserts_are_idempotent() {
    let (db, _, ctx, shop_id) = setup("test_stock_and_price_upserts_are_idempotent").await;
    let store = PgProductStore::new(db.connection());
    let product_id = store.create(ctx, input("Milk", shop_id)).await.unwrap().product_id;

    let levels = vec![StockLevel { product_id, amount: 42.0 }];
    let first = store.upsert_measurement_values(ctx, shop_id, levels.clone()).await.unwrap();
    let second = store.upsert_measurement_values(ctx, shop_id, levels).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second[0].value.amount, 42.0);
    assert!(second[0].value.is_available);

    let prices = vec![PriceUpdate {
        product_id,
        price: ShopPrice {
            retail_price: 120.0,
            supply_price: 90.0,
            ..Default::default()
        },
    }];
    let stored = store.upsert_shop_prices(ctx, shop_id, prices).await.unwrap();
    assert_eq!(stored[0].price.shop_id, shop_id);
    assert_eq!(stored[0].price.shop_name, "Main");

    let product = store.get_by_id(ctx, product_id).await.unwrap();
    assert_eq!(product.measurement_values.len(), 1);
    assert_eq!(product.shop_prices[0].retail_price, 120.0);

    let unknown = vec![StockLevel {
        product_id: Uuid::new_v4(),
        amount: 1.0,
    }];
    assert!(matches!(
        store.upsert_measurement_values(ctx, shop_id, unknown).await,
        Err(CatalogError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_low_stock_bulk_edit() {
    let (db, builder, ctx, shop_id) = setup("test_low_stock_bulk_edit").await;
    let other_shop = db.seed_shop(ctx.company_id, builder.shop_id(2), "Second").await;
    let store = PgProductStore::new(db.connection());

    let a = store.create(ctx, input("A", shop_id)).await.unwrap().product_id;
    let b = store.create(ctx, input("B", shop_id)).await.unwrap().product_id;

    let affected = store
        .bulk_edit(
            ctx,
            vec![a, b],
            BulkChange::LowStock {
                small_left: 5.0,
                shop_ids: vec![shop_id],
            },
        )
        .await
        .unwrap();
    assert_eq!(affected, 2);

    for id in [a, b] {
        let product = store.get_by_id(ctx, id).await.unwrap();
        assert_eq!(product.measurement_values[0].small_left, 5.0);
    }

    let result = store
        .bulk_edit(
            ctx,
            vec![a],
            BulkChange::LowStock {
                small_left: 1.0,
                shop_ids: vec![other_shop],
            },
        )
        .await;
    assert!(matches!(result, Err(CatalogError::NotFound { .. })));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_provision_company_copies_default_units_once() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("test_provision_company_copies_default_units_once");
    db.seed_default_unit(Uuid::new_v4(), "kg", "kilogram").await;
    db.seed_default_unit(Uuid::new_v4(), "pcs", "piece").await;

    let store = PgTenantStore::new(db.connection());
    let company = Company {
        id: builder.company_id(),
        name: "Acme".into(),
        created_by: Some(builder.user_id()),
    };
    let shop = Shop {
        id: builder.shop_id(1),
        company_id: company.id,
        name: "Main".into(),
    };

    let units = store.provision_company(company.clone(), shop.clone()).await.unwrap();
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|unit| unit.company_id == company.id && !unit.is_deletable));

    let replayed = store.provision_company(company, shop).await.unwrap();
    let mut first: Vec<Uuid> = units.iter().map(|unit| unit.id).collect();
    let mut second: Vec<Uuid> = replayed.iter().map(|unit| unit.id).collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
}

fn copy(builder: &TestDataBuilder, company_id: Uuid, shop_id: Uuid) -> ProductCopy {
    ProductCopy {
        id: builder.product_id(1),
        company_id,
        created_by: Some(builder.user_id()),
        product_type_id: "single".into(),
        parent_id: None,
        sku: "SKU-9".into(),
        name: "Imported".into(),
        mxik_code: String::new(),
        is_marking: false,
        brand_id: None,
        description: String::new(),
        image: "imported.png".into(),
        measurement_unit_id: Uuid::new_v4(),
        supplier_id: None,
        vat_id: None,
        barcodes: vec!["4780000000024".into()],
        shop_measurement_values: vec![ShopValueCopy {
            shop_id,
            is_available: true,
            in_stock: 4.0,
            retail_price: 50.0,
            ..Default::default()
        }],
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_many_replay_leaves_one_version() {
    let (db, builder, ctx, shop_id) = setup("test_insert_many_replay_leaves_one_version").await;
    let store = PgProductStore::new(db.connection());
    let product = copy(&builder, ctx.company_id, shop_id);

    store.insert_many(vec![product.clone()]).await.unwrap();
    store.insert_many(vec![product.clone(), product.clone()]).await.unwrap();

    let stored = store.get_by_id(ctx, product.id).await.unwrap();
    assert_eq!(stored.current_version, 1);
    assert_eq!(stored.name, "Imported");
    assert_eq!(stored.barcodes, vec!["4780000000024".to_string()]);
    assert_eq!(stored.images.len(), 1);
    assert_eq!(stored.measurement_values.len(), 1);
    assert_eq!(stored.measurement_values[0].amount, 4.0);
    assert_eq!(stored.shop_prices.len(), 1);
    assert!(detail_at(&db.connection(), product.id, 2).await.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_decrement_stock_applies_an_order_once() {
    let (db, _, ctx, shop_id) = setup("test_decrement_stock_applies_an_order_once").await;
    let store = PgProductStore::new(db.connection());
    let product_id = store.create(ctx, input("Milk", shop_id)).await.unwrap().product_id;
    let unknown = Uuid::new_v4();
    let order_id = Uuid::new_v4();
    let items = vec![
        OrderItem { product_id, value: 2.0 },
        OrderItem { product_id, value: 1.0 },
        OrderItem {
            product_id: unknown,
            value: 5.0,
        },
    ];

    let first = store
        .decrement_stock(ctx.company_id, order_id, shop_id, items.clone())
        .await
        .unwrap();
    assert!(!first.replayed);
    assert_eq!(first.missing, vec![unknown]);
    assert_eq!(first.stored.len(), 1);
    assert_eq!(first.stored[0].value.amount, 7.0);
    assert_eq!(first.stored[0].value.shop_name, "Main");

    let replay = store
        .decrement_stock(ctx.company_id, order_id, shop_id, items.clone())
        .await
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.missing, vec![unknown]);
    assert_eq!(replay.stored, first.stored);

    let product = store.get_by_id(ctx, product_id).await.unwrap();
    assert_eq!(product.measurement_values[0].amount, 7.0);

    let next = store
        .decrement_stock(ctx.company_id, Uuid::new_v4(), shop_id, items)
        .await
        .unwrap();
    assert_eq!(next.stored[0].value.amount, 4.0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_name_and_unit_bulk_edits_rewrite_the_current_detail() {
    let (db, _, ctx, shop_id) = setup("test_name_and_unit_bulk_edits_rewrite_the_current_detail").await;
    let store = PgProductStore::new(db.connection());

    let a = store.create(ctx, input("A", shop_id)).await.unwrap().product_id;
    store.update(ctx, a, input("A2", shop_id)).await.unwrap();
    let b = store.create(ctx, input("B", shop_id)).await.unwrap().product_id;

    let affected = store
        .bulk_edit(ctx, vec![a, b, a], BulkChange::Name("Renamed".into()))
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let unit_id = Uuid::new_v4();
    let affected = store
        .bulk_edit(ctx, vec![a, b], BulkChange::MeasurementUnit(unit_id))
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let conn = db.connection();
    let current = detail_at(&conn, a, 2).await.unwrap();
    assert_eq!(current.name, "Renamed");
    assert_eq!(current.measurement_unit_id, unit_id);
    assert_eq!(detail_at(&conn, a, 1).await.unwrap().name, "A");
    assert_eq!(store.get_by_id(ctx, b).await.unwrap().name, "Renamed");

    let stranger = RequestContext::new(Uuid::new_v4(), ctx.user_id);
    assert!(matches!(
        store.bulk_edit(stranger, vec![a], BulkChange::Name("x".into())).await,
        Err(CatalogError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_category_bulk_edit_counts_already_linked_products() {
    let (db, _, ctx, shop_id) = setup("test_category_bulk_edit_counts_already_linked_products").await;
    let store = PgProductStore::new(db.connection());
    let references = PgReferenceStore::new(db.connection());

    let category = references
        .create_category(
            ctx,
            CategoryInput {
                name: "Dairy".into(),
                parent_id: None,
            },
        )
        .await
        .unwrap();
    let a = store.create(ctx, input("A", shop_id)).await.unwrap().product_id;
    let b = store.create(ctx, input("B", shop_id)).await.unwrap().product_id;

    let change = BulkChange::Category(category.id);
    assert_eq!(store.bulk_edit(ctx, vec![a, b], change.clone()).await.unwrap(), 2);
    assert_eq!(store.bulk_edit(ctx, vec![a, b], change).await.unwrap(), 2);

    let product = store.get_by_id(ctx, a).await.unwrap();
    assert_eq!(product.categories.len(), 1);
    assert_eq!(product.categories[0].id, category.id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_child_categories_cannot_nest() {
    let (db, _, ctx, _) = setup("test_child_categories_cannot_nest").await;
    let references = PgReferenceStore::new(db.connection());
    let category = |name: &str, parent_id: Option<Uuid>| CategoryInput {
        name: name.into(),
        parent_id,
    };

    let root_a = references.create_category(ctx, category("A", None)).await.unwrap();
    references.create_category(ctx, category("B", Some(root_a.id))).await.unwrap();
    let root_c = references.create_category(ctx, category("C", None)).await.unwrap();

    let moved = references
        .update_category(ctx, root_c.id, category("C", Some(root_a.id)))
        .await
        .unwrap();
    assert_eq!(moved.parent_id, Some(root_a.id));

    let root_d = references.create_category(ctx, category("D", None)).await.unwrap();
    assert!(matches!(
        references
            .update_category(ctx, root_a.id, category("A", Some(root_d.id)))
            .await,
        Err(CatalogError::Validation(_))
    ));
    assert!(matches!(
        references.create_category(ctx, category("E", Some(root_c.id))).await,
        Err(CatalogError::Validation(_))
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_category_takes_direct_children() {
    let (db, _, ctx, _) = setup("test_delete_category_takes_direct_children").await;
    let references = PgReferenceStore::new(db.connection());
    let category = |name: &str, parent_id: Option<Uuid>| CategoryInput {
        name: name.into(),
        parent_id,
    };

    let root = references.create_category(ctx, category("Drinks", None)).await.unwrap();
    let child = references.create_category(ctx, category("Juice", Some(root.id))).await.unwrap();
    let other = references.create_category(ctx, category("Bakery", None)).await.unwrap();

    assert_eq!(references.delete_category(ctx, root.id).await.unwrap(), 2);
    assert!(matches!(
        references.get_category(ctx.company_id, child.id).await,
        Err(CatalogError::NotFound { .. })
    ));

    let remaining = references.list_categories(ctx.company_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, other.id);
    assert!(matches!(
        references.delete_category(ctx, root.id).await,
        Err(CatalogError::NotFound { .. })
    ));
}
