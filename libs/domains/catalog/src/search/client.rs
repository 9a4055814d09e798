use async_trait::async_trait;
use database::elastic::ElasticConnection;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::PRODUCT_INDEX;
use super::mapping::index_mapping;
use super::query::{get_all_body, ids_query, search_body};
use super::scripts::{BULK_UPDATE, UPSERT_SHOP_SLOTS};
use crate::bulk_edit::BulkEditField;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    Page, PriceUpdate, ProductDocument, ProductPage, ProductPatch, ProductQuery, ShopMeasurementValue,
    ShopPrice, StockUpdate,
};
use crate::repository::ProductIndex;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
    #[serde(default)]
    aggregations: Option<Aggregations>,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<Total>,
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Total {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: ProductDocument,
}

#[derive(Debug, Deserialize)]
struct Aggregations {
    total_retail_price: Option<SumValue>,
    total_supply_price: Option<SumValue>,
}

#[derive(Debug, Deserialize)]
struct SumValue {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<ProductDocument>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ByQueryResponse {
    #[serde(default)]
    updated: u64,
    #[serde(default)]
    deleted: u64,
    #[serde(default)]
    noops: u64,
    #[serde(default)]
    failures: Vec<Value>,
}

/// [`ProductIndex`] over the Elasticsearch REST API.
///
/// Every mutating call checks that the index exists and creates it with the
/// explicit mapping when it does not, so a dropped index never comes back
/// with a dynamic mapping.
pub struct EsProductIndex {
    conn: ElasticConnection,
    index: String,
}

impl EsProductIndex {
    pub fn new(conn: ElasticConnection) -> Self {
        Self {
            conn,
            index: PRODUCT_INDEX.to_string(),
        }
    }

    /// Use another index name, e.g. one per test
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.conn.request(method, &format!("/{}{}", self.index, path))
    }

    async fn ensure_index(&self) -> CatalogResult<()> {
        let exists = self
            .request(Method::HEAD, "")
            .send()
            .await
            .map_err(|e| CatalogError::dependency("index lookup", self.index.as_str(), e))?;
        if exists.status().is_success() {
            return Ok(());
        }

        let response = self
            .request(Method::PUT, "")
            .json(&index_mapping())
            .send()
            .await
            .map_err(|e| CatalogError::dependency("index create", self.index.as_str(), e))?;

        if response.status().is_success() {
            info!(index = %self.index, "Created search index");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        // Lost a creation race with another replica
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(CatalogError::dependency(
            "index create",
            self.index.as_str(),
            format!("{}: {}", status, body),
        ))
    }

    /// Send and require a success status
    async fn send(&self, operation: &'static str, entity: String, request: RequestBuilder) -> CatalogResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::dependency(operation, entity.as_str(), e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::dependency(operation, entity, format!("{}: {}", status, body)))
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        operation: &'static str,
        entity: String,
        response: Response,
    ) -> CatalogResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::dependency(operation, entity, e))
    }

    async fn search_page(&self, entity: String, body: Value) -> CatalogResult<ProductPage> {
        let response = self
            .send("index search", entity.clone(), self.request(Method::POST, "/_search").json(&body))
            .await?;
        let result: SearchResponse = Self::decode("index search", entity, response).await?;

        let total = result.hits.total.map(|t| t.value).unwrap_or(result.hits.hits.len() as u64);
        let (total_retail_price, total_supply_price) = match result.aggregations {
            Some(aggs) => (
                aggs.total_retail_price.and_then(|a| a.value),
                aggs.total_supply_price.and_then(|a| a.value),
            ),
            None => (None, None),
        };

        Ok(ProductPage {
            items: result.hits.hits.into_iter().map(|hit| hit.source).collect(),
            total,
            total_retail_price,
            total_supply_price,
        })
    }

    /// Run a painless script over the tenant's documents among `ids`
    async fn update_by_query(
        &self,
        operation: &'static str,
        company_id: Uuid,
        ids: &[Uuid],
        script: &str,
        params: Value,
        refresh: bool,
    ) -> CatalogResult<()> {
        self.ensure_index().await?;

        let entity = format!("{} products of company {}", ids.len(), company_id);
        let body = json!({
            "query": ids_query(company_id, ids),
            "script": { "lang": "painless", "source": script, "params": params }
        });
        let request = self
            .request(Method::POST, "/_update_by_query")
            .query(&[("refresh", if refresh { "true" } else { "false" })])
            .json(&body);

        let response = self.send(operation, entity.clone(), request).await?;
        let result: ByQueryResponse = Self::decode(operation, entity.clone(), response).await?;
        if let Some(failure) = result.failures.first() {
            return Err(CatalogError::dependency(operation, entity, failure.to_string()));
        }

        debug!(operation, updated = result.updated, noops = result.noops, "Scripted update applied");
        Ok(())
    }

    async fn delete_by_ids(&self, company_id: Uuid, ids: &[Uuid]) -> CatalogResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ensure_index().await?;

        let entity = format!("{} products of company {}", ids.len(), company_id);
        let request = self
            .request(Method::POST, "/_delete_by_query")
            .query(&[("refresh", "true")])
            .json(&json!({ "query": ids_query(company_id, ids) }));

        let response = self.send("index delete", entity.clone(), request).await?;
        let result: ByQueryResponse = Self::decode("index delete", entity.clone(), response).await?;
        if let Some(failure) = result.failures.first() {
            return Err(CatalogError::dependency("index delete", entity, failure.to_string()));
        }

        debug!(deleted = result.deleted, "Deleted product documents");
        Ok(())
    }
}

/// Group per-shop rows by product for the slot script
fn slots_by_product<T: Clone>(rows: impl Iterator<Item = (Uuid, T)>) -> BTreeMap<Uuid, Vec<T>> {
    let mut grouped: BTreeMap<Uuid, Vec<T>> = BTreeMap::new();
    for (product_id, slot) in rows {
        grouped.entry(product_id).or_default().push(slot);
    }
    grouped
}

#[async_trait]
impl ProductIndex for EsProductIndex {
    #[instrument(skip(self, document), fields(product_id = %document.id))]
    async fn create(&self, document: ProductDocument) -> CatalogResult<()> {
        self.ensure_index().await?;

        let request = self
            .request(Method::PUT, &format!("/_doc/{}", document.id))
            .query(&[("refresh", "wait_for")])
            .json(&document);
        self.send("index create", format!("product {}", document.id), request)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, document), fields(product_id = %document.id))]
    async fn update(&self, document: ProductDocument) -> CatalogResult<()> {
        self.ensure_index().await?;

        let request = self
            .request(Method::POST, &format!("/_update/{}", document.id))
            .query(&[("refresh", "wait_for"), ("retry_on_conflict", "3")])
            .json(&json!({ "doc": document, "doc_as_upsert": true }));
        self.send("index update", format!("product {}", document.id), request)
            .await?;
        Ok(())
    }

    async fn get(&self, company_id: Uuid, id: Uuid) -> CatalogResult<Option<ProductDocument>> {
        let entity = format!("product {}", id);
        let response = self
            .request(Method::GET, &format!("/_doc/{}", id))
            .send()
            .await
            .map_err(|e| CatalogError::dependency("index get", entity.as_str(), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::dependency("index get", entity, format!("{}: {}", status, body)));
        }

        let result: GetResponse = Self::decode("index get", entity, response).await?;
        Ok(result
            .source
            .filter(|document| result.found && document.company_id == company_id))
    }

    async fn get_many(&self, company_id: Uuid, ids: Vec<Uuid>) -> CatalogResult<Vec<ProductDocument>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "query": ids_query(company_id, &ids),
            "size": ids.len(),
        });
        let page = self
            .search_page(format!("{} products of company {}", ids.len(), company_id), body)
            .await?;

        // Preserve the requested order
        let mut by_id: BTreeMap<Uuid, ProductDocument> = page.items.into_iter().map(|d| (d.id, d)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn delete(&self, company_id: Uuid, id: Uuid) -> CatalogResult<()> {
        self.delete_by_ids(company_id, &[id]).await
    }

    async fn delete_many(&self, company_id: Uuid, ids: Vec<Uuid>) -> CatalogResult<()> {
        self.delete_by_ids(company_id, &ids).await
    }

    #[instrument(skip(self, query))]
    async fn get_all(&self, company_id: Uuid, query: ProductQuery) -> CatalogResult<ProductPage> {
        let body = get_all_body(company_id, &query)?;
        self.search_page(format!("products of company {}", company_id), body)
            .await
    }

    async fn search(&self, company_id: Uuid, text: String, page: Page) -> CatalogResult<ProductPage> {
        let body = search_body(company_id, &text, page);
        self.search_page(format!("products of company {}", company_id), body)
            .await
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn insert_many(&self, documents: Vec<ProductDocument>) -> CatalogResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        self.ensure_index().await?;

        let mut body = String::new();
        for document in &documents {
            let action = json!({ "update": { "_index": self.index, "_id": document.id, "retry_on_conflict": 3 } });
            let source = json!({ "doc": document, "doc_as_upsert": true });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&source.to_string());
            body.push('\n');
        }

        let entity = format!("{} products", documents.len());
        let request = self
            .conn
            .request(Method::POST, "/_bulk")
            .query(&[("refresh", "wait_for")])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let response = self.send("index bulk insert", entity.clone(), request).await?;
        let result: BulkResponse = Self::decode("index bulk insert", entity.clone(), response).await?;
        if result.errors {
            let first = result
                .items
                .iter()
                .find_map(|item| item.get("update").and_then(|u| u.get("error")).cloned())
                .unwrap_or(Value::Null);
            return Err(CatalogError::dependency("index bulk insert", entity, first.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, patches, shop_ids), fields(field = %field, count = patches.len()))]
    async fn bulk_update(
        &self,
        company_id: Uuid,
        field: BulkEditField,
        patches: BTreeMap<Uuid, ProductPatch>,
        shop_ids: Vec<Uuid>,
    ) -> CatalogResult<()> {
        let ids: Vec<Uuid> = patches.keys().copied().collect();
        let params = json!({ "field": field.as_ref(), "products": patches, "shop_ids": shop_ids });
        self.update_by_query("index bulk update", company_id, &ids, BULK_UPDATE, params, true)
            .await
    }

    async fn upsert_measurement_values(&self, company_id: Uuid, values: Vec<StockUpdate>) -> CatalogResult<()> {
        let grouped: BTreeMap<Uuid, Vec<ShopMeasurementValue>> =
            slots_by_product(values.into_iter().map(|row| (row.product_id, row.value)));
        if grouped.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = grouped.keys().copied().collect();
        let params = json!({ "target": "measurement_values", "products": grouped });
        self.update_by_query("index stock upsert", company_id, &ids, UPSERT_SHOP_SLOTS, params, false)
            .await
    }

    async fn upsert_shop_prices(&self, company_id: Uuid, prices: Vec<PriceUpdate>) -> CatalogResult<()> {
        let grouped: BTreeMap<Uuid, Vec<ShopPrice>> =
            slots_by_product(prices.into_iter().map(|row| (row.product_id, row.price)));
        if grouped.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = grouped.keys().copied().collect();
        let params = json!({ "target": "shop_prices", "products": grouped });
        self.update_by_query("index price upsert", company_id, &ids, UPSERT_SHOP_SLOTS, params, false)
            .await
    }
}
