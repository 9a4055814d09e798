use async_trait::async_trait;
use database::elastic::ElasticConnection;
use event_bus::ReadinessCheck;
use sea_orm::DatabaseConnection;

/// `SELECT 1` against the product store
pub struct PostgresPing {
    db: DatabaseConnection,
}

impl PostgresPing {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReadinessCheck for PostgresPing {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn check(&self) -> Result<(), String> {
        database::postgres::check_health(&self.db)
            .await
            .map_err(|e| format!("error: {}", e))
    }
}

/// Cluster root request against the search index
pub struct ElasticPing {
    conn: ElasticConnection,
}

impl ElasticPing {
    pub fn new(conn: ElasticConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ReadinessCheck for ElasticPing {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn check(&self) -> Result<(), String> {
        self.conn.ping().await.map_err(|e| format!("error: {}", e))
    }
}
