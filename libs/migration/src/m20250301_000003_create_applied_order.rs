use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Orders whose quantities were already subtracted from a shop's stock.
/// A redelivered order finds its row here and is not subtracted again.
const UP: &str = r#"
    CREATE TABLE IF NOT EXISTS applied_order (
        order_id    UUID NOT NULL,
        shop_id     UUID NOT NULL,
        company_id  UUID NOT NULL,
        applied_at  TIMESTAMP NOT NULL DEFAULT NOW(),
        PRIMARY KEY (order_id, shop_id)
    )
"#;

const DOWN: &str = "DROP TABLE IF EXISTS applied_order";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(DOWN).await?;
        Ok(())
    }
}
