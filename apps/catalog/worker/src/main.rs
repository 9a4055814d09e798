//! Catalog Worker - Entry Point
//!
//! Replicates events from other services into the catalog stores.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    catalog_worker::run().await
}
