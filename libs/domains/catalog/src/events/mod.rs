//! Event propagation: topics, payloads, replication use cases and the bus
//! handler that feeds them

mod handlers;
mod payloads;
mod replication;
pub mod topics;

pub use handlers::CatalogEventHandler;
pub use payloads::*;
pub use topics::ConsumedTopic;
