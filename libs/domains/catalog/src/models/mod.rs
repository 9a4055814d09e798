//! Catalog data model

mod document;
mod product;
mod query;
mod reference;
mod tenant;

pub use document::*;
pub use product::*;
pub use query::*;
pub use reference::*;
pub use tenant::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `YYYY-MM-DD HH:MM:SS`, the timestamp format of search documents and exports
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Caller identity carried by every operation. Every query is scoped by
/// `company_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub company_id: Uuid,
    pub user_id: Uuid,
}

impl RequestContext {
    pub fn new(company_id: Uuid, user_id: Uuid) -> Self {
        Self { company_id, user_id }
    }
}

/// 1-based page plus page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.limit as u64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}
