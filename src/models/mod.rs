//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains the records, queries and response envelopes exchanged with the API.

pub mod database;
pub mod query;
pub mod resource;
pub mod table;

// Re-export commonly used types
pub use database::*;
pub use query::*;
pub use resource::*;
pub use table::*;

use serde::Deserialize;

/// Envelope of every collection endpoint
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub count: usize,
    pub result: Vec<T>,
}

/// Envelope of single-value endpoints (schemas, csrf token, ...)
#[derive(Debug, Deserialize)]
pub struct ResultResponse<T> {
    pub result: T,
}

/// One entry of a favorite status lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FavoriteStatusEntry {
    pub id: i64,
    pub value: bool,
}
