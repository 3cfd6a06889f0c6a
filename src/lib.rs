//! superset-admin - headless list views for a BI server's REST API
//!
//! Controllers hold the state of the admin list screens (resource pages,
//! favorites, the database/schema selector and the import modal) and talk
//! to the server through `SupersetClient`. Rendering is left to the caller:
//! state is read back through accessors, errors arrive as toasts or events.

pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod favorites;
pub mod fetcher;
pub mod import;
pub mod models;
pub mod notify;
pub mod rison;
pub mod selector;

#[cfg(test)]
mod testing;

pub use api::SupersetClient;
pub use config::{FeatureFlag, FeatureFlags, Settings};
pub use error::{ApiResult, AppError};
