//! Database-related models and DTOs

use serde::{Deserialize, Serialize};

use super::query::FilterExpr;

/// A database registered on the server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Database {
    pub id: i64,
    pub database_name: String,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub allow_csv_upload: bool,
    #[serde(default)]
    pub allow_multi_schema_metadata_fetch: bool,
    #[serde(default)]
    pub expose_in_sqllab: bool,
    #[serde(default)]
    pub changed_on_delta_humanized: Option<String>,
}

impl Database {
    /// Label used by selectors, e.g. `examples (postgresql)`
    pub fn label(&self) -> String {
        match &self.backend {
            Some(backend) => format!("{} ({})", self.database_name, backend),
            None => self.database_name.clone(),
        }
    }
}

/// The slim database reference embedded in datasets
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseRef {
    pub id: i64,
    pub database_name: String,
}

/// Query sent to the database collection endpoint.
///
/// Note the plural `order_columns`: the database endpoint differs from the
/// resource endpoints here.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseQuery {
    pub order_columns: String,
    pub order_direction: String,
    pub page: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterExpr>,
}

impl DatabaseQuery {
    /// All databases ordered by name, optionally narrowed by a name search
    pub fn all(search: Option<&str>) -> Self {
        let filters = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                vec![FilterExpr {
                    col: "database_name".to_string(),
                    opr: "ct".to_string(),
                    value: serde_json::Value::String(s.to_string()),
                }]
            })
            .unwrap_or_default();

        Self {
            order_columns: "database_name".to_string(),
            order_direction: "asc".to_string(),
            page: 0,
            page_size: -1,
            filters,
        }
    }

    /// Restrict to databases exposed in SQL Lab
    pub fn exposed_in_sqllab(mut self) -> Self {
        self.filters.push(FilterExpr {
            col: "expose_in_sqllab".to_string(),
            opr: "eq".to_string(),
            value: serde_json::Value::Bool(true),
        });
        self
    }
}

/// Query for a database's schema list
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchemaQuery {
    pub force: bool,
}

/// Query for the tables in one schema
#[derive(Debug, Clone, Serialize)]
pub struct TableQuery {
    pub force: bool,
    pub schema_name: String,
}
