//! Table-related models

use serde::{Deserialize, Serialize};

/// One entry of a schema's table list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableOption {
    pub value: String,
    #[serde(rename = "type", default = "default_table_type")]
    pub table_type: String,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_table_type() -> String {
    "table".to_string()
}

impl TableOption {
    pub fn is_view(&self) -> bool {
        self.table_type == "view"
    }
}
