//! Dashboards, charts and datasets as the list views see them

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::database::DatabaseRef;

/// Which collection endpoint a resource lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Dashboard,
    Chart,
    Dataset,
}

impl ResourceKind {
    /// Path segment under `/api/v1/`
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Dashboard => "dashboard",
            ResourceKind::Chart => "chart",
            ResourceKind::Dataset => "dataset",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ResourceKind::Dashboard => "Dashboard",
            ResourceKind::Chart => "Chart",
            ResourceKind::Dataset => "Dataset",
        }
    }

    /// Datasets cannot be favorited
    pub fn has_favorites(&self) -> bool {
        matches!(self, ResourceKind::Dashboard | ResourceKind::Chart)
    }

    /// Only dashboards and datasets have an import endpoint
    pub fn is_importable(&self) -> bool {
        matches!(self, ResourceKind::Dashboard | ResourceKind::Dataset)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().trim_end_matches('s') {
            "dashboard" => Some(ResourceKind::Dashboard),
            "chart" => Some(ResourceKind::Chart),
            "dataset" => Some(ResourceKind::Dataset),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every record a list view can show
pub trait Resource: DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn id(&self) -> i64;

    fn name(&self) -> &str;

    /// Card image, for kinds the server renders thumbnails of
    fn thumbnail_url(&self) -> Option<&str> {
        None
    }
}

/// An owner as embedded in list results
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Owner {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl Owner {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dashboard {
    pub id: i64,
    #[serde(default)]
    pub dashboard_title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default, deserialize_with = "server_datetime::deserialize")]
    pub changed_on_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub changed_on_delta_humanized: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl Dashboard {
    /// Where the dashboard opens, keyed by slug when it has one
    pub fn link(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match self.slug.as_deref().filter(|s| !s.is_empty()) {
            Some(slug) => format!("/superset/dashboard/{}/", slug),
            None => format!("/superset/dashboard/{}/", self.id),
        }
    }
}

impl Resource for Dashboard {
    const KIND: ResourceKind = ResourceKind::Dashboard;

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.dashboard_title
    }

    fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Chart {
    pub id: i64,
    #[serde(default)]
    pub slice_name: String,
    #[serde(default)]
    pub viz_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub datasource_name_text: Option<String>,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default, deserialize_with = "server_datetime::deserialize")]
    pub changed_on_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub changed_on_delta_humanized: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl Chart {
    /// Explore link for the chart
    pub fn link(&self) -> String {
        self.url.clone().unwrap_or_else(|| {
            format!(
                "/superset/explore/?form_data=%7B%22slice_id%22%3A%20{}%7D",
                self.id
            )
        })
    }
}

impl Resource for Chart {
    const KIND: ResourceKind = ResourceKind::Chart;

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.slice_name
    }

    fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dataset {
    pub id: i64,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// `physical` or `virtual`
    #[serde(default)]
    pub kind: Option<String>,
    pub database: DatabaseRef,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default, deserialize_with = "server_datetime::deserialize")]
    pub changed_on_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub changed_on_delta_humanized: Option<String>,
    #[serde(default)]
    pub explore_url: Option<String>,
}

impl Dataset {
    pub fn is_virtual(&self) -> bool {
        self.kind.as_deref() == Some("virtual")
    }
}

impl Resource for Dataset {
    const KIND: ResourceKind = ResourceKind::Dataset;

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.table_name
    }
}

/// Timestamps come back as `2020-06-01T10:00:00.000000+0000`, which is not
/// quite RFC 3339, so both forms are accepted.
mod server_datetime {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        DateTime::parse_from_rfc3339(&raw)
            .or_else(|_| DateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}
