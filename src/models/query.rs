//! Page requests for list views and their wire form

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Largest page the API will hand out
pub const MAX_PAGE_SIZE: u32 = 100;

/// A sort column as the list view tracks it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SortColumn {
    pub id: String,
    #[serde(default)]
    pub desc: bool,
}

impl SortColumn {
    pub fn asc(id: impl Into<String>) -> Self {
        Self { id: id.into(), desc: false }
    }

    pub fn desc(id: impl Into<String>) -> Self {
        Self { id: id.into(), desc: true }
    }
}

/// A filter as the list view tracks it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterValue {
    pub id: String,
    pub operator: String,
    pub value: Value,
}

impl FilterValue {
    pub fn new(id: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Filters with nothing selected are not sent
    fn is_set(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }
}

/// A list view's page request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page_index: u32,

    #[validate(range(min = 1, max = 100, message = "Page size must be between 1 and 100"))]
    pub page_size: u32,

    #[validate(length(min = 1, message = "At least one sort column is required"))]
    pub sort_by: Vec<SortColumn>,

    #[serde(default)]
    pub filters: Vec<FilterValue>,
}

impl PageRequest {
    pub fn new(page_index: u32, page_size: u32, sort_by: SortColumn) -> Self {
        Self {
            page_index,
            page_size,
            sort_by: vec![sort_by],
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: FilterValue) -> Self {
        self.filters.push(filter);
        self
    }

    /// The query object the resource endpoints accept.
    ///
    /// Only the first sort column is used; the server sorts on one column.
    pub fn to_list_query(&self) -> ListQuery {
        let (order_column, order_direction) = match self.sort_by.first() {
            Some(sort) => (sort.id.clone(), OrderDirection::from_desc(sort.desc)),
            None => ("changed_on_delta_humanized".to_string(), OrderDirection::Desc),
        };

        ListQuery {
            order_column,
            order_direction,
            page: self.page_index,
            page_size: self.page_size,
            filters: self
                .filters
                .iter()
                .filter(|f| f.is_set())
                .map(|f| FilterExpr {
                    col: f.id.clone(),
                    opr: f.operator.clone(),
                    value: f.value.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn from_desc(desc: bool) -> Self {
        if desc {
            OrderDirection::Desc
        } else {
            OrderDirection::Asc
        }
    }
}

/// A server-side filter expression
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterExpr {
    pub col: String,
    pub opr: String,
    pub value: Value,
}

/// Wire form of a page request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ListQuery {
    pub order_column: String,
    pub order_direction: OrderDirection,
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterExpr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rison;
    use pretty_assertions::assert_eq;

    fn example_request() -> PageRequest {
        PageRequest::new(0, 3, SortColumn::desc("changed_on_delta_humanized"))
            .with_filter(FilterValue::new("created_by", "rel_o_m", "42"))
    }

    #[test]
    fn test_list_query_encoding() {
        let query = example_request().to_list_query();
        assert_eq!(
            rison::to_string(&query).unwrap(),
            "(filters:!((col:created_by,opr:rel_o_m,value:'42')),order_column:changed_on_delta_humanized,order_direction:desc,page:0,page_size:3)"
        );
    }

    #[test]
    fn test_unset_filters_are_dropped() {
        let request = PageRequest::new(2, 25, SortColumn::asc("dashboard_title"))
            .with_filter(FilterValue::new("dashboard_title", "ct", ""))
            .with_filter(FilterValue::new("owners", "rel_m_m", Value::Array(vec![])))
            .with_filter(FilterValue::new("published", "eq", Value::Null));
        let query = request.to_list_query();
        assert!(query.filters.is_empty());
        assert_eq!(
            rison::to_string(&query).unwrap(),
            "(order_column:dashboard_title,order_direction:asc,page:2,page_size:25)"
        );
    }

    #[test]
    fn test_validation() {
        assert!(example_request().validate().is_ok());

        let mut request = example_request();
        request.page_size = 0;
        assert!(request.validate().is_err());

        request.page_size = MAX_PAGE_SIZE + 1;
        assert!(request.validate().is_err());

        let mut request = example_request();
        request.sort_by.clear();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_page_request_camel_case() {
        let request: PageRequest = serde_json::from_str(
            r#"{"pageIndex": 0, "pageSize": 3,
                "sortBy": [{"id": "changed_on_delta_humanized", "desc": true}],
                "filters": [{"id": "created_by", "operator": "rel_o_m", "value": "42"}]}"#,
        )
        .unwrap();
        assert_eq!(request, example_request());
    }
}
