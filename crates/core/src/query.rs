//! Server-side paging, sorting and filtering shapes.
//!
//! `sort` and `filter` travel as base64-encoded JSON so that filter values
//! containing `&`, `=`, `#` and friends never collide with query-string syntax.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_PAGE_INDEX: u32 = 1;

/// Page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_index: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page_index: u32, page_size: u32) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    /// Reject a zero page size before it reaches the server.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.page_size == 0 {
            return Err(ApiError::precondition("pageSize must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_index: DEFAULT_PAGE_INDEX,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub order: SortDirection,
}

/// Ordered list of sort fields; earlier fields take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(pub Vec<SortField>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.0.push(SortField {
            field: field.into(),
            order: SortDirection::Asc,
        });
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.0.push(SortField {
            field: field.into(),
            order: SortDirection::Desc,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Opaque structured filter tree, forwarded to the server as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterPayload(pub Value);

impl FilterPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// Everything a table view sends to a `/search` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginatedQuery {
    pub pagination: Pagination,
    pub sort: SortSpec,
    pub filter: FilterPayload,
}

impl PaginatedQuery {
    pub fn new(pagination: Pagination) -> Self {
        Self {
            pagination,
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_filter(mut self, filter: FilterPayload) -> Self {
        self.filter = filter;
        self
    }

    /// Query-string pairs in wire order: `pageIndex`, `pageSize`, then
    /// `sort` and `filter` when present.
    pub fn to_query_pairs(&self) -> Result<Vec<(String, String)>, ApiError> {
        self.pagination.validate()?;

        let mut pairs = vec![
            ("pageIndex".to_string(), self.pagination.page_index.to_string()),
            ("pageSize".to_string(), self.pagination.page_size.to_string()),
        ];
        if !self.sort.is_empty() {
            pairs.push(("sort".to_string(), encode_param(&self.sort)?));
        }
        if !self.filter.is_empty() {
            pairs.push(("filter".to_string(), encode_param(&self.filter)?));
        }
        Ok(pairs)
    }
}

/// JSON-then-base64 encoding used for structured query parameters.
pub fn encode_param<T: Serialize>(value: &T) -> Result<String, ApiError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| ApiError::precondition(format!("failed to encode query parameter: {e}")))?;
    Ok(STANDARD.encode(json))
}

/// Inverse of [`encode_param`]; used by servers and tests.
pub fn decode_param<T: serde::de::DeserializeOwned>(encoded: &str) -> Result<T, ApiError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::decode(format!("invalid base64 query parameter: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::decode(format!("invalid JSON query parameter: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_pagination_is_first_page_of_ten() {
        let p = Pagination::default();
        assert_eq!(p.page_index, 1);
        assert_eq!(p.page_size, 10);
    }

    #[test]
    fn empty_sort_and_filter_are_omitted() {
        let pairs = PaginatedQuery::default().to_query_pairs().unwrap();
        assert_eq!(
            pairs,
            vec![
                ("pageIndex".to_string(), "1".to_string()),
                ("pageSize".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn sort_and_filter_are_base64_json() {
        let query = PaginatedQuery::new(Pagination::new(2, 25))
            .with_sort(SortSpec::new().desc("createdAt").asc("name"))
            .with_filter(FilterPayload::new(json!({"name": "a&b=c#d"})));

        let pairs = query.to_query_pairs().unwrap();
        let sort = &pairs.iter().find(|(k, _)| k == "sort").unwrap().1;
        let filter = &pairs.iter().find(|(k, _)| k == "filter").unwrap().1;

        assert!(!filter.contains('&'));
        let sort_back: SortSpec = decode_param(sort).unwrap();
        assert_eq!(sort_back, query.sort);
        let filter_back: Value = decode_param(filter).unwrap();
        assert_eq!(filter_back, json!({"name": "a&b=c#d"}));
    }

    #[test]
    fn sort_wire_shape() {
        let sort = SortSpec::new().desc("amount");
        assert_eq!(
            serde_json::to_value(&sort).unwrap(),
            json!([{"field": "amount", "order": "desc"}])
        );
    }

    #[test]
    fn zero_page_size_is_a_precondition_failure() {
        let err = PaginatedQuery::new(Pagination::new(1, 0))
            .to_query_pairs()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Precondition);
    }

    #[test]
    fn garbage_param_fails_to_decode() {
        assert!(decode_param::<Value>("%%%").is_err());
    }
}
