//! Structured cache keys.
//!
//! A key is the ordered tuple `[prefix, operation, ...discriminators]`.
//! Discriminators are stored as canonical JSON so that keys built from equal
//! query shapes compare and hash equal.

use serde::Serialize;

use crate::id::EntityId;
use crate::query::PaginatedQuery;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    All,
    ById,
    Paginated,
    ByParent,
    Custom(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::All => "all",
            OperationKind::ById => "by-id",
            OperationKind::Paginated => "paginated",
            OperationKind::ByParent => "by-parent",
            OperationKind::Custom(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    prefix: String,
    operation: OperationKind,
    discriminators: Vec<String>,
}

impl QueryKey {
    pub fn new(prefix: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            prefix: prefix.into(),
            operation,
            discriminators: Vec::new(),
        }
    }

    /// Append a discriminator. Values that fail to serialize are keyed by
    /// their debug form instead of being dropped.
    pub fn with<T: Serialize + core::fmt::Debug>(mut self, discriminator: &T) -> Self {
        let part = serde_json::to_string(discriminator).unwrap_or_else(|_| format!("{discriminator:?}"));
        self.discriminators.push(part);
        self
    }

    pub fn all(prefix: &str) -> Self {
        Self::new(prefix, OperationKind::All)
    }

    pub fn by_id(prefix: &str, id: &EntityId) -> Self {
        Self::new(prefix, OperationKind::ById).with(id)
    }

    pub fn paginated(prefix: &str, query: &PaginatedQuery) -> Self {
        Self::new(prefix, OperationKind::Paginated)
            .with(&query.pagination)
            .with(&query.sort)
            .with(&query.filter)
    }

    pub fn by_parent(prefix: &str, parent_kind: &str, parent_id: &EntityId) -> Self {
        Self::new(prefix, OperationKind::ByParent)
            .with(&parent_kind)
            .with(parent_id)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn operation(&self) -> &OperationKind {
        &self.operation
    }

    pub fn discriminators(&self) -> &[String] {
        &self.discriminators
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefix == prefix
    }
}

impl core::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}", self.prefix, self.operation.as_str())?;
        for d in &self.discriminators {
            write!(f, ", {d}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterPayload, Pagination, SortSpec};
    use serde_json::json;
    use std::collections::HashSet;

    fn query(filter: serde_json::Value) -> PaginatedQuery {
        PaginatedQuery::new(Pagination::default())
            .with_sort(SortSpec::new().asc("name"))
            .with_filter(FilterPayload::new(filter))
    }

    #[test]
    fn structurally_equal_queries_share_a_key() {
        let a = QueryKey::paginated("holiday", &query(json!({"year": 2024})));
        let b = QueryKey::paginated("holiday", &query(json!({"year": 2024})));
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn filter_sort_and_page_all_discriminate() {
        let base = QueryKey::paginated("holiday", &query(json!({"year": 2024})));
        assert_ne!(base, QueryKey::paginated("holiday", &query(json!({"year": 2025}))));

        let mut paged = query(json!({"year": 2024}));
        paged.pagination.page_index = 2;
        assert_ne!(base, QueryKey::paginated("holiday", &paged));

        let mut sorted = query(json!({"year": 2024}));
        sorted.sort = SortSpec::new().desc("name");
        assert_ne!(base, QueryKey::paginated("holiday", &sorted));
    }

    #[test]
    fn prefix_matching_is_exact() {
        let key = QueryKey::all("branch");
        assert!(key.has_prefix("branch"));
        assert!(!key.has_prefix("bran"));
        assert!(!key.has_prefix("branch-setting"));
    }

    #[test]
    fn display_lists_every_part() {
        let key = QueryKey::by_id("organization", &EntityId::from(7));
        assert_eq!(key.to_string(), "[organization, by-id, \"7\"]");
    }
}
