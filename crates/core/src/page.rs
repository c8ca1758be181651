//! Paginated result envelope returned by `/search` endpoints.

use serde::{Deserialize, Serialize};

use crate::query::Pagination;

/// One entry of the page selector the server sends alongside the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: String,
    pub page_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pages: Vec<Page>,
    pub total_size: u64,
    pub total_page: u64,
    pub page_index: u32,
    pub page_size: u32,
}

/// `ceil(total_size / page_size)`.
pub fn expected_total_page(total_size: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_size.div_ceil(u64::from(page_size))
}

impl<T> PaginatedResult<T> {
    /// Zero value shown while a query is loading or disabled.
    pub fn placeholder(pagination: Pagination) -> Self {
        Self {
            data: Vec::new(),
            pages: Vec::new(),
            total_size: 0,
            total_page: 1,
            page_index: pagination.page_index,
            page_size: pagination.page_size,
        }
    }

    /// Checks the envelope invariants. The server is authoritative, so callers
    /// only log when this fails.
    pub fn is_well_formed(&self) -> bool {
        // An empty collection is reported as either zero or one page.
        let pages_ok = self.total_page == expected_total_page(self.total_size, self.page_size)
            || (self.total_size == 0 && self.total_page == 1);
        self.page_size > 0 && self.data.len() <= self.page_size as usize && pages_ok
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            data: self.data.into_iter().map(f).collect(),
            pages: self.pages,
            total_size: self.total_size,
            total_page: self.total_page,
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}
