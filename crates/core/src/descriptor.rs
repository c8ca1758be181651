//! Resource descriptors: one per backend collection.

use crate::error::ApiError;

/// Identifies one backend resource collection.
///
/// `base_url` is relative to the API root (`member-profile`,
/// `loan-scheme`, ...). `cache_key_prefix` is the first element of every
/// cache key produced for the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    base_url: String,
    cache_key_prefix: String,
}

impl ResourceDescriptor {
    pub fn new(base_url: impl Into<String>, cache_key_prefix: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_matches('/').to_string();
        let cache_key_prefix = cache_key_prefix.into();

        if base_url.is_empty() {
            return Err(ApiError::precondition("resource base URL must not be empty"));
        }
        if cache_key_prefix.trim().is_empty() {
            return Err(ApiError::precondition("resource cache key prefix must not be empty"));
        }

        Ok(Self {
            base_url,
            cache_key_prefix,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cache_key_prefix(&self) -> &str {
        &self.cache_key_prefix
    }

    /// Path of a sub-route, e.g. `path(&["search"])` → `holiday/search`.
    pub fn path(&self, segments: &[&str]) -> String {
        let mut out = self.base_url.clone();
        for seg in segments {
            out.push('/');
            out.push_str(seg.trim_matches('/'));
        }
        out
    }
}
