//! Export downloads.
//!
//! The file name is always chosen by the client; whatever the server puts in
//! `Content-Disposition` is ignored.

use std::path::{Path, PathBuf};

use coopdesk_core::{ApiError, ApiResult, EntityId, PaginatedQuery};
use coopdesk_core::query::encode_param;

/// Which rows an export covers.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportScope {
    /// `GET /{resource}/export`
    All,
    /// `GET /{resource}/export-search?filter&sort` (pagination is ignored).
    Search(PaginatedQuery),
    /// `GET /{resource}/export-selected?ids=a,b`
    Selected(Vec<EntityId>),
}

impl ExportScope {
    /// Path segment and query pairs of the export request.
    pub fn request(&self) -> ApiResult<(&'static str, Vec<(String, String)>)> {
        match self {
            ExportScope::All => Ok(("export", Vec::new())),
            ExportScope::Search(query) => {
                let mut pairs = Vec::new();
                if !query.sort.is_empty() {
                    pairs.push(("sort".to_string(), encode_param(&query.sort)?));
                }
                if !query.filter.is_empty() {
                    pairs.push(("filter".to_string(), encode_param(&query.filter)?));
                }
                Ok(("export-search", pairs))
            }
            ExportScope::Selected(ids) => {
                if ids.is_empty() {
                    return Err(ApiError::precondition("no records selected for export"));
                }
                let joined = ids
                    .iter()
                    .map(|id| id.require())
                    .collect::<Result<Vec<_>, _>>()?
                    .join(",");
                Ok(("export-selected", vec![("ids".to_string(), joined)]))
            }
        }
    }
}

/// Resolve the destination, rejecting names that would escape `dest_dir`.
pub fn target_path(dest_dir: &Path, file_name: &str) -> ApiResult<PathBuf> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(ApiError::precondition("export file name is required"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ApiError::precondition(format!("invalid export file name: {name:?}")));
    }
    Ok(dest_dir.join(name))
}

pub async fn write_file(target: &Path, bytes: &[u8]) -> ApiResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::local(format!("failed to create {}: {e}", parent.display())))?;
    }
    tokio::fs::write(target, bytes)
        .await
        .map_err(|e| ApiError::local(format!("failed to write {}: {e}", target.display())))
}
