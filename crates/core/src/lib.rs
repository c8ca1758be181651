//! `coopdesk-core`: shared building blocks of the resource data layer.
//!
//! This crate holds the **transport-free** vocabulary the client speaks:
//! identifiers, the normalized error, query shapes, the paginated envelope,
//! cache keys and resource descriptors. No IO happens here.

pub mod descriptor;
pub mod error;
pub mod id;
pub mod key;
pub mod page;
pub mod query;

pub use descriptor::ResourceDescriptor;
pub use error::{ApiError, ApiResult, ErrorKind};
pub use id::{BranchId, EntityId, OrganizationId, UserId};
pub use key::{OperationKind, QueryKey};
pub use page::{Page, PaginatedResult};
pub use query::{FilterPayload, PaginatedQuery, Pagination, SortDirection, SortField, SortSpec};
