//! Strongly-typed identifiers used across the client.
//!
//! The back office hands out both numeric and string ids, so every id is an
//! opaque string on the client side. A blank id is never valid in a call.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Identifier of a backend entity (member, account, loan scheme, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

/// Identifier of a branch (realtime and request scope).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

/// Identifier of an organization (cooperative).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(String);

/// Identifier of an authenticated back-office user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

macro_rules! impl_string_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build an identifier, rejecting blank input.
            pub fn new(value: impl Into<String>) -> Result<Self, ApiError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(ApiError::precondition(format!("{} is required", $name)));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }

            /// True when the id was deserialized blank (server payloads are not validated).
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = ApiError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl From<u64> for $t {
            fn from(value: u64) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_id!(EntityId, "EntityId");
impl_string_id!(BranchId, "BranchId");
impl_string_id!(OrganizationId, "OrganizationId");
impl_string_id!(UserId, "UserId");

impl EntityId {
    /// Ensure an id deserialized from elsewhere is usable in a request path.
    pub fn require(&self) -> Result<&str, ApiError> {
        if self.is_blank() {
            return Err(ApiError::precondition("EntityId is required"));
        }
        Ok(&self.0)
    }
}
