//! Back-office entities and their resource descriptors.
//!
//! Each entity is one line of configuration: where its collection lives,
//! which cache prefix it owns, and which realtime subjects announce changes
//! to it. Screens obtain typed handles through [`crate::Client::resource`].

use chrono::{DateTime, NaiveDate, Utc};
use coopdesk_core::{ApiResult, BranchId, EntityId, OrganizationId, Pagination, ResourceDescriptor};
use coopdesk_realtime::Subject;
use serde::{Deserialize, Serialize};

use crate::invalidation::InvalidationRule;

/// Static description of one backend collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub base_url: &'static str,
    pub prefix: &'static str,
    /// Realtime entity token (`branch` in `branch.update.42`).
    pub realtime_entity: &'static str,
    pub default_pagination: Pagination,
}

impl CatalogEntry {
    const fn new(base_url: &'static str, prefix: &'static str, realtime_entity: &'static str) -> Self {
        Self {
            base_url,
            prefix,
            realtime_entity,
            default_pagination: Pagination {
                page_index: coopdesk_core::query::DEFAULT_PAGE_INDEX,
                page_size: coopdesk_core::query::DEFAULT_PAGE_SIZE,
            },
        }
    }

    const fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.default_pagination = pagination;
        self
    }

    pub fn descriptor(&self) -> ApiResult<ResourceDescriptor> {
        ResourceDescriptor::new(self.base_url, self.prefix)
    }

    /// `<entity>.<event>.<scope_id>`, e.g. `branch.update.42`.
    pub fn subject(&self, event: EventKind, scope_id: &str) -> ApiResult<Subject> {
        Subject::new(self.realtime_entity, event.as_str())?.id(scope_id)
    }

    /// `<entity>.<event>.branch.<branch_id>`.
    pub fn branch_subject(&self, event: EventKind, branch: &BranchId) -> ApiResult<Subject> {
        Subject::new(self.realtime_entity, event.as_str())?.scoped("branch", branch)
    }

    /// `<entity>.<event>.organization.<organization_id>`.
    pub fn organization_subject(&self, event: EventKind, organization: &OrganizationId) -> ApiResult<Subject> {
        Subject::new(self.realtime_entity, event.as_str())?.scoped("organization", organization)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Create, EventKind::Update, EventKind::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

pub const ORGANIZATION: CatalogEntry = CatalogEntry::new("organization", "organization", "organization");
pub const BRANCH: CatalogEntry = CatalogEntry::new("branch", "branch", "branch");
pub const HOLIDAY: CatalogEntry = CatalogEntry::new("holiday", "holiday", "holiday");
pub const MEMBER_PROFILE: CatalogEntry = CatalogEntry::new("member-profile", "member-profile", "member");
pub const LOAN_SCHEME: CatalogEntry = CatalogEntry::new("loan-scheme", "loan-scheme", "loan_scheme");
pub const ACCOUNT: CatalogEntry = CatalogEntry::new("account", "account", "account");
pub const TRANSACTION: CatalogEntry = CatalogEntry::new("transaction", "transaction", "transaction");
/// Disbursement transactions default to `pageIndex: 0`, unlike every other
/// collection. Kept as-is until the backend's indexing convention for this
/// endpoint is confirmed.
pub const DISBURSEMENT_TRANSACTION: CatalogEntry =
    CatalogEntry::new("disbursement-transaction", "disbursement-transaction", "disbursement")
        .with_pagination(Pagination {
            page_index: 0,
            page_size: coopdesk_core::query::DEFAULT_PAGE_SIZE,
        });

pub const ALL: [CatalogEntry; 8] = [
    ORGANIZATION,
    BRANCH,
    HOLIDAY,
    MEMBER_PROFILE,
    LOAN_SCHEME,
    ACCOUNT,
    TRANSACTION,
    DISBURSEMENT_TRANSACTION,
];

/// Invalidation rules for everything that changes under one branch.
///
/// Member and account events also invalidate transactions, since the
/// transaction lists embed member and account names.
pub fn branch_invalidation_rules(branch: &BranchId) -> ApiResult<Vec<InvalidationRule>> {
    let mut rules = Vec::new();

    for event in EventKind::ALL {
        rules.push(InvalidationRule::new(BRANCH.subject(event, branch.as_str())?, BRANCH.prefix));
    }

    for entry in [HOLIDAY, LOAN_SCHEME, TRANSACTION, DISBURSEMENT_TRANSACTION] {
        for event in EventKind::ALL {
            rules.push(InvalidationRule::new(entry.branch_subject(event, branch)?, entry.prefix));
        }
    }

    for entry in [MEMBER_PROFILE, ACCOUNT] {
        for event in EventKind::ALL {
            rules.push(
                InvalidationRule::new(entry.branch_subject(event, branch)?, entry.prefix)
                    .and(TRANSACTION.prefix),
            );
        }
    }

    Ok(rules)
}

// ── models ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrganization {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: EntityId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub is_main: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBranch {
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub id: EntityId,
    pub name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHoliday {
    pub name: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub id: EntityId,
    pub branch_id: BranchId,
    pub full_name: String,
    #[serde(default)]
    pub passbook_number: Option<String>,
    pub status: MemberStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMemberProfile {
    pub branch_id: BranchId,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passbook_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanScheme {
    pub id: EntityId,
    pub name: String,
    /// Annual rate in basis points.
    pub interest_rate_bps: u32,
    pub max_term_months: u32,
    /// Smallest currency unit (e.g. centavos).
    pub max_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: EntityId,
    pub member_id: EntityId,
    pub account_number: String,
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Disbursement,
    Payment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: EntityId,
    pub account_id: EntityId,
    pub kind: TransactionKind,
    pub amount: i64,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub batch_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub account_id: EntityId,
    pub kind: TransactionKind,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<EntityId>,
}
