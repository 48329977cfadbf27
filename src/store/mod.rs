//! Credential store
//!
//! Durable entity storage behind an async trait, plus the in-memory
//! implementation used for tests and single-process deployments. The
//! correctness-critical primitive is `try_reserve`: a per-row conditional
//! increment with compare-and-swap semantics on the previously observed
//! `current_count`. No store-wide transaction is required anywhere else.

pub mod memory;

use crate::models::{Allocation, AllocationRule, Credential, Group, Tenant, Tier};
use anyhow::Result;
use async_trait::async_trait;

/// Filter for eligible-candidate reads
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    /// Requested tier; unlocks credentials whose `min_tier` ranks at or below
    pub tier: Tier,
    /// When set, restricts candidates to this group or ungrouped credentials
    pub group_id: Option<String>,
}

/// Before/after snapshot of a single-row credential mutation
#[derive(Debug, Clone)]
pub struct CredentialUpdate {
    pub before: Credential,
    pub after: Credential,
}

/// Durable storage for credentials, allocations, groups, rules, and tenants.
///
/// All mutations are single-row and atomic; implementations must be safe for
/// many concurrent callers without a store-wide lock.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    // ---- credential reads ----

    /// Available credentials with spare capacity matching the filter.
    async fn find_eligible(&self, filter: &EligibilityFilter) -> Result<Vec<Credential>>;

    async fn get_credential(&self, id: &str) -> Result<Option<Credential>>;

    async fn list_credentials(&self) -> Result<Vec<Credential>>;

    // ---- credential writes ----

    /// Create or replace a credential (admin surface).
    async fn put_credential(&self, credential: Credential) -> Result<()>;

    /// Delete a credential. Refused while `current_count > 0` unless forced.
    /// Returns false when the credential does not exist.
    async fn delete_credential(&self, id: &str, force: bool) -> Result<bool>;

    /// Atomic conditional increment of `current_count`.
    ///
    /// Succeeds only when the row still holds `expected_current_count` and
    /// has spare capacity; sets status to Full when the new count reaches
    /// the cap and stamps `last_used_at`. Fails without side effects
    /// otherwise. A false return means a lost race or a full credential,
    /// never an error.
    async fn try_reserve(&self, id: &str, expected_current_count: u32) -> Result<bool>;

    /// Atomic decrement of `current_count` (floor 0) with capacity-status
    /// recomputation. Banned/Disabled stay as they are.
    async fn release_credential(&self, id: &str) -> Result<()>;

    /// Atomically mutate one credential row, returning before/after copies.
    /// Used by the failover monitor to apply health transitions.
    async fn update_credential(
        &self,
        id: &str,
        mutate: Box<dyn for<'a> FnOnce(&'a mut Credential) + Send>,
    ) -> Result<Option<CredentialUpdate>>;

    // ---- allocations ----

    /// Insert an Active allocation. Fails when the owner already holds an
    /// Active allocation (storage-level backstop for the at-most-one
    /// invariant).
    async fn insert_allocation(&self, allocation: Allocation) -> Result<()>;

    /// The Active allocation for an owner, if any.
    async fn active_allocation(&self, owner_key: &str) -> Result<Option<Allocation>>;

    /// Mark an allocation Released. Returns the updated record, or None when
    /// the id is unknown.
    async fn mark_released(&self, allocation_id: &str) -> Result<Option<Allocation>>;

    /// Active allocation count per credential (invariant checks, tooling).
    async fn count_active_for_credential(&self, credential_id: &str) -> Result<usize>;

    // ---- groups ----

    async fn put_group(&self, group: Group) -> Result<()>;
    async fn get_group(&self, id: &str) -> Result<Option<Group>>;
    async fn delete_group(&self, id: &str) -> Result<bool>;
    async fn list_groups(&self) -> Result<Vec<Group>>;

    // ---- rules ----

    /// Create or replace a rule. Malformed rules are rejected here, at write
    /// time, rather than at allocation time.
    async fn put_rule(&self, rule: AllocationRule) -> Result<()>;
    async fn get_rule(&self, id: &str) -> Result<Option<AllocationRule>>;
    async fn delete_rule(&self, id: &str) -> Result<bool>;
    async fn list_rules(&self) -> Result<Vec<AllocationRule>>;

    // ---- tenants ----

    async fn put_tenant(&self, tenant: Tenant) -> Result<()>;
    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>>;
    async fn delete_tenant(&self, id: &str) -> Result<bool>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;
}

pub use memory::MemoryStore;
