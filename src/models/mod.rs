//! Entity models
//!
//! Typed records for everything the allocator persists: credentials,
//! allocations, groups, allocation rules, tenants, and audit entries.

pub mod allocation;
pub mod audit;
pub mod credential;
pub mod rule;

pub use allocation::{Allocation, AllocationStatus};
pub use audit::{AuditAction, AuditRecord};
pub use credential::{Credential, CredentialStatus, Tier};
pub use rule::{AllocationRule, Group, RuleAction, RuleTargetType, RuleType, Tenant};
