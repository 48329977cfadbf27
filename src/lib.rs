//! Credential pool allocation and failover engine
//!
//! Allocates a finite pool of capped external-service credentials to many
//! independent workload owners: eligibility filtering, rule overrides,
//! strategy-based selection, failure-driven health transitions, and
//! capacity forecasting, all on top of a conditional-update store primitive
//! that keeps the pool safe under concurrent callers.

// Public modules
pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use audit::{AuditLog, AuditPage, AuditQuery, MemoryAuditLog};
pub use config::{AlertThresholds, Settings};
pub use error::AllocError;
pub use models::{
    Allocation, AllocationRule, AllocationStatus, AuditAction, AuditRecord, Credential,
    CredentialStatus, Group, RuleAction, RuleTargetType, RuleType, Tenant, Tier,
};
pub use services::{
    AllocateRequest, AllocationEngine, AllocationOutcome, AllocationStrategy, CapacityForecaster,
    FailoverMonitor, FailoverPolicy, LogAlertSink,
};
pub use store::{CredentialStore, EligibilityFilter, MemoryStore};
