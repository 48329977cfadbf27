//! Allocation model
//!
//! The binding of one credential to one owner for the duration of use.
//! Allocations are marked Released rather than deleted so the audit trail
//! stays complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Active,
    Released,
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Released => write!(f, "released"),
        }
    }
}

/// One credential bound to one owner.
///
/// Invariant: at most one Active allocation exists per owner key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    /// Unique allocation identifier
    pub id: String,

    /// The credential this allocation holds
    pub credential_id: String,

    /// Unique workload identity of the holder
    pub owner_key: String,

    pub status: AllocationStatus,

    pub allocated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

impl Allocation {
    /// Create a new Active allocation with a fresh id
    pub fn new(credential_id: impl Into<String>, owner_key: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            credential_id: credential_id.into(),
            owner_key: owner_key.into(),
            status: AllocationStatus::Active,
            allocated_at: Utc::now(),
            released_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Active
    }
}
