//! Audit records
//!
//! Append-only trail of allocate/release/failover actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Allocate,
    Release,
    Failover,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocate => write!(f, "allocate"),
            Self::Release => write!(f, "release"),
            Self::Failover => write!(f, "failover"),
        }
    }
}

/// One append-only audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub action: AuditAction,
    pub credential_id: String,
    pub owner_key: String,

    /// Strategy name for allocate actions (`existing` for idempotent hits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<String>,

    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: AuditAction,
        credential_id: impl Into<String>,
        owner_key: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            credential_id: credential_id.into(),
            owner_key: owner_key.into(),
            strategy_used: None,
            details: details.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy_used = Some(strategy.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_construction() {
        let record = AuditRecord::new(AuditAction::Allocate, "cred-1", "owner-1", "allocated")
            .with_strategy("balanced");
        assert_eq!(record.action, AuditAction::Allocate);
        assert_eq!(record.strategy_used.as_deref(), Some("balanced"));
        assert!(!record.id.is_empty());
    }
}
