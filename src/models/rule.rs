//! Allocation rules, groups, and tenants
//!
//! Rules are targeted overrides (deny/bind/prefer/allow) evaluated before
//! strategy selection. Groups carry an optional per-group strategy override.
//! Tenants are read-only here; quota enforcement lives with the external
//! quota service.

use crate::services::strategy::AllocationStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Rule Enums
// ============================================================================

/// Category of an allocation rule (admin-facing classification)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Whitelist,
    Blacklist,
    Binding,
    Restriction,
}

/// Which request attribute a rule matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTargetType {
    OwnerKey,
    UserId,
    Ip,
    Tier,
}

/// Effect of a matched rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Informational; never relaxes a deny
    Allow,
    Deny,
    /// Collapse the candidate set to the rule's credential
    Bind,
    /// Move the rule's credential to the front of the ordering
    Prefer,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
            Self::Bind => write!(f, "bind"),
            Self::Prefer => write!(f, "prefer"),
        }
    }
}

// ============================================================================
// Allocation Rule
// ============================================================================

/// A targeted allocation override.
///
/// Evaluated in `(priority desc, created_at asc)` order; expired or disabled
/// rules are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRule {
    pub id: String,
    pub rule_type: RuleType,
    pub target_type: RuleTargetType,
    pub target_value: String,

    /// Required for bind/prefer actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,

    pub action: RuleAction,

    /// Higher evaluates first
    pub priority: i32,

    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl AllocationRule {
    pub fn new(
        id: impl Into<String>,
        rule_type: RuleType,
        target_type: RuleTargetType,
        target_value: impl Into<String>,
        action: RuleAction,
    ) -> Self {
        Self {
            id: id.into(),
            rule_type,
            target_type,
            target_value: target_value.into(),
            credential_id: None,
            action,
            priority: 0,
            enabled: true,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_credential(mut self, credential_id: impl Into<String>) -> Self {
        self.credential_id = Some(credential_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Reject malformed rules at write time rather than at allocation time.
    pub fn validate(&self) -> Result<(), String> {
        if self.target_value.trim().is_empty() {
            return Err("rule target_value must not be empty".to_string());
        }
        if matches!(self.action, RuleAction::Bind | RuleAction::Prefer)
            && self.credential_id.is_none()
        {
            return Err(format!(
                "rule {} with action {} requires a credential_id",
                self.id, self.action
            ));
        }
        Ok(())
    }

    /// Enabled and not expired at `now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.expires_at.map_or(true, |exp| exp > now)
    }
}

// ============================================================================
// Group
// ============================================================================

/// A named set of credentials. A group may override the caller-supplied
/// selection strategy for allocations that request it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_strategy: Option<AllocationStrategy>,

    /// Added to member credential priority when ranking (admin surface)
    #[serde(default)]
    pub priority_boost: i32,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            allocation_strategy: None,
            priority_boost: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.allocation_strategy = Some(strategy);
        self
    }

    pub fn with_priority_boost(mut self, boost: i32) -> Self {
        self.priority_boost = boost;
        self
    }
}

// ============================================================================
// Tenant
// ============================================================================

/// Tenant record, consulted by the external quota collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub quota: i64,
    pub enabled: bool,
}

// ============================================================================
// Tests
// ============================================================================
