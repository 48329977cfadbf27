//! Credential model and related enums
//!
//! A credential is one external-service access grant with a concurrency cap.
//! The allocator mutates `current_count`, the failover monitor mutates the
//! health counters and status; nothing else writes to this record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Credential Status
// ============================================================================

/// Lifecycle status of a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Eligible for allocation (default)
    #[default]
    Available,
    /// At its concurrency cap; becomes Available again on release
    Full,
    /// Turned off by an operator; only an operator turns it back on
    Disabled,
    /// Demoted by the failover monitor; recovers after consecutive successes
    Banned,
}

impl CredentialStatus {
    /// Banned and Disabled override the capacity-driven states.
    pub fn is_overridden(&self) -> bool {
        matches!(self, Self::Banned | Self::Disabled)
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Full => write!(f, "full"),
            Self::Disabled => write!(f, "disabled"),
            Self::Banned => write!(f, "banned"),
        }
    }
}

// ============================================================================
// Tier
// ============================================================================

/// Ordered access tier gating which credentials an owner may receive.
///
/// A higher requested tier unlocks all credentials requiring that tier or
/// lower; the derived `Ord` follows declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Bronze,
    Silver,
    Gold,
    Diamond,
    Star,
    King,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Bronze => write!(f, "bronze"),
            Self::Silver => write!(f, "silver"),
            Self::Gold => write!(f, "gold"),
            Self::Diamond => write!(f, "diamond"),
            Self::Star => write!(f, "star"),
            Self::King => write!(f, "king"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "diamond" => Ok(Self::Diamond),
            "star" => Ok(Self::Star),
            "king" => Ok(Self::King),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

// ============================================================================
// Credential
// ============================================================================

/// One external-service access grant with a concurrency cap.
///
/// Invariants: `0 <= current_count <= max_concurrent`, and
/// `status == Full` exactly when `current_count >= max_concurrent`
/// (unless Banned/Disabled, which override the capacity states).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Internal identifier
    pub id: String,

    /// Identifier at the external service
    pub external_id: String,

    /// The secret handed to the worker on allocation
    pub secret: String,

    /// Current lifecycle status
    pub status: CredentialStatus,

    /// Concurrency cap
    pub max_concurrent: u32,

    /// Number of Active allocations referencing this credential
    pub current_count: u32,

    /// Total successful results reported
    pub success_count: u64,

    /// Total failed results reported
    pub fail_count: u64,

    /// Failures since the last success
    pub consecutive_failures: u32,

    /// Successes since the last failure (tracked while Banned, for recovery)
    pub consecutive_successes: u32,

    /// Minimum tier an owner must hold to receive this credential
    pub min_tier: Tier,

    /// Selection priority; higher sorts earlier
    pub priority: i32,

    /// Premium credentials sort before non-premium for every strategy
    pub is_premium: bool,

    /// Owning group, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    /// Owning tenant, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Last time a reservation succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    /// Most recent reported error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a new Available credential with zeroed counters
    pub fn new(
        id: impl Into<String>,
        external_id: impl Into<String>,
        secret: impl Into<String>,
        max_concurrent: u32,
    ) -> Self {
        Self {
            id: id.into(),
            external_id: external_id.into(),
            secret: secret.into(),
            status: CredentialStatus::Available,
            max_concurrent,
            current_count: 0,
            success_count: 0,
            fail_count: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            min_tier: Tier::Free,
            priority: 0,
            is_premium: false,
            group_id: None,
            tenant_id: None,
            last_used_at: None,
            last_error: None,
            last_error_at: None,
            last_success_at: None,
        }
    }

    /// Set the minimum tier
    pub fn with_min_tier(mut self, tier: Tier) -> Self {
        self.min_tier = tier;
        self
    }

    /// Set the selection priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark as premium
    pub fn with_premium(mut self, premium: bool) -> Self {
        self.is_premium = premium;
        self
    }

    /// Set the owning group
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the owning tenant
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Whether the credential has room for another allocation
    pub fn has_capacity(&self) -> bool {
        self.current_count < self.max_concurrent
    }

    /// Spare capacity on this credential
    pub fn remaining(&self) -> u32 {
        self.max_concurrent.saturating_sub(self.current_count)
    }

    /// Whether the credential can be handed out right now
    pub fn is_allocatable(&self) -> bool {
        self.status == CredentialStatus::Available && self.has_capacity()
    }

    /// Success ratio over all reported results.
    ///
    /// A credential with no reported results counts as 1.0 so fresh
    /// credentials are not starved under the success_rate strategy.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.fail_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    /// Recompute the capacity-driven status. Banned/Disabled are sticky and
    /// only the failover monitor or an operator changes them.
    pub fn recompute_capacity_status(&mut self) {
        if self.status.is_overridden() {
            return;
        }
        self.status = if self.current_count >= self.max_concurrent {
            CredentialStatus::Full
        } else {
            CredentialStatus::Available
        };
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Free < Tier::Bronze);
        assert!(Tier::Gold < Tier::Diamond);
        assert!(Tier::Star < Tier::King);
        assert_eq!("gold".parse::<Tier>().unwrap(), Tier::Gold);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_new_credential_defaults() {
        let cred = Credential::new("c1", "ext-1", "sk-test", 3);
        assert_eq!(cred.status, CredentialStatus::Available);
        assert_eq!(cred.current_count, 0);
        assert_eq!(cred.min_tier, Tier::Free);
        assert!(cred.is_allocatable());
        assert_eq!(cred.remaining(), 3);
    }

    #[test]
    fn test_success_rate_no_samples_is_optimistic() {
        let cred = Credential::new("c1", "ext-1", "sk-test", 1);
        assert_eq!(cred.success_rate(), 1.0);
    }

    #[test]
    fn test_success_rate() {
        let mut cred = Credential::new("c1", "ext-1", "sk-test", 1);
        cred.success_count = 3;
        cred.fail_count = 1;
        assert_eq!(cred.success_rate(), 0.75);
    }

    #[test]
    fn test_recompute_capacity_status() {
        let mut cred = Credential::new("c1", "ext-1", "sk-test", 2);
        cred.current_count = 2;
        cred.recompute_capacity_status();
        assert_eq!(cred.status, CredentialStatus::Full);

        cred.current_count = 1;
        cred.recompute_capacity_status();
        assert_eq!(cred.status, CredentialStatus::Available);

        // Banned is sticky under capacity recomputation
        cred.status = CredentialStatus::Banned;
        cred.current_count = 0;
        cred.recompute_capacity_status();
        assert_eq!(cred.status, CredentialStatus::Banned);
    }
}
