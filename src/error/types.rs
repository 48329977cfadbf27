//! Allocator error types

use thiserror::Error;

/// Errors returned across the engine boundary.
///
/// Every variant is recoverable and carries a stable machine-readable kind.
/// Transient reserve races are retried internally and never surface; retry
/// exhaustion is reported as `PoolExhausted`. Storage faults are the only
/// infrastructure errors and are propagated for the caller to retry or
/// alert on.
#[derive(Error, Debug)]
pub enum AllocError {
    #[error("allocation denied by rule {rule_id}")]
    RuleDenied { rule_id: String },

    #[error("bound credential {credential_id} is not eligible")]
    RuleBindingUnavailable { credential_id: String },

    #[error("preferred credential {credential_id} is not eligible")]
    PreferredUnavailable { credential_id: String },

    #[error("no eligible credential available")]
    PoolExhausted,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AllocError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RuleDenied { .. } => "rule_denied",
            Self::RuleBindingUnavailable { .. } => "rule_binding_unavailable",
            Self::PreferredUnavailable { .. } => "preferred_unavailable",
            Self::PoolExhausted => "pool_exhausted",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Storage faults are infrastructure; everything else is a pool-level
    /// outcome the caller can act on directly.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(
            AllocError::RuleDenied {
                rule_id: "r1".into()
            }
            .kind(),
            "rule_denied"
        );
        assert_eq!(AllocError::PoolExhausted.kind(), "pool_exhausted");
        assert_eq!(AllocError::NotFound("x".into()).kind(), "not_found");
        assert!(AllocError::Storage(anyhow::anyhow!("io")).is_infrastructure());
        assert!(!AllocError::PoolExhausted.is_infrastructure());
    }

    #[test]
    fn test_display_messages() {
        let err = AllocError::PreferredUnavailable {
            credential_id: "cred-9".into(),
        };
        assert_eq!(
            err.to_string(),
            "preferred credential cred-9 is not eligible"
        );
    }
}
