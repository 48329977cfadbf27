//! Failover monitor
//!
//! Applies worker-reported results to per-credential health counters and
//! drives the Banned/Available transitions. Two independent ban triggers run
//! on every failure: the consecutive-failure threshold and a long-run
//! aggregate heuristic. Banned credentials recover automatically after
//! enough consecutive successes.

use crate::audit::AuditLog;
use crate::error::AllocError;
use crate::models::{AuditAction, AuditRecord, Credential, CredentialStatus};
use crate::store::CredentialStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Aggregate failure heuristic: ban once failures dominate regardless of the
/// consecutive counter.
const LONG_RUN_FAIL_FLOOR: u64 = 10;

/// Thresholds driving the health state machine
#[derive(Debug, Clone, Copy)]
pub struct FailoverPolicy {
    /// Consecutive failures before a ban
    pub ban_threshold: u32,
    /// Consecutive successes before a banned credential recovers
    pub recovery_threshold: u32,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            ban_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

/// Result of applying one reported outcome
#[derive(Debug, Clone, Copy)]
pub struct ResultOutcome {
    /// True when this report transitioned the credential to Banned
    pub failover_triggered: bool,
    pub new_status: CredentialStatus,
}

/// Receives failover signals; advisory only, never blocks the reporting call
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn failover_triggered(&self, credential: &Credential, error: Option<&str>);
}

/// Default sink: structured warning log
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn failover_triggered(&self, credential: &Credential, error: Option<&str>) {
        tracing::warn!(
            credential_id = %credential.id,
            consecutive_failures = credential.consecutive_failures,
            fail_count = credential.fail_count,
            error = ?error,
            "Credential banned after repeated failures"
        );
    }
}

/// Updates per-credential health state from reported results
pub struct FailoverMonitor {
    store: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditLog>,
    sink: Arc<dyn AlertSink>,
    policy: FailoverPolicy,
}

impl FailoverMonitor {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditLog>,
        sink: Arc<dyn AlertSink>,
        policy: FailoverPolicy,
    ) -> Self {
        Self {
            store,
            audit,
            sink,
            policy,
        }
    }

    /// Apply one success/failure report to a credential.
    pub async fn record_result(
        &self,
        credential_id: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<ResultOutcome, AllocError> {
        let policy = self.policy;
        let error_owned = error.map(str::to_string);

        let update = self
            .store
            .update_credential(
                credential_id,
                Box::new(move |cred| apply_result(cred, success, error_owned, &policy)),
            )
            .await?
            .ok_or_else(|| AllocError::NotFound(format!("credential {}", credential_id)))?;

        let newly_banned = update.before.status != CredentialStatus::Banned
            && update.after.status == CredentialStatus::Banned;
        let recovered = update.before.status == CredentialStatus::Banned
            && update.after.status != CredentialStatus::Banned;

        if newly_banned {
            self.sink.failover_triggered(&update.after, error).await;
            self.audit
                .append(
                    AuditRecord::new(
                        AuditAction::Failover,
                        credential_id,
                        "",
                        format!(
                            "banned after {} consecutive failures ({} total)",
                            update.after.consecutive_failures, update.after.fail_count
                        ),
                    ),
                )
                .await?;
        } else if recovered {
            tracing::info!(
                credential_id = %credential_id,
                "Credential recovered from ban"
            );
            self.audit
                .append(AuditRecord::new(
                    AuditAction::Failover,
                    credential_id,
                    "",
                    "recovered after consecutive successes",
                ))
                .await?;
        }

        Ok(ResultOutcome {
            failover_triggered: newly_banned,
            new_status: update.after.status,
        })
    }

    /// Manual override: zero the consecutive-failure state and optionally
    /// force the credential back into rotation.
    pub async fn reset_failures(
        &self,
        credential_id: &str,
        reactivate: bool,
    ) -> Result<Credential, AllocError> {
        let update = self
            .store
            .update_credential(
                credential_id,
                Box::new(move |cred| {
                    cred.consecutive_failures = 0;
                    cred.consecutive_successes = 0;
                    cred.last_error = None;
                    cred.last_error_at = None;
                    if reactivate {
                        cred.status = CredentialStatus::Available;
                        cred.recompute_capacity_status();
                    }
                }),
            )
            .await?
            .ok_or_else(|| AllocError::NotFound(format!("credential {}", credential_id)))?;

        tracing::info!(
            credential_id = %credential_id,
            reactivate,
            "Reset failure counters"
        );

        Ok(update.after)
    }
}

/// Pure state-machine step applied atomically inside the store.
fn apply_result(
    cred: &mut Credential,
    success: bool,
    error: Option<String>,
    policy: &FailoverPolicy,
) {
    if success {
        cred.success_count += 1;
        cred.consecutive_failures = 0;
        cred.last_success_at = Some(Utc::now());

        if cred.status == CredentialStatus::Banned {
            cred.consecutive_successes += 1;
            if cred.consecutive_successes >= policy.recovery_threshold {
                cred.consecutive_successes = 0;
                cred.consecutive_failures = 0;
                cred.status = CredentialStatus::Available;
                cred.recompute_capacity_status();
            }
        } else {
            cred.consecutive_successes = 0;
        }
        return;
    }

    cred.fail_count += 1;
    cred.consecutive_failures += 1;
    cred.consecutive_successes = 0;
    cred.last_error_at = Some(Utc::now());
    if error.is_some() {
        cred.last_error = error;
    }

    // Disabled is operator-owned; failures never move it
    if cred.status == CredentialStatus::Disabled || cred.status == CredentialStatus::Banned {
        return;
    }

    let consecutive_trip = cred.consecutive_failures >= policy.ban_threshold;
    let long_run_trip =
        cred.fail_count > LONG_RUN_FAIL_FLOOR && cred.fail_count > cred.success_count;

    if consecutive_trip || long_run_trip {
        cred.status = CredentialStatus::Banned;
    }
}
