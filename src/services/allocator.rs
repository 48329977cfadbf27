//! Allocation engine
//!
//! Orchestrates rule evaluation, candidate filtering, strategy ordering, and
//! the atomic reserve to serve Allocate/Release calls. The engine holds no
//! per-owner locks: correctness under concurrent callers rests entirely on
//! the store's conditional `try_reserve` primitive, retried a bounded number
//! of times when a race is lost.

use crate::audit::AuditLog;
use crate::config::Settings;
use crate::error::AllocError;
use crate::models::{Allocation, AuditAction, AuditRecord, Credential, Tier};
use crate::services::rules::{RuleContext, RuleEngine};
use crate::services::strategy::{order_candidates, AllocationStrategy};
use crate::store::{CredentialStore, EligibilityFilter};
use std::sync::Arc;
use std::time::Duration;

/// Strategy name recorded when an idempotent allocate returns the existing
/// allocation unchanged.
const STRATEGY_EXISTING: &str = "existing";

/// An allocation request.
///
/// Callers must not race concurrent Allocate/Release calls for the same
/// owner key; the engine does not serialize per owner.
#[derive(Debug, Clone)]
pub struct AllocateRequest {
    /// Unique workload identity
    pub owner_key: String,
    /// Requested tier; unlocks credentials gated at this tier or below
    pub tier: Tier,
    /// Selection strategy; the engine's configured default applies when
    /// unset, and a group's own strategy overrides either
    pub strategy: Option<AllocationStrategy>,
    pub group_id: Option<String>,
    /// Explicit caller preference; collapses the candidate set
    pub preferred_credential_id: Option<String>,
    /// Optional attributes consulted by rules
    pub user_id: Option<String>,
    pub ip: Option<String>,
}

impl AllocateRequest {
    pub fn new(owner_key: impl Into<String>, tier: Tier) -> Self {
        Self {
            owner_key: owner_key.into(),
            tier,
            strategy: None,
            group_id: None,
            preferred_credential_id: None,
            user_id: None,
            ip: None,
        }
    }

    pub fn with_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_preferred(mut self, credential_id: impl Into<String>) -> Self {
        self.preferred_credential_id = Some(credential_id.into());
        self
    }
}

/// A successful allocation
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub allocation_id: String,
    pub credential_id: String,
    /// The secret the worker uses against the external service
    pub secret: String,
    pub strategy_used: String,
}

/// Serves Allocate/Release requests atomically
pub struct AllocationEngine {
    store: Arc<dyn CredentialStore>,
    rules: RuleEngine,
    audit: Arc<dyn AuditLog>,
    max_reserve_attempts: u32,
    default_strategy: AllocationStrategy,
}

impl AllocationEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditLog>,
        settings: &Settings,
    ) -> Self {
        let rules = RuleEngine::new(
            Arc::clone(&store),
            Duration::from_secs(settings.rule_cache_ttl_secs),
        );
        Self {
            store,
            rules,
            audit,
            max_reserve_attempts: settings.max_reserve_attempts,
            default_strategy: settings.default_strategy,
        }
    }

    /// The rule engine, exposed so admin tooling can invalidate the cache
    /// after rule writes.
    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// Allocate a credential to an owner.
    pub async fn allocate(
        &self,
        request: AllocateRequest,
    ) -> Result<AllocationOutcome, AllocError> {
        if request.owner_key.trim().is_empty() {
            return Err(AllocError::Validation("owner_key must not be empty".into()));
        }

        // Idempotency: a second allocate for the same owner returns the
        // existing allocation unchanged.
        if let Some(existing) = self.store.active_allocation(&request.owner_key).await? {
            let credential = self
                .store
                .get_credential(&existing.credential_id)
                .await?
                .ok_or_else(|| {
                    AllocError::NotFound(format!("credential {}", existing.credential_id))
                })?;
            tracing::debug!(
                owner_key = %request.owner_key,
                allocation_id = %existing.id,
                "Returning existing allocation"
            );
            return Ok(AllocationOutcome {
                allocation_id: existing.id,
                credential_id: credential.id,
                secret: credential.secret,
                strategy_used: STRATEGY_EXISTING.to_string(),
            });
        }

        let ctx = RuleContext {
            owner_key: &request.owner_key,
            user_id: request.user_id.as_deref(),
            ip: request.ip.as_deref(),
            tier: Some(request.tier),
        };
        let decision = self.rules.evaluate(&ctx).await?;
        if !decision.allowed {
            return Err(AllocError::RuleDenied {
                rule_id: decision.deny_rule_id.unwrap_or_default(),
            });
        }

        // The configured default applies when the request names no strategy.
        // A group's own strategy overrides either, and its priority boost
        // lifts member credentials in the ordering.
        let requested_strategy = request.strategy.unwrap_or(self.default_strategy);
        let (effective_strategy, priority_boost) = match &request.group_id {
            Some(group_id) => {
                let group = self
                    .store
                    .get_group(group_id)
                    .await?
                    .ok_or_else(|| AllocError::Validation(format!("unknown group {}", group_id)))?;
                (
                    group.allocation_strategy.unwrap_or(requested_strategy),
                    group.priority_boost,
                )
            }
            None => (requested_strategy, 0),
        };

        let filter = EligibilityFilter {
            tier: request.tier,
            group_id: request.group_id.clone(),
        };

        // Selection and reserve, retried on lost races with a fresh read so
        // stale counts do not burn real capacity.
        for attempt in 0..self.max_reserve_attempts {
            let mut eligible = self.store.find_eligible(&filter).await?;

            if priority_boost != 0 {
                for candidate in &mut eligible {
                    if candidate.group_id == request.group_id {
                        candidate.priority += priority_boost;
                    }
                }
            }

            let candidate = self.select(
                eligible,
                effective_strategy,
                decision.bound_credential_id.as_deref(),
                request.preferred_credential_id.as_deref(),
                decision.preferred_credential_id.as_deref(),
            )?;

            if self
                .store
                .try_reserve(&candidate.id, candidate.current_count)
                .await?
            {
                return self
                    .finish_allocation(&request, candidate, effective_strategy)
                    .await;
            }

            tracing::trace!(
                owner_key = %request.owner_key,
                credential_id = %candidate.id,
                attempt,
                "Lost reserve race, retrying selection"
            );
        }

        Err(AllocError::PoolExhausted)
    }

    /// Release the owner's active allocation.
    pub async fn release(&self, owner_key: &str) -> Result<(), AllocError> {
        let allocation = self
            .store
            .active_allocation(owner_key)
            .await?
            .ok_or_else(|| {
                AllocError::NotFound(format!("no active allocation for {}", owner_key))
            })?;

        self.store.mark_released(&allocation.id).await?;
        self.store
            .release_credential(&allocation.credential_id)
            .await?;

        self.audit
            .append(AuditRecord::new(
                AuditAction::Release,
                &allocation.credential_id,
                owner_key,
                format!("released allocation {}", allocation.id),
            ))
            .await?;

        tracing::info!(
            owner_key = %owner_key,
            credential_id = %allocation.credential_id,
            allocation_id = %allocation.id,
            "Released allocation"
        );

        Ok(())
    }

    /// Pick the candidate to reserve, honoring forced selection.
    ///
    /// A rule bind collapses the candidate set to that credential; an
    /// explicit caller preference does the same. A rule prefer only moves
    /// its credential to the front when it is already eligible.
    fn select(
        &self,
        mut eligible: Vec<Credential>,
        strategy: AllocationStrategy,
        bound: Option<&str>,
        caller_preferred: Option<&str>,
        rule_preferred: Option<&str>,
    ) -> Result<Credential, AllocError> {
        if let Some(bound_id) = bound {
            return eligible
                .into_iter()
                .find(|c| c.id == bound_id)
                .ok_or_else(|| AllocError::RuleBindingUnavailable {
                    credential_id: bound_id.to_string(),
                });
        }

        if let Some(preferred_id) = caller_preferred {
            return eligible
                .into_iter()
                .find(|c| c.id == preferred_id)
                .ok_or_else(|| AllocError::PreferredUnavailable {
                    credential_id: preferred_id.to_string(),
                });
        }

        if eligible.is_empty() {
            return Err(AllocError::PoolExhausted);
        }

        order_candidates(&mut eligible, strategy);

        if let Some(preferred_id) = rule_preferred {
            if let Some(pos) = eligible.iter().position(|c| c.id == preferred_id) {
                let preferred = eligible.remove(pos);
                eligible.insert(0, preferred);
            }
        }

        Ok(eligible.remove(0))
    }

    async fn finish_allocation(
        &self,
        request: &AllocateRequest,
        credential: Credential,
        strategy: AllocationStrategy,
    ) -> Result<AllocationOutcome, AllocError> {
        let allocation = Allocation::new(&credential.id, &request.owner_key);
        let allocation_id = allocation.id.clone();

        // The reserve must not outlive a failed allocation record: compensate
        // before propagating so current_count never drifts from the Active
        // allocation count.
        if let Err(e) = self.store.insert_allocation(allocation).await {
            self.store.release_credential(&credential.id).await?;
            return Err(AllocError::Storage(e));
        }

        self.audit
            .append(
                AuditRecord::new(
                    AuditAction::Allocate,
                    &credential.id,
                    &request.owner_key,
                    format!("allocated via {}", strategy),
                )
                .with_strategy(strategy.to_string()),
            )
            .await?;

        tracing::info!(
            owner_key = %request.owner_key,
            credential_id = %credential.id,
            allocation_id = %allocation_id,
            strategy = %strategy,
            "Allocated credential"
        );

        Ok(AllocationOutcome {
            allocation_id,
            credential_id: credential.id,
            secret: credential.secret,
            strategy_used: strategy.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditQuery, MemoryAuditLog};
    use crate::models::{
        AllocationRule, CredentialStatus, Group, RuleAction, RuleTargetType, RuleType,
    };
    use crate::store::MemoryStore;

    fn settings() -> Settings {
        Settings::default()
    }

    async fn engine_with(
        creds: Vec<Credential>,
    ) -> (Arc<MemoryStore>, Arc<MemoryAuditLog>, AllocationEngine) {
        let store = Arc::new(MemoryStore::new());
        for cred in creds {
            store.put_credential(cred).await.unwrap();
        }
        let audit = Arc::new(MemoryAuditLog::new());
        let engine = AllocationEngine::new(
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::clone(&audit) as Arc<dyn AuditLog>,
            &settings(),
        );
        (store, audit, engine)
    }

    fn cred(id: &str, max: u32) -> Credential {
        Credential::new(id, format!("ext-{}", id), format!("sk-{}", id), max)
    }

    #[tokio::test]
    async fn test_allocate_and_release_round_trip() {
        let (store, audit, engine) = engine_with(vec![cred("c1", 2)]).await;

        let outcome = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "c1");
        assert_eq!(outcome.secret, "sk-c1");
        assert_eq!(outcome.strategy_used, "balanced");

        let stored = store.get_credential("c1").await.unwrap().unwrap();
        assert_eq!(stored.current_count, 1);

        engine.release("owner-1").await.unwrap();
        let stored = store.get_credential("c1").await.unwrap().unwrap();
        assert_eq!(stored.current_count, 0);
        assert_eq!(stored.status, CredentialStatus::Available);

        let page = audit.query(&AuditQuery::for_owner("owner-1")).await.unwrap();
        assert_eq!(page.total, 2); // allocate + release
    }

    #[tokio::test]
    async fn test_allocate_is_idempotent() {
        let (store, _, engine) = engine_with(vec![cred("c1", 5)]).await;

        let first = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();
        let second = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();

        assert_eq!(first.allocation_id, second.allocation_id);
        assert_eq!(second.strategy_used, "existing");

        let stored = store.get_credential("c1").await.unwrap().unwrap();
        assert_eq!(stored.current_count, 1);
    }

    #[tokio::test]
    async fn test_deny_rule_blocks_allocation() {
        let (store, _, engine) = engine_with(vec![cred("c1", 5)]).await;
        store
            .put_rule(AllocationRule::new(
                "r1",
                RuleType::Blacklist,
                RuleTargetType::OwnerKey,
                "owner-2",
                RuleAction::Deny,
            ))
            .await
            .unwrap();
        engine.rules().invalidate_cache();

        let err = engine
            .allocate(AllocateRequest::new("owner-2", Tier::Free))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rule_denied");

        // Other owners are unaffected
        engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_rule_forces_credential() {
        let (store, _, engine) = engine_with(vec![cred("good", 5), cred("bound", 5)]).await;
        store
            .put_rule(
                AllocationRule::new(
                    "r1",
                    RuleType::Binding,
                    RuleTargetType::OwnerKey,
                    "owner-1",
                    RuleAction::Bind,
                )
                .with_credential("bound"),
            )
            .await
            .unwrap();
        engine.rules().invalidate_cache();

        let outcome = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "bound");
    }

    #[tokio::test]
    async fn test_bind_to_ineligible_credential_fails() {
        let (store, _, engine) = engine_with(vec![cred("c1", 5)]).await;
        store
            .put_rule(
                AllocationRule::new(
                    "r1",
                    RuleType::Binding,
                    RuleTargetType::OwnerKey,
                    "owner-1",
                    RuleAction::Bind,
                )
                .with_credential("ghost"),
            )
            .await
            .unwrap();
        engine.rules().invalidate_cache();

        let err = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rule_binding_unavailable");
    }

    #[tokio::test]
    async fn test_prefer_rule_moves_credential_to_front() {
        // "better" would win balanced ordering; the prefer rule overrides it
        let mut better = cred("better", 5);
        better.priority = 10;
        let (store, _, engine) = engine_with(vec![better, cred("preferred", 5)]).await;
        store
            .put_rule(
                AllocationRule::new(
                    "r1",
                    RuleType::Restriction,
                    RuleTargetType::OwnerKey,
                    "owner-1",
                    RuleAction::Prefer,
                )
                .with_credential("preferred"),
            )
            .await
            .unwrap();
        engine.rules().invalidate_cache();

        let outcome = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "preferred");
    }

    #[tokio::test]
    async fn test_caller_preferred_unavailable() {
        let mut full = cred("full", 1);
        full.current_count = 1;
        full.status = CredentialStatus::Full;
        let (_, _, engine) = engine_with(vec![cred("open", 5), full]).await;

        let err = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free).with_preferred("full"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "preferred_unavailable");
    }

    #[tokio::test]
    async fn test_tier_gating() {
        let gated = cred("gated", 5).with_min_tier(Tier::Gold);
        let (_, _, engine) = engine_with(vec![gated]).await;

        let err = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Silver))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "pool_exhausted");

        let outcome = engine
            .allocate(AllocateRequest::new("owner-2", Tier::Diamond))
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "gated");
    }

    #[tokio::test]
    async fn test_group_strategy_overrides_request() {
        // Under least_failures "steady" wins; the group pins round_robin,
        // under which the never-used "fresh" credential leads.
        let mut steady = cred("steady", 5);
        steady.success_count = 100;
        steady.last_used_at = Some(chrono::Utc::now());
        let mut fresh = cred("fresh", 5);
        fresh.fail_count = 2;

        let (store, _, engine) = engine_with(vec![steady, fresh]).await;
        store
            .put_group(Group::new("g1", "pinned").with_strategy(AllocationStrategy::RoundRobin))
            .await
            .unwrap();

        let outcome = engine
            .allocate(
                AllocateRequest::new("owner-1", Tier::Free)
                    .with_strategy(AllocationStrategy::LeastFailures)
                    .with_group("g1"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "fresh");
    }

    #[tokio::test]
    async fn test_configured_default_strategy_applies_when_unset() {
        // "used" leads under balanced (fewer active) but loses under the
        // configured round_robin default because "idle" has never been used.
        let mut used = cred("used", 5);
        used.last_used_at = Some(chrono::Utc::now());
        let mut idle = cred("idle", 5);
        idle.current_count = 1;

        let store = Arc::new(MemoryStore::new());
        store.put_credential(used).await.unwrap();
        store.put_credential(idle).await.unwrap();
        let engine = AllocationEngine::new(
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::new(MemoryAuditLog::new()) as Arc<dyn AuditLog>,
            &Settings::default().with_default_strategy(AllocationStrategy::RoundRobin),
        );

        let outcome = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "idle");
        assert_eq!(outcome.strategy_used, "round_robin");

        // An explicit request strategy still wins over the configured default
        let outcome = engine
            .allocate(
                AllocateRequest::new("owner-2", Tier::Free)
                    .with_strategy(AllocationStrategy::Balanced),
            )
            .await
            .unwrap();
        assert_eq!(outcome.strategy_used, "balanced");
    }

    #[tokio::test]
    async fn test_group_priority_boost_lifts_members() {
        // "outside" wins on raw priority; the group boost lifts the member
        // above it for group-scoped requests.
        let outside = cred("outside", 5).with_priority(5);
        let member = cred("member", 5).with_group("g1");

        let (store, _, engine) = engine_with(vec![outside, member]).await;
        store
            .put_group(Group::new("g1", "boosted").with_priority_boost(10))
            .await
            .unwrap();

        let outcome = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free).with_group("g1"))
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "member");
    }

    #[tokio::test]
    async fn test_unknown_group_is_validation_error() {
        let (_, _, engine) = engine_with(vec![cred("c1", 5)]).await;
        let err = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free).with_group("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_empty_pool_is_exhausted() {
        let (_, _, engine) = engine_with(vec![]).await;
        let err = engine
            .allocate(AllocateRequest::new("owner-1", Tier::King))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "pool_exhausted");
    }

    #[tokio::test]
    async fn test_release_without_allocation_is_not_found() {
        let (_, _, engine) = engine_with(vec![cred("c1", 5)]).await;
        let err = engine.release("ownerX").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_balanced_tie_break_picks_lower_id() {
        // Scenario: X(max=1) and Y(max=2), both idle with identical rates
        let (_, _, engine) = engine_with(vec![cred("x", 1), cred("y", 2)]).await;
        let outcome = engine
            .allocate(AllocateRequest::new("owner-1", Tier::Free))
            .await
            .unwrap();
        assert_eq!(outcome.credential_id, "x");
    }
}
