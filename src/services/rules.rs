//! Rule engine
//!
//! Evaluates allocation rules (deny/bind/prefer/allow) against a request
//! before strategy selection. The enabled-rule list is served from a
//! short-TTL cache so rule changes take effect within a few seconds while
//! keeping the per-allocation cost to one cache read.

use crate::models::{AllocationRule, RuleAction, RuleTargetType, RuleType, Tier};
use crate::store::CredentialStore;
use anyhow::Result;
use chrono::Utc;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Request attributes rules are matched against
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub owner_key: &'a str,
    pub user_id: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub tier: Option<Tier>,
}

impl<'a> RuleContext<'a> {
    pub fn for_owner(owner_key: &'a str) -> Self {
        Self {
            owner_key,
            user_id: None,
            ip: None,
            tier: None,
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }
}

/// Reference to a matched rule, kept for audit
#[derive(Debug, Clone)]
pub struct RuleRef {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub action: RuleAction,
    pub priority: i32,
}

/// Outcome of rule evaluation
#[derive(Debug, Clone)]
pub struct RuleDecision {
    pub allowed: bool,
    /// The highest-priority deny that matched, when not allowed
    pub deny_rule_id: Option<String>,
    /// First bind match in priority order
    pub bound_credential_id: Option<String>,
    /// First prefer match in priority order
    pub preferred_credential_id: Option<String>,
    /// Every matched rule, for audit
    pub matched: Vec<RuleRef>,
}

impl RuleDecision {
    fn allow_all() -> Self {
        Self {
            allowed: true,
            deny_rule_id: None,
            bound_credential_id: None,
            preferred_credential_id: None,
            matched: Vec::new(),
        }
    }
}

/// Evaluates allocation rules against requests
pub struct RuleEngine {
    store: Arc<dyn CredentialStore>,
    cache: Cache<(), Arc<Vec<AllocationRule>>>,
}

impl RuleEngine {
    /// Create a rule engine with the given cache TTL
    pub fn new(store: Arc<dyn CredentialStore>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(cache_ttl)
            .build();
        Self { store, cache }
    }

    /// Evaluate all live rules against the request.
    ///
    /// Rules run in `(priority desc, created_at asc)` order. A deny does not
    /// short-circuit scanning; every match is still collected for audit.
    /// The first bind wins, the first prefer wins, and allow is recorded but
    /// never relaxes a deny.
    pub async fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleDecision> {
        let rules = self.enabled_rules().await?;
        let now = Utc::now();

        let mut decision = RuleDecision::allow_all();

        for rule in rules.iter() {
            // The cached list may hold rules that expired within the TTL
            if !rule.is_live(now) {
                continue;
            }
            if !Self::matches(rule, ctx) {
                continue;
            }

            decision.matched.push(RuleRef {
                rule_id: rule.id.clone(),
                rule_type: rule.rule_type,
                action: rule.action,
                priority: rule.priority,
            });

            match rule.action {
                RuleAction::Deny => {
                    if decision.allowed {
                        decision.allowed = false;
                        decision.deny_rule_id = Some(rule.id.clone());
                    }
                }
                RuleAction::Bind => {
                    if decision.bound_credential_id.is_none() {
                        decision.bound_credential_id = rule.credential_id.clone();
                    }
                }
                RuleAction::Prefer => {
                    if decision.preferred_credential_id.is_none() {
                        decision.preferred_credential_id = rule.credential_id.clone();
                    }
                }
                RuleAction::Allow => {
                    // Informational only (whitelist reporting)
                }
            }
        }

        if !decision.allowed {
            tracing::debug!(
                owner_key = ctx.owner_key,
                rule_id = ?decision.deny_rule_id,
                "Allocation denied by rule"
            );
        }

        Ok(decision)
    }

    /// Drop the cached rule list so the next evaluation reloads it.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    /// Enabled rules sorted by `(priority desc, created_at asc)`, cached.
    async fn enabled_rules(&self) -> Result<Arc<Vec<AllocationRule>>> {
        let store = Arc::clone(&self.store);
        self.cache
            .try_get_with((), async move {
                let mut rules: Vec<AllocationRule> = store
                    .list_rules()
                    .await?
                    .into_iter()
                    .filter(|r| r.enabled)
                    .collect();
                rules.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then_with(|| a.created_at.cmp(&b.created_at))
                });
                Ok::<_, anyhow::Error>(Arc::new(rules))
            })
            .await
            .map_err(|e: Arc<anyhow::Error>| anyhow::anyhow!("rule load failed: {}", e))
    }

    fn matches(rule: &AllocationRule, ctx: &RuleContext<'_>) -> bool {
        match rule.target_type {
            RuleTargetType::OwnerKey => ctx.owner_key == rule.target_value,
            RuleTargetType::UserId => ctx.user_id == Some(rule.target_value.as_str()),
            RuleTargetType::Ip => ctx.ip == Some(rule.target_value.as_str()),
            RuleTargetType::Tier => match (ctx.tier, rule.target_value.parse::<Tier>()) {
                (Some(tier), Ok(target)) => tier == target,
                _ => false,
            },
        }
    }
}
