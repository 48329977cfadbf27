//! Allocation strategies
//!
//! Ordering policies for picking among eligible credentials. Every strategy
//! shares the universal primary tie-break (premium first, then priority) and
//! a final id tie-break so selection is deterministic.

use crate::models::Credential;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// Allocation Strategy
// ============================================================================

/// Selection strategy for eligible credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Least-loaded first, then best success rate (default)
    #[default]
    Balanced,
    /// Best success rate first
    SuccessRate,
    /// Fewest recorded failures first
    LeastFailures,
    /// Least recently used first; never-used credentials lead
    RoundRobin,
}

impl AllocationStrategy {
    /// All strategies, in registration order
    pub const ALL: [AllocationStrategy; 4] = [
        Self::Balanced,
        Self::SuccessRate,
        Self::LeastFailures,
        Self::RoundRobin,
    ];
}

impl std::fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Balanced => write!(f, "balanced"),
            Self::SuccessRate => write!(f, "success_rate"),
            Self::LeastFailures => write!(f, "least_failures"),
            Self::RoundRobin => write!(f, "round_robin"),
        }
    }
}

impl std::str::FromStr for AllocationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "success_rate" => Ok(Self::SuccessRate),
            "least_failures" => Ok(Self::LeastFailures),
            "round_robin" => Ok(Self::RoundRobin),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

// ============================================================================
// Candidate Ordering
// ============================================================================

/// Order candidates in place, best pick first.
///
/// Primary tie-break for every strategy: `is_premium` desc, `priority` desc.
/// Final tie-break: `id` asc, so equal candidates resolve deterministically.
pub fn order_candidates(candidates: &mut [Credential], strategy: AllocationStrategy) {
    candidates.sort_by(|a, b| {
        universal_tiebreak(a, b)
            .then_with(|| strategy_order(a, b, strategy))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn universal_tiebreak(a: &Credential, b: &Credential) -> Ordering {
    b.is_premium
        .cmp(&a.is_premium)
        .then_with(|| b.priority.cmp(&a.priority))
}

fn strategy_order(a: &Credential, b: &Credential, strategy: AllocationStrategy) -> Ordering {
    match strategy {
        AllocationStrategy::Balanced => a
            .current_count
            .cmp(&b.current_count)
            .then_with(|| cmp_rate_desc(a, b))
            .then_with(|| b.success_count.cmp(&a.success_count)),
        AllocationStrategy::SuccessRate => {
            cmp_rate_desc(a, b).then_with(|| a.current_count.cmp(&b.current_count))
        }
        AllocationStrategy::LeastFailures => a
            .fail_count
            .cmp(&b.fail_count)
            .then_with(|| b.success_count.cmp(&a.success_count))
            .then_with(|| a.current_count.cmp(&b.current_count)),
        AllocationStrategy::RoundRobin => match (a.last_used_at, b.last_used_at) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        },
    }
}

fn cmp_rate_desc(a: &Credential, b: &Credential) -> Ordering {
    b.success_rate().total_cmp(&a.success_rate())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn cred(id: &str, max: u32) -> Credential {
        Credential::new(id, format!("ext-{}", id), format!("sk-{}", id), max)
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "balanced".parse::<AllocationStrategy>().unwrap(),
            AllocationStrategy::Balanced
        );
        assert_eq!(
            "SUCCESS_RATE".parse::<AllocationStrategy>().unwrap(),
            AllocationStrategy::SuccessRate
        );
        assert!("weighted".parse::<AllocationStrategy>().is_err());
    }

    #[test]
    fn test_balanced_prefers_least_loaded() {
        let mut a = cred("a", 5);
        a.current_count = 3;
        let mut b = cred("b", 5);
        b.current_count = 1;

        let mut candidates = vec![a, b];
        order_candidates(&mut candidates, AllocationStrategy::Balanced);
        assert_eq!(candidates[0].id, "b");
    }

    #[test]
    fn test_balanced_ties_resolve_by_id() {
        // Identical load, rates, and counters: the lower id wins
        let x = cred("x", 1);
        let y = cred("y", 2);
        let mut candidates = vec![y, x];
        order_candidates(&mut candidates, AllocationStrategy::Balanced);
        assert_eq!(candidates[0].id, "x");
    }

    #[test]
    fn test_premium_and_priority_beat_every_strategy() {
        let mut loaded_premium = cred("loaded", 5);
        loaded_premium.current_count = 4;
        loaded_premium.is_premium = true;
        let idle = cred("idle", 5);

        let mut candidates = vec![idle.clone(), loaded_premium.clone()];
        order_candidates(&mut candidates, AllocationStrategy::Balanced);
        assert_eq!(candidates[0].id, "loaded");

        let mut high_priority = cred("prio", 5);
        high_priority.priority = 10;
        high_priority.fail_count = 50;
        let mut candidates = vec![idle, high_priority];
        order_candidates(&mut candidates, AllocationStrategy::LeastFailures);
        assert_eq!(candidates[0].id, "prio");
    }

    #[test]
    fn test_success_rate_ordering() {
        let mut good = cred("good", 5);
        good.success_count = 9;
        good.fail_count = 1;
        let mut bad = cred("bad", 5);
        bad.success_count = 5;
        bad.fail_count = 5;

        let mut candidates = vec![bad, good];
        order_candidates(&mut candidates, AllocationStrategy::SuccessRate);
        assert_eq!(candidates[0].id, "good");
    }

    #[test]
    fn test_least_failures_ordering() {
        let mut flaky = cred("flaky", 5);
        flaky.fail_count = 4;
        flaky.success_count = 100;
        let mut steady = cred("steady", 5);
        steady.fail_count = 1;
        steady.success_count = 10;

        let mut candidates = vec![flaky, steady];
        order_candidates(&mut candidates, AllocationStrategy::LeastFailures);
        assert_eq!(candidates[0].id, "steady");
    }

    #[test]
    fn test_round_robin_nulls_first_then_oldest() {
        let now = Utc::now();
        let mut recent = cred("recent", 5);
        recent.last_used_at = Some(now);
        let mut stale = cred("stale", 5);
        stale.last_used_at = Some(now - Duration::minutes(10));
        let fresh = cred("fresh", 5);

        let mut candidates = vec![recent, stale, fresh];
        order_candidates(&mut candidates, AllocationStrategy::RoundRobin);
        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "stale", "recent"]);
    }
}
