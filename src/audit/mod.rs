//! Audit log
//!
//! Append-only record of allocate/release/failover actions, a paginated
//! read API, and the daily allocate counts the forecaster consumes.

use crate::models::{AuditAction, AuditRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Query parameters for the audit read API
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub owner_key: Option<String>,
    pub credential_id: Option<String>,
    pub action: Option<AuditAction>,
    pub offset: usize,
    /// 0 means the default page size (50)
    pub limit: usize,
}

impl AuditQuery {
    const DEFAULT_LIMIT: usize = 50;

    pub fn for_owner(owner_key: impl Into<String>) -> Self {
        Self {
            owner_key: Some(owner_key.into()),
            ..Default::default()
        }
    }

    pub fn for_credential(credential_id: impl Into<String>) -> Self {
        Self {
            credential_id: Some(credential_id.into()),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit
        }
    }

    fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(owner) = &self.owner_key {
            if &record.owner_key != owner {
                return false;
            }
        }
        if let Some(credential) = &self.credential_id {
            if &record.credential_id != credential {
                return false;
            }
        }
        if let Some(action) = self.action {
            if record.action != action {
                return false;
            }
        }
        true
    }
}

/// One page of audit records, newest first
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Append-only audit trail
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<()>;

    /// Paginated query, newest first.
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage>;

    /// Allocate-action counts per day over the trailing `days` window,
    /// including zero-count days, oldest first.
    async fn daily_allocate_counts(&self, days: u32) -> Result<Vec<(NaiveDate, u64)>>;
}

/// In-memory `AuditLog` implementation
#[derive(Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let matched: Vec<&AuditRecord> = records
            .iter()
            .rev() // append order; reversed gives newest first
            .filter(|r| query.matches(r))
            .collect();
        let total = matched.len();
        let limit = query.effective_limit();
        let page = matched
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(AuditPage {
            records: page,
            total,
            offset: query.offset,
            limit,
        })
    }

    async fn daily_allocate_counts(&self, days: u32) -> Result<Vec<(NaiveDate, u64)>> {
        let today = Utc::now().date_naive();
        let window_start = today - Duration::days(days.saturating_sub(1) as i64);

        let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        let mut day = window_start;
        while day <= today {
            counts.insert(day, 0);
            day += Duration::days(1);
        }

        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        for record in records.iter() {
            if record.action != AuditAction::Allocate {
                continue;
            }
            let date = record.timestamp.date_naive();
            if let Some(count) = counts.get_mut(&date) {
                *count += 1;
            }
        }

        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(action: AuditAction, credential: &str, owner: &str) -> AuditRecord {
        AuditRecord::new(action, credential, owner, "test")
    }

    #[tokio::test]
    async fn test_query_filters_and_paginates() {
        let log = MemoryAuditLog::new();
        for i in 0..5 {
            log.append(record(AuditAction::Allocate, "c1", &format!("owner-{}", i)))
                .await
                .unwrap();
        }
        log.append(record(AuditAction::Release, "c1", "owner-0"))
            .await
            .unwrap();
        log.append(record(AuditAction::Failover, "c2", ""))
            .await
            .unwrap();

        let page = log
            .query(&AuditQuery::for_credential("c1").with_action(AuditAction::Allocate))
            .await
            .unwrap();
        assert_eq!(page.total, 5);

        let page = log
            .query(
                &AuditQuery::for_credential("c1")
                    .with_action(AuditAction::Allocate)
                    .with_page(3, 2),
            )
            .await
            .unwrap();
        assert_eq!(page.records.len(), 2);
        // Newest first: offset 3 of 5 lands on the two oldest
        assert_eq!(page.records[0].owner_key, "owner-1");
        assert_eq!(page.records[1].owner_key, "owner-0");

        let page = log.query(&AuditQuery::for_owner("owner-0")).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_daily_allocate_counts_includes_empty_days() {
        let log = MemoryAuditLog::new();
        log.append(record(AuditAction::Allocate, "c1", "owner-1"))
            .await
            .unwrap();
        log.append(record(AuditAction::Allocate, "c1", "owner-2"))
            .await
            .unwrap();
        log.append(record(AuditAction::Release, "c1", "owner-1"))
            .await
            .unwrap();

        let counts = log.daily_allocate_counts(7).await.unwrap();
        assert_eq!(counts.len(), 7);
        // All records were appended today, the last day of the window
        assert_eq!(counts[6].1, 2);
        assert!(counts[..6].iter().all(|(_, n)| *n == 0));
    }
}
