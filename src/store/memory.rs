//! In-memory credential store
//!
//! Backs tests and single-process deployments. A single `RwLock` guards the
//! maps; every trait method acquires the lock, mutates one row, and returns
//! before any await point, which gives the per-row atomicity the engine
//! relies on.

use super::{CredentialStore, CredentialUpdate, EligibilityFilter};
use crate::models::{
    Allocation, AllocationRule, AllocationStatus, Credential, CredentialStatus, Group, Tenant,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct MemoryStoreInner {
    credentials: HashMap<String, Credential>,
    allocations: HashMap<String, Allocation>,
    /// owner_key -> allocation id, maintained for Active allocations only
    active_by_owner: HashMap<String, String>,
    groups: HashMap<String, Group>,
    rules: HashMap<String, AllocationRule>,
    tenants: HashMap<String, Tenant>,
}

/// In-memory `CredentialStore` implementation
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_eligible(&self, filter: &EligibilityFilter) -> Result<Vec<Credential>> {
        let inner = self.read();
        let mut eligible: Vec<Credential> = inner
            .credentials
            .values()
            .filter(|c| c.is_allocatable())
            .filter(|c| c.min_tier <= filter.tier)
            .filter(|c| match &filter.group_id {
                Some(group_id) => {
                    c.group_id.is_none() || c.group_id.as_deref() == Some(group_id.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        // Stable read order; the engine applies strategy ordering on top
        eligible.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(eligible)
    }

    async fn get_credential(&self, id: &str) -> Result<Option<Credential>> {
        Ok(self.read().credentials.get(id).cloned())
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>> {
        let mut all: Vec<Credential> = self.read().credentials.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn put_credential(&self, credential: Credential) -> Result<()> {
        if credential.max_concurrent == 0 {
            anyhow::bail!("credential {} has max_concurrent = 0", credential.id);
        }
        self.write()
            .credentials
            .insert(credential.id.clone(), credential);
        Ok(())
    }

    async fn delete_credential(&self, id: &str, force: bool) -> Result<bool> {
        let mut inner = self.write();
        match inner.credentials.get(id) {
            None => Ok(false),
            Some(cred) if cred.current_count > 0 && !force => {
                anyhow::bail!(
                    "credential {} has {} active allocations; use force to delete",
                    id,
                    cred.current_count
                )
            }
            Some(_) => {
                inner.credentials.remove(id);
                Ok(true)
            }
        }
    }

    async fn try_reserve(&self, id: &str, expected_current_count: u32) -> Result<bool> {
        let mut inner = self.write();
        let Some(cred) = inner.credentials.get_mut(id) else {
            return Ok(false);
        };
        if cred.current_count != expected_current_count || !cred.has_capacity() {
            return Ok(false);
        }
        cred.current_count += 1;
        cred.last_used_at = Some(Utc::now());
        if cred.current_count >= cred.max_concurrent && cred.status == CredentialStatus::Available
        {
            cred.status = CredentialStatus::Full;
        }
        Ok(true)
    }

    async fn release_credential(&self, id: &str) -> Result<()> {
        let mut inner = self.write();
        let Some(cred) = inner.credentials.get_mut(id) else {
            anyhow::bail!("credential {} not found", id);
        };
        cred.current_count = cred.current_count.saturating_sub(1);
        cred.recompute_capacity_status();
        Ok(())
    }

    async fn update_credential(
        &self,
        id: &str,
        mutate: Box<dyn for<'a> FnOnce(&'a mut Credential) + Send>,
    ) -> Result<Option<CredentialUpdate>> {
        let mut inner = self.write();
        let Some(cred) = inner.credentials.get_mut(id) else {
            return Ok(None);
        };
        let before = cred.clone();
        mutate(cred);
        Ok(Some(CredentialUpdate {
            before,
            after: cred.clone(),
        }))
    }

    async fn insert_allocation(&self, allocation: Allocation) -> Result<()> {
        let mut inner = self.write();
        if let Some(existing) = inner.active_by_owner.get(&allocation.owner_key) {
            anyhow::bail!(
                "owner {} already holds active allocation {}",
                allocation.owner_key,
                existing
            );
        }
        inner
            .active_by_owner
            .insert(allocation.owner_key.clone(), allocation.id.clone());
        inner.allocations.insert(allocation.id.clone(), allocation);
        Ok(())
    }

    async fn active_allocation(&self, owner_key: &str) -> Result<Option<Allocation>> {
        let inner = self.read();
        Ok(inner
            .active_by_owner
            .get(owner_key)
            .and_then(|id| inner.allocations.get(id))
            .cloned())
    }

    async fn mark_released(&self, allocation_id: &str) -> Result<Option<Allocation>> {
        let mut inner = self.write();
        let Some(alloc) = inner.allocations.get_mut(allocation_id) else {
            return Ok(None);
        };
        if alloc.status == AllocationStatus::Active {
            alloc.status = AllocationStatus::Released;
            alloc.released_at = Some(Utc::now());
        }
        let released = alloc.clone();
        inner.active_by_owner.remove(&released.owner_key);
        Ok(Some(released))
    }

    async fn count_active_for_credential(&self, credential_id: &str) -> Result<usize> {
        let inner = self.read();
        Ok(inner
            .allocations
            .values()
            .filter(|a| a.is_active() && a.credential_id == credential_id)
            .count())
    }

    async fn put_group(&self, group: Group) -> Result<()> {
        self.write().groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn get_group(&self, id: &str) -> Result<Option<Group>> {
        Ok(self.read().groups.get(id).cloned())
    }

    async fn delete_group(&self, id: &str) -> Result<bool> {
        Ok(self.write().groups.remove(id).is_some())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let mut all: Vec<Group> = self.read().groups.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn put_rule(&self, rule: AllocationRule) -> Result<()> {
        rule.validate().map_err(|e| anyhow::anyhow!(e))?;
        self.write().rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn get_rule(&self, id: &str) -> Result<Option<AllocationRule>> {
        Ok(self.read().rules.get(id).cloned())
    }

    async fn delete_rule(&self, id: &str) -> Result<bool> {
        Ok(self.write().rules.remove(id).is_some())
    }

    async fn list_rules(&self) -> Result<Vec<AllocationRule>> {
        let mut all: Vec<AllocationRule> = self.read().rules.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn put_tenant(&self, tenant: Tenant) -> Result<()> {
        self.write().tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        Ok(self.read().tenants.get(id).cloned())
    }

    async fn delete_tenant(&self, id: &str) -> Result<bool> {
        Ok(self.write().tenants.remove(id).is_some())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let mut all: Vec<Tenant> = self.read().tenants.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}
