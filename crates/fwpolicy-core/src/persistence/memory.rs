//! In-process repository

use super::{AppPolicyRepository, DomainRuleRepository, IpRuleRepository, Snapshot};
use crate::app::AppPolicy;
use crate::domain::DomainRule;
use crate::error::{Error, Result};
use crate::ip::{HostSpecifier, IpRule};
use crate::status::{ConnectionStatus, FirewallStatus};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Repository backed by in-memory tables
///
/// Writes can be made to fail on demand with
/// [`MemoryRepository::fail_writes`], which is how persistence failures are
/// exercised in tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Snapshot>,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::new())
    }

    /// Create a repository pre-populated with `snapshot`
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Copy of everything stored
    pub fn snapshot(&self) -> Snapshot {
        self.tables.read().clone()
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write(&self, operation: &'static str, apply: impl FnOnce(&mut Snapshot)) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence(operation, "writes disabled"));
        }
        apply(&mut self.tables.write());
        Ok(())
    }
}

impl DomainRuleRepository for MemoryRepository {
    fn all_rules(&self) -> Result<Vec<DomainRule>> {
        Ok(self.tables.read().domain_rules.clone())
    }

    fn insert_or_update(&self, rule: &DomainRule) -> Result<()> {
        self.write("domain_insert_or_update", |t| t.upsert_domain(rule))
    }

    fn delete(&self, rule: &DomainRule) -> Result<()> {
        self.write("domain_delete", |t| t.delete_domain(rule))
    }
}

impl IpRuleRepository for MemoryRepository {
    fn all_rules(&self) -> Result<Vec<IpRule>> {
        Ok(self.tables.read().ip_rules.clone())
    }

    fn insert_or_update(&self, rule: &IpRule) -> Result<()> {
        self.write("ip_insert_or_update", |t| t.upsert_ip(rule))
    }

    fn delete_by_uid_and_host(&self, uid: i32, host: &HostSpecifier) -> Result<()> {
        self.write("ip_delete", |t| t.delete_ip(uid, host))
    }

    fn delete_all_for_uid(&self, uid: i32) -> Result<()> {
        self.write("ip_delete_uid", |t| t.delete_ip_for_uid(uid))
    }

    fn delete_all_global(&self) -> Result<()> {
        self.write("ip_delete_all", |t| t.ip_rules.clear())
    }
}

impl AppPolicyRepository for MemoryRepository {
    fn all_app_policies(&self) -> Result<Vec<AppPolicy>> {
        Ok(self.tables.read().app_policies.clone())
    }

    fn upsert(&self, policy: &AppPolicy) -> Result<()> {
        self.write("app_upsert", |t| t.upsert_app(policy))
    }

    fn update_status_by_uid(
        &self,
        uid: i32,
        firewall: FirewallStatus,
        connection: ConnectionStatus,
    ) -> Result<()> {
        let mut found = true;
        self.write("app_update_status", |t| {
            found = t.update_app_status(uid, firewall, connection);
        })?;
        if found {
            Ok(())
        } else {
            Err(Error::persistence("app_update_status", format!("no policy for uid {uid}")))
        }
    }

    fn delete(&self, uid: i32) -> Result<()> {
        self.write("app_delete", |t| t.delete_app(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{DomainKind, DomainStatus};

    #[test]
    fn test_fail_writes() {
        let repo = MemoryRepository::new();
        let rule = DomainRule::new("a.com", DomainKind::Exact, DomainStatus::Block);

        repo.fail_writes(true);
        assert!(DomainRuleRepository::insert_or_update(&repo, &rule).is_err());
        assert!(DomainRuleRepository::all_rules(&repo).unwrap().is_empty());

        repo.fail_writes(false);
        DomainRuleRepository::insert_or_update(&repo, &rule).unwrap();
        assert_eq!(DomainRuleRepository::all_rules(&repo).unwrap(), vec![rule]);
    }

    #[test]
    fn test_update_status_requires_existing_policy() {
        let repo = MemoryRepository::new();
        assert!(repo
            .update_status_by_uid(1, FirewallStatus::Isolate, ConnectionStatus::Both)
            .is_err());

        repo.upsert(&AppPolicy::new(1)).unwrap();
        repo.update_status_by_uid(1, FirewallStatus::Isolate, ConnectionStatus::Both)
            .unwrap();
        assert_eq!(
            repo.all_app_policies().unwrap()[0].firewall_status,
            FirewallStatus::Isolate
        );
    }
}
