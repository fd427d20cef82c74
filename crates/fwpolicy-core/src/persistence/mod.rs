//! Durable storage contract
//!
//! The stores never talk to a database directly. They are handed a
//! repository implementing the traits below and call it from the
//! background worker (writes) or from `load()` (reads).
//!
//! Two backends ship with the crate:
//! - [`MemoryRepository`] keeps everything in process, with write-failure
//!   injection for tests
//! - [`FileRepository`] keeps a JSON snapshot on disk

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::MemoryRepository;

use crate::app::AppPolicy;
use crate::domain::DomainRule;
use crate::error::Result;
use crate::ip::{HostSpecifier, IpRule};
use crate::status::{ConnectionStatus, FirewallStatus};
use serde::{Deserialize, Serialize};

/// Storage for domain rules
#[cfg_attr(test, mockall::automock)]
pub trait DomainRuleRepository: Send + Sync {
    /// Every stored rule, in insertion order
    fn all_rules(&self) -> Result<Vec<DomainRule>>;

    /// Insert a rule or replace the one stored under the same domain
    fn insert_or_update(&self, rule: &DomainRule) -> Result<()>;

    /// Remove the rule with the same domain and kind, if any
    fn delete(&self, rule: &DomainRule) -> Result<()>;
}

/// Storage for per-app IP rules
#[cfg_attr(test, mockall::automock)]
pub trait IpRuleRepository: Send + Sync {
    /// Every stored rule, in insertion order
    fn all_rules(&self) -> Result<Vec<IpRule>>;

    /// Insert a rule or replace the one stored under the same `(uid, host)`
    fn insert_or_update(&self, rule: &IpRule) -> Result<()>;

    /// Remove the rule for `uid` and `host`; the host carries the port
    fn delete_by_uid_and_host(&self, uid: i32, host: &HostSpecifier) -> Result<()>;

    /// Remove every rule scoped to `uid`
    fn delete_all_for_uid(&self, uid: i32) -> Result<()>;

    /// Remove every rule
    fn delete_all_global(&self) -> Result<()>;
}

/// Storage for per-app policies
#[cfg_attr(test, mockall::automock)]
pub trait AppPolicyRepository: Send + Sync {
    /// Every stored policy
    fn all_app_policies(&self) -> Result<Vec<AppPolicy>>;

    /// Insert or replace the full record for `policy.uid`
    fn upsert(&self, policy: &AppPolicy) -> Result<()>;

    /// Update only the statuses of an existing record
    fn update_status_by_uid(
        &self,
        uid: i32,
        firewall: FirewallStatus,
        connection: ConnectionStatus,
    ) -> Result<()>;

    /// Remove the record for `uid`, if any
    fn delete(&self, uid: i32) -> Result<()>;
}

/// A backend for every store
pub trait PolicyRepository: DomainRuleRepository + IpRuleRepository + AppPolicyRepository {}

impl<T> PolicyRepository for T where T: DomainRuleRepository + IpRuleRepository + AppPolicyRepository {}

/// Everything a backend stores, as one serializable value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Format version
    pub version: u32,
    /// Domain rules in insertion order
    pub domain_rules: Vec<DomainRule>,
    /// IP rules in insertion order
    pub ip_rules: Vec<IpRule>,
    /// App policies ordered by uid
    pub app_policies: Vec<AppPolicy>,
}

impl Snapshot {
    /// Current format version
    pub const VERSION: u32 = 1;

    /// Empty snapshot at the current version
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            ..Self::default()
        }
    }

    pub(crate) fn upsert_domain(&mut self, rule: &DomainRule) {
        match self.domain_rules.iter_mut().find(|r| r.domain == rule.domain) {
            Some(existing) => *existing = rule.clone(),
            None => self.domain_rules.push(rule.clone()),
        }
    }

    pub(crate) fn delete_domain(&mut self, rule: &DomainRule) {
        self.domain_rules
            .retain(|r| !(r.domain == rule.domain && r.kind == rule.kind));
    }

    pub(crate) fn upsert_ip(&mut self, rule: &IpRule) {
        match self
            .ip_rules
            .iter_mut()
            .find(|r| r.uid == rule.uid && r.host == rule.host)
        {
            Some(existing) => *existing = rule.clone(),
            None => self.ip_rules.push(rule.clone()),
        }
    }

    pub(crate) fn delete_ip(&mut self, uid: i32, host: &HostSpecifier) {
        self.ip_rules.retain(|r| !(r.uid == uid && r.host == *host));
    }

    pub(crate) fn delete_ip_for_uid(&mut self, uid: i32) {
        self.ip_rules.retain(|r| r.uid != uid);
    }

    pub(crate) fn upsert_app(&mut self, policy: &AppPolicy) {
        match self.app_policies.binary_search_by_key(&policy.uid, |p| p.uid) {
            Ok(i) => self.app_policies[i] = policy.clone(),
            Err(i) => self.app_policies.insert(i, policy.clone()),
        }
    }

    /// Returns `false` when no record exists for `uid`
    pub(crate) fn update_app_status(
        &mut self,
        uid: i32,
        firewall: FirewallStatus,
        connection: ConnectionStatus,
    ) -> bool {
        match self.app_policies.iter_mut().find(|p| p.uid == uid) {
            Some(policy) => {
                policy.firewall_status = firewall;
                policy.connection_status = connection;
                true
            }
            None => false,
        }
    }

    pub(crate) fn delete_app(&mut self, uid: i32) {
        self.app_policies.retain(|p| p.uid != uid);
    }
}
