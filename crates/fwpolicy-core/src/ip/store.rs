//! IP rule store and connection resolver

use super::host::{parse_address, HostSpecifier, IndexSlot};
use super::rule::IpRule;
use crate::cache::{CacheStats, LookupCache};
use crate::dispatch::{Completion, Dispatcher};
use crate::error::Result;
use crate::persistence::IpRuleRepository;
use crate::status::IpRuleStatus;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Lookup cache key
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct ConnKey {
    addr: IpAddr,
    port: Option<u16>,
    uid: i32,
}

#[derive(Debug, Default)]
struct IpIndexes {
    exact: HashMap<(HostSpecifier, i32), IpRule>,
    /// Insertion ordered; the first covering rule wins
    wildcard: Vec<IpRule>,
}

impl IpIndexes {
    fn insert(&mut self, rule: IpRule) {
        match IndexSlot::classify(&rule.host) {
            IndexSlot::Exact => {
                self.exact.insert(rule.key(), rule);
            }
            IndexSlot::Wildcard => {
                match self.wildcard.iter_mut().find(|r| r.key() == rule.key()) {
                    Some(existing) => *existing = rule,
                    None => self.wildcard.push(rule),
                }
            }
        }
    }

    fn remove(&mut self, uid: i32, host: &HostSpecifier) -> Option<IpRule> {
        match IndexSlot::classify(host) {
            IndexSlot::Exact => self.exact.remove(&(*host, uid)),
            IndexSlot::Wildcard => {
                let pos = self
                    .wildcard
                    .iter()
                    .position(|r| r.uid == uid && r.host == *host)?;
                Some(self.wildcard.remove(pos))
            }
        }
    }

    fn remove_uid(&mut self, uid: i32) {
        self.exact.retain(|_, r| r.uid != uid);
        self.wildcard.retain(|r| r.uid != uid);
    }

    fn clear(&mut self) {
        self.exact.clear();
        self.wildcard.clear();
    }

    fn exact_status(&self, uid: i32, addr: IpAddr, port: Option<u16>) -> IpRuleStatus {
        self.exact
            .get(&(HostSpecifier::from_addr(addr, port), uid))
            .map_or(IpRuleStatus::None, |r| r.status)
    }

    fn wildcard_status(&self, uid: i32, addr: IpAddr, port: Option<u16>) -> IpRuleStatus {
        self.wildcard
            .iter()
            .find(|r| r.covers(uid, addr, port))
            .map_or(IpRuleStatus::None, |r| r.status)
    }

    fn len(&self) -> usize {
        self.exact.len() + self.wildcard.len()
    }

    fn rules(&self) -> impl Iterator<Item = &IpRule> {
        self.exact.values().chain(self.wildcard.iter())
    }
}

struct Inner {
    indexes: RwLock<IpIndexes>,
    cache: LookupCache<ConnKey, IpRuleStatus>,
    repo: Arc<dyn IpRuleRepository>,
    dispatcher: Arc<Dispatcher>,
}

/// Per-app IP rule store with a cached connection resolver
///
/// Cloning is cheap; clones share the same indexes and cache.
#[derive(Clone)]
pub struct IpStore {
    inner: Arc<Inner>,
}

impl IpStore {
    /// Create an empty store; call [`IpStore::load`] before resolving
    pub fn new(
        repo: Arc<dyn IpRuleRepository>,
        dispatcher: Arc<Dispatcher>,
        cache_capacity: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                indexes: RwLock::new(IpIndexes::default()),
                cache: LookupCache::new("ip", cache_capacity),
                repo,
                dispatcher,
            }),
        }
    }

    /// Rebuild the indexes from the repository
    ///
    /// # Errors
    /// Propagates the repository's read error; the indexes are left untouched.
    pub fn load(&self) -> Result<usize> {
        let rules = self.inner.repo.all_rules()?;
        let mut indexes = IpIndexes::default();
        for rule in rules {
            indexes.insert(rule);
        }

        let count = indexes.len();
        *self.inner.indexes.write() = indexes;
        self.inner.cache.invalidate_all();

        info!(rules = count, "Loaded IP rules");
        Ok(count)
    }

    /// Resolve the policy for a connection by `uid` to `address:port`
    ///
    /// Unparseable addresses resolve to [`IpRuleStatus::None`].
    pub fn has_rule(&self, uid: i32, address: &str, port: Option<u16>) -> IpRuleStatus {
        match parse_address(address) {
            Some(addr) => self.resolve(uid, addr, port),
            None => {
                trace!(address, "Unparseable address, no rule");
                IpRuleStatus::None
            }
        }
    }

    /// [`IpStore::has_rule`] for an already parsed address
    pub fn resolve(&self, uid: i32, addr: IpAddr, port: Option<u16>) -> IpRuleStatus {
        let key = ConnKey { addr, port, uid };
        if let Some(status) = self.inner.cache.get(&key) {
            return status;
        }

        let status = self.resolve_uncached(uid, addr, port);
        self.inner.cache.put(key, status);

        if !status.is_none() {
            debug!(uid, %addr, ?port, %status, "IP rule matched");
        }
        status
    }

    fn resolve_uncached(&self, uid: i32, addr: IpAddr, port: Option<u16>) -> IpRuleStatus {
        // The read guard must be gone before recursing.
        let status = {
            let indexes = self.inner.indexes.read();
            let exact = indexes.exact_status(uid, addr, port);
            if exact.is_none() {
                indexes.wildcard_status(uid, addr, port)
            } else {
                exact
            }
        };
        if !status.is_none() {
            return status;
        }

        if let IpAddr::V6(v6) = addr {
            if let Some(v4) = v6.to_ipv4_mapped() {
                let status = self.resolve(uid, IpAddr::V4(v4), None);
                if !status.is_none() {
                    return status;
                }
            }
        }

        if port.is_some() {
            return self.resolve(uid, addr, None);
        }

        IpRuleStatus::None
    }

    /// Exact-index lookup only: no cache, no ranges, no fallbacks
    pub fn is_ip_rule_available(&self, uid: i32, address: &str, port: Option<u16>) -> IpRuleStatus {
        parse_address(address).map_or(IpRuleStatus::None, |addr| {
            self.inner.indexes.read().exact_status(uid, addr, port)
        })
    }

    /// Block connections by `uid` to `host`
    ///
    /// # Errors
    /// Fails synchronously if `host` cannot be parsed.
    pub fn block(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.set_status(uid, host, port, IpRuleStatus::Block)
    }

    /// Let connections by `uid` to `host` skip the app's rules
    ///
    /// # Errors
    /// Fails synchronously if `host` cannot be parsed.
    pub fn bypass_app_rules(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.set_status(uid, host, port, IpRuleStatus::BypassAppRules)
    }

    /// Let connections by `uid` to `host` skip every firewall rule
    ///
    /// # Errors
    /// Fails synchronously if `host` cannot be parsed.
    pub fn bypass_universal(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.set_status(uid, host, port, IpRuleStatus::BypassUniversal)
    }

    /// Keep the rule but set it to `NONE`
    ///
    /// # Errors
    /// Fails synchronously if `host` cannot be parsed.
    pub fn no_rule(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.set_status(uid, host, port, IpRuleStatus::None)
    }

    /// Insert or replace a rule
    ///
    /// Persists, updates the index and invalidates the cache on the
    /// background worker. If persisting fails the rule is not applied.
    pub fn upsert(&self, rule: IpRule) -> Completion {
        let inner = Arc::clone(&self.inner);

        self.inner.dispatcher.submit("ip_upsert", move || {
            if let Err(e) = inner.repo.insert_or_update(&rule) {
                warn!(uid = rule.uid, host = %rule.host, "IP rule not applied: {}", e);
                return;
            }
            debug!(uid = rule.uid, host = %rule.host, status = %rule.status, "IP rule stored");
            inner.indexes.write().insert(rule);
            inner.cache.invalidate_all();
        })
    }

    /// Remove the rule for `(uid, host, port)`; absent rules are a no-op
    ///
    /// # Errors
    /// Fails synchronously if `host` cannot be parsed.
    pub fn delete(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        let host = HostSpecifier::parse(host, port)?;
        let inner = Arc::clone(&self.inner);

        Ok(self.inner.dispatcher.submit("ip_delete", move || {
            if let Err(e) = inner.repo.delete_by_uid_and_host(uid, &host) {
                warn!(uid, %host, "IP rule not deleted: {}", e);
                return;
            }
            inner.indexes.write().remove(uid, &host);
            inner.cache.invalidate_all();
            debug!(uid, %host, "IP rule deleted");
        }))
    }

    /// Remove every rule scoped to `uid`
    pub fn delete_for_uid(&self, uid: i32) -> Completion {
        let inner = Arc::clone(&self.inner);

        self.inner.dispatcher.submit("ip_delete_uid", move || {
            if let Err(e) = inner.repo.delete_all_for_uid(uid) {
                warn!(uid, "IP rules not deleted: {}", e);
                return;
            }
            inner.indexes.write().remove_uid(uid);
            inner.cache.invalidate_all();
            info!(uid, "Deleted all IP rules for uid");
        })
    }

    /// Remove every rule
    pub fn delete_all(&self) -> Completion {
        let inner = Arc::clone(&self.inner);

        self.inner.dispatcher.submit("ip_delete_all", move || {
            if let Err(e) = inner.repo.delete_all_global() {
                warn!("IP rules not deleted: {}", e);
                return;
            }
            inner.indexes.write().clear();
            inner.cache.invalidate_all();
            info!("Deleted all IP rules");
        })
    }

    /// Snapshot of every rule, ordered by uid then host
    pub fn rules(&self) -> Vec<IpRule> {
        let mut rules: Vec<IpRule> = self.inner.indexes.read().rules().cloned().collect();
        rules.sort_by_key(|r| (r.uid, r.host));
        rules
    }

    /// Snapshot of the rules scoped to `uid`
    pub fn rules_for_uid(&self, uid: i32) -> Vec<IpRule> {
        self.rules().into_iter().filter(|r| r.uid == uid).collect()
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.inner.indexes.read().len()
    }

    /// True when no rules are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache hit/miss counters
    pub fn cache_stats(&self) -> &CacheStats {
        self.inner.cache.stats()
    }

    fn set_status(
        &self,
        uid: i32,
        host: &str,
        port: Option<u16>,
        status: IpRuleStatus,
    ) -> Result<Completion> {
        let host = HostSpecifier::parse(host, port)?;
        Ok(self.upsert(IpRule::new(uid, host, status)))
    }
}

impl std::fmt::Debug for IpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpStore")
            .field("rules", &self.len())
            .field("cache", &self.inner.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryRepository, MockIpRuleRepository};
    use mockall::predicate::*;

    fn store() -> IpStore {
        let dispatcher = Arc::new(Dispatcher::spawn().unwrap());
        IpStore::new(Arc::new(MemoryRepository::new()), dispatcher, 128)
    }

    #[test]
    fn test_classification_routes_rules() {
        let store = store();
        store.block(1, "1.2.3.4", None).unwrap().wait().unwrap();
        store.block(1, "10.0.0.0/8", None).unwrap().wait().unwrap();
        store.block(1, "::", None).unwrap().wait().unwrap();

        let indexes = store.inner.indexes.read();
        assert_eq!(indexes.exact.len(), 1);
        assert_eq!(indexes.wildcard.len(), 2);
    }

    #[test]
    fn test_upsert_replaces_wildcard_in_place() {
        let store = store();
        store.block(1, "10.0.0.0/8", None).unwrap().wait().unwrap();
        store.bypass_universal(1, "10.0.0.0/8", None).unwrap().wait().unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.has_rule(1, "10.1.1.1", None), IpRuleStatus::BypassUniversal);
    }

    #[test]
    fn test_is_ip_rule_available_ignores_ranges() {
        let store = store();
        store.block(3, "10.0.0.0/8", None).unwrap().wait().unwrap();
        store.block(3, "1.1.1.1", Some(53)).unwrap().wait().unwrap();

        assert_eq!(store.is_ip_rule_available(3, "10.0.0.1", None), IpRuleStatus::None);
        assert_eq!(store.is_ip_rule_available(3, "1.1.1.1", Some(53)), IpRuleStatus::Block);
        assert_eq!(store.is_ip_rule_available(3, "1.1.1.1", None), IpRuleStatus::None);
    }

    #[test]
    fn test_unparseable_address() {
        let store = store();
        assert_eq!(store.has_rule(0, "example.com", Some(443)), IpRuleStatus::None);
        assert!(store.block(0, "example.com", None).is_err());
    }

    #[test]
    fn test_delete_for_uid() {
        let store = store();
        store.block(1, "1.2.3.4", None).unwrap();
        store.block(1, "10.0.0.0/8", None).unwrap();
        store.block(2, "1.2.3.4", None).unwrap();
        store.delete_for_uid(1).wait().unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.rules_for_uid(2).len(), 1);
    }

    #[test]
    fn test_delete_passes_port_to_repository() {
        let mut repo = MockIpRuleRepository::new();
        repo.expect_delete_by_uid_and_host()
            .with(eq(5), function(|h: &HostSpecifier| h.port() == Some(443)))
            .times(1)
            .returning(|_, _| Ok(()));

        let dispatcher = Arc::new(Dispatcher::spawn().unwrap());
        let store = IpStore::new(Arc::new(repo), dispatcher, 16);

        store.delete(5, "1.2.3.4", Some(443)).unwrap().wait().unwrap();
    }
}
