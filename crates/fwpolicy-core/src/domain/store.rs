//! Domain rule store and resolver

use super::rule::{normalize_domain, normalize_for_kind, DomainRule};
use super::suffix::public_suffix;
use super::wildcard::WildcardPattern;
use crate::cache::{CacheStats, LookupCache};
use crate::dispatch::{Completion, Dispatcher};
use crate::error::Result;
use crate::persistence::DomainRuleRepository;
use crate::status::{DomainKind, DomainStatus, MatchedBy};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A rule ready to be filed, with its wildcard pattern already compiled
#[derive(Debug, Clone)]
enum Filed {
    Exact(DomainRule),
    Tld(DomainRule),
    Wildcard(DomainRule, WildcardPattern),
}

impl Filed {
    /// The only way into [`DomainIndexes`]; the index is picked by kind
    fn prepare(rule: DomainRule) -> Result<Self> {
        Ok(match rule.kind {
            DomainKind::Exact => Self::Exact(rule),
            DomainKind::Tld => Self::Tld(rule),
            DomainKind::Wildcard => {
                let pattern = WildcardPattern::compile(&rule.domain)?;
                Self::Wildcard(rule, pattern)
            }
        })
    }
}

#[derive(Debug, Default)]
struct DomainIndexes {
    exact: HashMap<String, DomainRule>,
    tld: HashMap<String, DomainRule>,
    /// Insertion ordered; the first matching pattern wins
    wildcard: Vec<(DomainRule, WildcardPattern)>,
}

impl DomainIndexes {
    fn insert(&mut self, filed: Filed) {
        // A domain lives in exactly one index, whatever kind it had before.
        let (domain, kind) = match &filed {
            Filed::Exact(r) | Filed::Tld(r) | Filed::Wildcard(r, _) => (r.domain.clone(), r.kind),
        };
        for other in DomainKind::ALL.iter().filter(|k| **k != kind) {
            self.remove(&domain, *other);
        }

        match filed {
            Filed::Exact(rule) => {
                self.exact.insert(domain, rule);
            }
            Filed::Tld(rule) => {
                self.tld.insert(domain, rule);
            }
            // Replaced in place so the first-match order survives a re-save.
            Filed::Wildcard(rule, pattern) => {
                match self.wildcard.iter_mut().find(|(r, _)| r.domain == domain) {
                    Some(existing) => *existing = (rule, pattern),
                    None => self.wildcard.push((rule, pattern)),
                }
            }
        }
    }

    fn remove(&mut self, domain: &str, kind: DomainKind) -> Option<DomainRule> {
        match kind {
            DomainKind::Exact => self.exact.remove(domain),
            DomainKind::Tld => self.tld.remove(domain),
            DomainKind::Wildcard => {
                let pos = self.wildcard.iter().position(|(r, _)| r.domain == domain)?;
                Some(self.wildcard.remove(pos).0)
            }
        }
    }

    fn get(&self, domain: &str, kind: DomainKind) -> Option<&DomainRule> {
        match kind {
            DomainKind::Exact => self.exact.get(domain),
            DomainKind::Tld => self.tld.get(domain),
            DomainKind::Wildcard => self
                .wildcard
                .iter()
                .map(|(r, _)| r)
                .find(|r| r.domain == domain),
        }
    }

    fn resolve(&self, domain: &str) -> (MatchedBy, DomainStatus) {
        if let Some(rule) = self.exact.get(domain) {
            if !rule.status.is_none() {
                return (MatchedBy::Domain, rule.status);
            }
        }

        if let Some(suffix) = public_suffix(domain) {
            if let Some(rule) = self.tld.get(suffix) {
                if !rule.status.is_none() {
                    return (MatchedBy::Tld, rule.status);
                }
            }
        }

        let status = self
            .wildcard
            .iter()
            .find(|(_, pattern)| pattern.matches(domain))
            .map_or(DomainStatus::None, |(rule, _)| rule.status);

        (MatchedBy::Wildcard, status)
    }

    fn len(&self) -> usize {
        self.exact.len() + self.tld.len() + self.wildcard.len()
    }

    fn rules(&self) -> impl Iterator<Item = &DomainRule> {
        self.exact
            .values()
            .chain(self.tld.values())
            .chain(self.wildcard.iter().map(|(r, _)| r))
    }
}

struct Inner {
    indexes: RwLock<DomainIndexes>,
    cache: LookupCache<String, DomainStatus>,
    repo: Arc<dyn DomainRuleRepository>,
    dispatcher: Arc<Dispatcher>,
}

/// Domain rule store with a cached resolver
///
/// Cloning is cheap; clones share the same indexes and cache.
#[derive(Clone)]
pub struct DomainStore {
    inner: Arc<Inner>,
}

impl DomainStore {
    /// Create an empty store; call [`DomainStore::load`] before resolving
    pub fn new(
        repo: Arc<dyn DomainRuleRepository>,
        dispatcher: Arc<Dispatcher>,
        cache_capacity: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                indexes: RwLock::new(DomainIndexes::default()),
                cache: LookupCache::new("domain", cache_capacity),
                repo,
                dispatcher,
            }),
        }
    }

    /// Rebuild the indexes from the repository
    ///
    /// Rules with an uncompilable wildcard pattern are skipped with a warning.
    ///
    /// # Errors
    /// Propagates the repository's read error; the indexes are left untouched.
    pub fn load(&self) -> Result<usize> {
        let rules = self.inner.repo.all_rules()?;
        let mut indexes = DomainIndexes::default();

        for rule in rules {
            match Filed::prepare(rule) {
                Ok(filed) => indexes.insert(filed),
                Err(e) => warn!("Skipping stored domain rule: {}", e),
            }
        }

        let count = indexes.len();
        *self.inner.indexes.write() = indexes;
        self.inner.cache.invalidate_all();

        info!(rules = count, "Loaded domain rules");
        Ok(count)
    }

    /// Resolve the policy for `domain`
    ///
    /// Never fails: malformed input and unknown domains resolve to
    /// [`DomainStatus::None`].
    pub fn status(&self, domain: &str) -> (MatchedBy, DomainStatus) {
        if let Some(status) = self.inner.cache.get(&domain.to_string()) {
            return (MatchedBy::Cache, status);
        }

        let normalized = normalize_domain(domain);
        let (matched_by, status) = self.inner.indexes.read().resolve(&normalized);
        self.inner.cache.put(domain.to_string(), status);

        if !status.is_none() {
            debug!(domain, ?matched_by, %status, "Domain rule matched");
        }
        (matched_by, status)
    }

    /// Block `domain`
    ///
    /// # Errors
    /// Fails synchronously if a wildcard pattern cannot be compiled.
    pub fn block(&self, domain: &str, kind: DomainKind) -> Result<Completion> {
        self.set_status(domain, kind, DomainStatus::Block)
    }

    /// Whitelist `domain`
    ///
    /// # Errors
    /// Fails synchronously if a wildcard pattern cannot be compiled.
    pub fn whitelist(&self, domain: &str, kind: DomainKind) -> Result<Completion> {
        self.set_status(domain, kind, DomainStatus::Whitelist)
    }

    /// Keep the rule but set it to `NONE`
    ///
    /// # Errors
    /// Fails synchronously if a wildcard pattern cannot be compiled.
    pub fn no_rule(&self, domain: &str, kind: DomainKind) -> Result<Completion> {
        self.set_status(domain, kind, DomainStatus::None)
    }

    /// Insert or replace a rule
    ///
    /// Persists, updates the index and invalidates the cache on the
    /// background worker. If persisting fails the rule is not applied.
    ///
    /// # Errors
    /// Fails synchronously if a wildcard pattern cannot be compiled.
    pub fn upsert(&self, rule: DomainRule) -> Result<Completion> {
        let filed = Filed::prepare(rule.clone())?;
        let inner = Arc::clone(&self.inner);

        Ok(self.inner.dispatcher.submit("domain_upsert", move || {
            if let Err(e) = inner.repo.insert_or_update(&rule) {
                warn!(domain = %rule.domain, "Domain rule not applied: {}", e);
                return;
            }
            inner.indexes.write().insert(filed);
            inner.cache.invalidate_all();
            debug!(domain = %rule.domain, kind = %rule.kind, status = %rule.status, "Domain rule stored");
        }))
    }

    /// Remove a rule; removing an absent rule is a no-op
    pub fn delete(&self, domain: &str, kind: DomainKind) -> Completion {
        let domain = normalize_for_kind(domain, kind);
        let rule = self
            .get(&domain, kind)
            .unwrap_or_else(|| DomainRule::new(&domain, kind, DomainStatus::None));
        let inner = Arc::clone(&self.inner);

        self.inner.dispatcher.submit("domain_delete", move || {
            if let Err(e) = inner.repo.delete(&rule) {
                warn!(domain = %rule.domain, "Domain rule not deleted: {}", e);
                return;
            }
            inner.indexes.write().remove(&rule.domain, rule.kind);
            inner.cache.invalidate_all();
            debug!(domain = %rule.domain, kind = %rule.kind, "Domain rule deleted");
        })
    }

    /// Remove every rule
    pub fn delete_all(&self) -> Completion {
        let inner = Arc::clone(&self.inner);

        self.inner.dispatcher.submit("domain_delete_all", move || {
            let rules: Vec<DomainRule> = inner.indexes.read().rules().cloned().collect();
            let mut indexes_changed = false;

            for rule in rules {
                match inner.repo.delete(&rule) {
                    Ok(()) => {
                        inner.indexes.write().remove(&rule.domain, rule.kind);
                        indexes_changed = true;
                    }
                    Err(e) => warn!(domain = %rule.domain, "Domain rule not deleted: {}", e),
                }
            }

            if indexes_changed {
                inner.cache.invalidate_all();
            }
        })
    }

    /// Look up a stored rule by its normalised domain and kind
    pub fn get(&self, domain: &str, kind: DomainKind) -> Option<DomainRule> {
        let domain = normalize_for_kind(domain, kind);
        self.inner.indexes.read().get(&domain, kind).cloned()
    }

    /// Snapshot of every rule, sorted by domain
    pub fn rules(&self) -> Vec<DomainRule> {
        let mut rules: Vec<DomainRule> = self.inner.indexes.read().rules().cloned().collect();
        rules.sort_by(|a, b| a.domain.cmp(&b.domain));
        rules
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

    fn set_status(&self, domain: &str, kind: DomainKind, status: DomainStatus) -> Result<Completion> {
        let rule = match self.get(domain, kind) {
            Some(existing) => existing.with_status(status),
            None => DomainRule::new(domain, kind, status),
        };
        self.upsert(rule)
    }
}

impl std::fmt::Debug for DomainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainStore")
            .field("rules", &self.len())
            .field("cache", &self.inner.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryRepository, MockDomainRuleRepository};
    use mockall::predicate::*;

    fn store() -> DomainStore {
        let dispatcher = Arc::new(Dispatcher::spawn().unwrap());
        DomainStore::new(Arc::new(MemoryRepository::new()), dispatcher, 128)
    }

    #[test]
    fn test_kind_change_keeps_indexes_disjoint() {
        let store = store();
        store.block("ads.com", DomainKind::Exact).unwrap().wait().unwrap();
        store.block("ads.com", DomainKind::Tld).unwrap().wait().unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get("ads.com", DomainKind::Exact).is_none());
        assert!(store.get("ads.com", DomainKind::Tld).is_some());
    }

    #[test]
    fn test_none_status_falls_through() {
        let store = store();
        store.no_rule("x.example.com", DomainKind::Exact).unwrap().wait().unwrap();
        store.block("*.example.com", DomainKind::Wildcard).unwrap().wait().unwrap();

        assert_eq!(
            store.status("x.example.com"),
            (MatchedBy::Wildcard, DomainStatus::Block)
        );
    }

    #[test]
    fn test_first_wildcard_wins() {
        let store = store();
        store.whitelist("*.cdn.example.com", DomainKind::Wildcard).unwrap().wait().unwrap();
        store.block("*.example.com", DomainKind::Wildcard).unwrap().wait().unwrap();

        assert_eq!(store.status("a.cdn.example.com").1, DomainStatus::Whitelist);
        assert_eq!(store.status("a.example.com").1, DomainStatus::Block);
    }

    #[test]
    fn test_resaving_wildcard_keeps_its_position() {
        let store = store();
        store.whitelist("*.a.example.com", DomainKind::Wildcard).unwrap().wait().unwrap();
        store.block("*.example.com", DomainKind::Wildcard).unwrap().wait().unwrap();
        store.whitelist("*.a.example.com", DomainKind::Wildcard).unwrap().wait().unwrap();

        assert_eq!(store.status("x.a.example.com").1, DomainStatus::Whitelist);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_invalid_pattern_rejected_synchronously() {
        let store = store();
        assert!(store.block("", DomainKind::Wildcard).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_second_lookup_served_from_cache() {
        let store = store();
        assert_eq!(store.status("nothing.com"), (MatchedBy::Wildcard, DomainStatus::None));
        assert_eq!(store.status("nothing.com"), (MatchedBy::Cache, DomainStatus::None));
        assert_eq!(store.cache_stats().hits(), 1);
    }

    #[test]
    fn test_persist_failure_leaves_rule_unapplied() {
        let mut repo = MockDomainRuleRepository::new();
        repo.expect_insert_or_update()
            .times(1)
            .returning(|_| Err(crate::Error::persistence("insert_or_update", "read-only")));

        let dispatcher = Arc::new(Dispatcher::spawn().unwrap());
        let store = DomainStore::new(Arc::new(repo), dispatcher, 16);

        store.block("x.com", DomainKind::Exact).unwrap().wait().unwrap();
        assert_eq!(store.status("x.com").1, DomainStatus::None);
    }

    #[test]
    fn test_delete_calls_repository() {
        let mut repo = MockDomainRuleRepository::new();
        repo.expect_delete()
            .with(function(|r: &DomainRule| r.domain == "gone.com" && r.kind == DomainKind::Exact))
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = Arc::new(Dispatcher::spawn().unwrap());
        let store = DomainStore::new(Arc::new(repo), dispatcher, 16);

        store.delete("Gone.com", DomainKind::Exact).wait().unwrap();
        assert!(store.is_empty());
    }
}
