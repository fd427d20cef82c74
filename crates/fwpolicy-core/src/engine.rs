//! Engine facade
//!
//! [`PolicyEngine`] owns the three stores, the background worker and the
//! repository they share. Hot-path callers use the `resolve_*` and `app_*`
//! methods; everything else goes through the mutation surface.
//!
//! Lifecycle: construct, [`PolicyEngine::load`], then optionally
//! [`install`] it as the process-wide engine. `load` must complete before the
//! first query. There is no teardown.

use crate::app::AppPolicyStore;
use crate::config::EngineConfig;
use crate::dispatch::{Completion, Dispatcher};
use crate::domain::DomainStore;
use crate::error::Result;
use crate::ip::IpStore;
use crate::persistence::{
    AppPolicyRepository, DomainRuleRepository, FileRepository, IpRuleRepository, MemoryRepository,
    PolicyRepository,
};
use crate::status::{
    ConnectionStatus, DomainKind, DomainStatus, FirewallStatus, IpRuleStatus, MatchedBy,
};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::info;

static GLOBAL: OnceCell<PolicyEngine> = OnceCell::new();

/// Install `engine` as the process-wide engine
///
/// # Errors
/// Hands the engine back if one is already installed.
pub fn install(engine: PolicyEngine) -> std::result::Result<&'static PolicyEngine, PolicyEngine> {
    GLOBAL.try_insert(engine).map_err(|(_, engine)| engine)
}

/// The process-wide engine, if one was installed
pub fn global() -> Option<&'static PolicyEngine> {
    GLOBAL.get()
}

/// Counts reported by [`PolicyEngine::load`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Domain rules loaded
    pub domain_rules: usize,
    /// IP rules loaded
    pub ip_rules: usize,
    /// App policies loaded
    pub app_policies: usize,
}

/// Network-policy resolution engine
#[derive(Debug)]
pub struct PolicyEngine {
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    domains: DomainStore,
    ips: IpStore,
    apps: AppPolicyStore,
}

impl PolicyEngine {
    /// Build an engine over `repo`; nothing is read until [`PolicyEngine::load`]
    ///
    /// # Errors
    /// Fails if the configuration is invalid or the worker cannot be spawned.
    pub fn new<R>(repo: Arc<R>, config: EngineConfig) -> Result<Self>
    where
        R: PolicyRepository + 'static,
    {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::spawn()?);

        let domain_repo: Arc<dyn DomainRuleRepository> = repo.clone();
        let ip_repo: Arc<dyn IpRuleRepository> = repo.clone();
        let app_repo: Arc<dyn AppPolicyRepository> = repo;

        let domains = DomainStore::new(
            domain_repo,
            Arc::clone(&dispatcher),
            config.cache.domain_capacity,
        );
        let ips = IpStore::new(ip_repo, Arc::clone(&dispatcher), config.cache.ip_capacity);
        let apps = AppPolicyStore::new(app_repo, Arc::clone(&dispatcher));

        Ok(Self {
            config,
            dispatcher,
            domains,
            ips,
            apps,
        })
    }

    /// Build an engine backed by the configured store
    ///
    /// Uses a [`FileRepository`] when `persistence.path` is set and a
    /// [`MemoryRepository`] otherwise.
    ///
    /// # Errors
    /// Fails if the configuration is invalid or the snapshot cannot be opened.
    pub fn open(config: EngineConfig) -> Result<Self> {
        match config.persistence.path.clone() {
            Some(path) => Self::new(Arc::new(FileRepository::open(path)?), config),
            None => Self::new(Arc::new(MemoryRepository::new()), config),
        }
    }

    /// Populate every store from the repository
    ///
    /// # Errors
    /// Propagates the first repository read error.
    pub fn load(&self) -> Result<LoadSummary> {
        let summary = LoadSummary {
            domain_rules: self.domains.load()?,
            ip_rules: self.ips.load()?,
            app_policies: self.apps.load()?,
        };
        info!(
            domains = summary.domain_rules,
            ips = summary.ip_rules,
            apps = summary.app_policies,
            "Policy engine loaded"
        );
        Ok(summary)
    }

    /// Block until every queued mutation has been applied
    ///
    /// # Errors
    /// Returns [`crate::Error::WorkerGone`] if the worker has stopped.
    pub fn flush(&self) -> Result<()> {
        self.dispatcher.flush()
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Domain rule store
    pub fn domains(&self) -> &DomainStore {
        &self.domains
    }

    /// IP rule store
    pub fn ips(&self) -> &IpStore {
        &self.ips
    }

    /// App policy store
    pub fn apps(&self) -> &AppPolicyStore {
        &self.apps
    }

    // ---- resolution ----

    /// Policy for a DNS query
    pub fn resolve_domain(&self, domain: &str) -> DomainStatus {
        self.domains.status(domain).1
    }

    /// Policy for a DNS query, with the tier that produced it
    pub fn resolve_domain_detailed(&self, domain: &str) -> (MatchedBy, DomainStatus) {
        self.domains.status(domain)
    }

    /// Policy for a connection by `uid` to `address:port`
    pub fn resolve_connection(&self, uid: i32, address: &str, port: Option<u16>) -> IpRuleStatus {
        self.ips.has_rule(uid, address, port)
    }

    /// Firewall mode of `uid`
    pub fn app_firewall_status(&self, uid: i32) -> FirewallStatus {
        self.apps.app_status(uid)
    }

    /// Networks `uid` is blocked on
    pub fn app_connection_status(&self, uid: i32) -> ConnectionStatus {
        self.apps.connection_status(uid)
    }

    /// True when the device is unlocked and `uid` is in the foreground
    pub fn is_app_foreground(&self, uid: i32) -> bool {
        self.apps.is_app_foreground(uid)
    }

    // ---- mutation ----

    /// Block `domain`
    ///
    /// # Errors
    /// Fails synchronously for an uncompilable wildcard pattern.
    pub fn block_domain(&self, domain: &str, kind: DomainKind) -> Result<Completion> {
        self.domains.block(domain, kind)
    }

    /// Whitelist `domain`
    ///
    /// # Errors
    /// Fails synchronously for an uncompilable wildcard pattern.
    pub fn whitelist_domain(&self, domain: &str, kind: DomainKind) -> Result<Completion> {
        self.domains.whitelist(domain, kind)
    }

    /// Remove the rule for `domain`, returning it to default-allow
    pub fn clear_domain_rule(&self, domain: &str, kind: DomainKind) -> Completion {
        self.domains.delete(domain, kind)
    }

    /// Block connections by `uid` to `host`
    ///
    /// # Errors
    /// Fails synchronously for an unparseable host.
    pub fn block_ip(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.ips.block(uid, host, port)
    }

    /// Let connections by `uid` to `host` skip the app's rules
    ///
    /// # Errors
    /// Fails synchronously for an unparseable host.
    pub fn bypass_app_rules_ip(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.ips.bypass_app_rules(uid, host, port)
    }

    /// Let connections by `uid` to `host` skip every rule
    ///
    /// # Errors
    /// Fails synchronously for an unparseable host.
    pub fn bypass_universal_ip(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.ips.bypass_universal(uid, host, port)
    }

    /// Remove the rule for `(uid, host, port)`
    ///
    /// # Errors
    /// Fails synchronously for an unparseable host.
    pub fn clear_ip_rule(&self, uid: i32, host: &str, port: Option<u16>) -> Result<Completion> {
        self.ips.delete(uid, host, port)
    }

    /// Set both statuses for `uid`
    pub fn update_app_policy(
        &self,
        uid: i32,
        firewall: FirewallStatus,
        connection: ConnectionStatus,
    ) -> Completion {
        self.apps.update_firewall_status(uid, firewall, connection)
    }
}
