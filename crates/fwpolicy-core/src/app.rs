//! Per-app policies and the foreground overlay
//!
//! Unlike the rule stores there is no lookup cache here: the policy map is
//! read directly under its lock. Mutations update the map on the caller's
//! thread, queue the durable write and publish the new app list to
//! subscribers.
//!
//! An app with no stored policy is [`FirewallStatus::Untracked`] and
//! [`ConnectionStatus::Allow`]. `Untracked` is never stored: setting it
//! removes the policy.

use crate::dispatch::{Completion, Dispatcher};
use crate::error::Result;
use crate::persistence::AppPolicyRepository;
use crate::status::{ConnectionStatus, FirewallStatus};
use dashmap::DashSet;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Stored policy for one app identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPolicy {
    /// App identity
    pub uid: i32,
    /// Package name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Human readable name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Firewall mode
    pub firewall_status: FirewallStatus,
    /// Networks the app is blocked on
    pub connection_status: ConnectionStatus,
}

impl AppPolicy {
    /// Regular firewalling, allowed on every network
    pub fn new(uid: i32) -> Self {
        Self {
            uid,
            package_name: None,
            app_name: None,
            firewall_status: FirewallStatus::None,
            connection_status: ConnectionStatus::Allow,
        }
    }

    /// Same policy with the given statuses
    #[must_use]
    pub fn with_status(mut self, firewall: FirewallStatus, connection: ConnectionStatus) -> Self {
        self.firewall_status = firewall;
        self.connection_status = connection;
        self
    }

    /// Same policy with package and display names
    #[must_use]
    pub fn with_names(mut self, package_name: impl Into<String>, app_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self.app_name = Some(app_name.into());
        self
    }
}

/// Probe for the device lock state
pub trait DeviceLock: Send + Sync {
    /// True while the device is locked
    fn is_locked(&self) -> bool;
}

/// Device lock state set by the embedder
#[derive(Debug, Default)]
pub struct ManualDeviceLock {
    locked: AtomicBool,
}

impl ManualDeviceLock {
    /// Start unlocked
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lock or unlock
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Relaxed);
    }
}

impl DeviceLock for ManualDeviceLock {
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

struct Inner {
    policies: RwLock<HashMap<i32, AppPolicy>>,
    foreground: DashSet<i32>,
    device_lock: RwLock<Arc<dyn DeviceLock>>,
    repo: Arc<dyn AppPolicyRepository>,
    dispatcher: Arc<Dispatcher>,
    published: watch::Sender<Vec<AppPolicy>>,
}

enum Write {
    Upsert(AppPolicy),
    UpdateStatus(i32, FirewallStatus, ConnectionStatus),
    Delete(i32),
}

/// App policy store
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct AppPolicyStore {
    inner: Arc<Inner>,
}

impl AppPolicyStore {
    /// Create an empty store; call [`AppPolicyStore::load`] before querying
    pub fn new(repo: Arc<dyn AppPolicyRepository>, dispatcher: Arc<Dispatcher>) -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                policies: RwLock::new(HashMap::new()),
                foreground: DashSet::new(),
                device_lock: RwLock::new(Arc::new(ManualDeviceLock::new())),
                repo,
                dispatcher,
                published,
            }),
        }
    }

    /// Replace the map with the repository's contents
    ///
    /// # Errors
    /// Propagates the repository's read error; the map is left untouched.
    pub fn load(&self) -> Result<usize> {
        let policies = self.inner.repo.all_app_policies()?;
        let mut map = HashMap::with_capacity(policies.len());

        for policy in policies {
            if policy.firewall_status == FirewallStatus::Untracked {
                warn!(uid = policy.uid, "Skipping stored app policy with untracked status");
                continue;
            }
            map.insert(policy.uid, policy);
        }

        let count = map.len();
        *self.inner.policies.write() = map;
        self.publish();

        info!(apps = count, "Loaded app policies");
        Ok(count)
    }

    /// Firewall mode for `uid`, [`FirewallStatus::Untracked`] if unknown
    pub fn app_status(&self, uid: i32) -> FirewallStatus {
        self.inner
            .policies
            .read()
            .get(&uid)
            .map_or(FirewallStatus::Untracked, |p| p.firewall_status)
    }

    /// Blocked networks for `uid`, [`ConnectionStatus::Allow`] if unknown
    pub fn connection_status(&self, uid: i32) -> ConnectionStatus {
        self.inner
            .policies
            .read()
            .get(&uid)
            .map_or(ConnectionStatus::Allow, |p| p.connection_status)
    }

    /// True when `uid` is blocked on at least one network type
    pub fn is_uid_firewalled(&self, uid: i32) -> bool {
        self.connection_status(uid) != ConnectionStatus::Allow
    }

    /// True when `uid` is excluded from the tunnel
    pub fn is_excluded(&self, uid: i32) -> bool {
        self.app_status(uid) == FirewallStatus::Exclude
    }

    /// True when `uid` is isolated
    pub fn is_isolated(&self, uid: i32) -> bool {
        self.app_status(uid) == FirewallStatus::Isolate
    }

    /// True when `uid`'s DNS queries skip the DNS firewall
    pub fn bypasses_dns_firewall(&self, uid: i32) -> bool {
        self.app_status(uid) == FirewallStatus::BypassDnsFirewall
    }

    /// True when `uid` bypasses every firewall rule
    pub fn is_bypass_universal(&self, uid: i32) -> bool {
        self.app_status(uid) == FirewallStatus::BypassUniversal
    }

    /// Stored policy for `uid`
    pub fn get(&self, uid: i32) -> Option<AppPolicy> {
        self.inner.policies.read().get(&uid).cloned()
    }

    /// Every stored policy, ordered by uid
    pub fn apps(&self) -> Vec<AppPolicy> {
        sorted(&self.inner.policies.read())
    }

    /// Stored policies with the given firewall mode, ordered by uid
    pub fn apps_with_status(&self, status: FirewallStatus) -> Vec<AppPolicy> {
        self.apps()
            .into_iter()
            .filter(|p| p.firewall_status == status)
            .collect()
    }

    /// Number of stored policies
    pub fn len(&self) -> usize {
        self.inner.policies.read().len()
    }

    /// True when no policies are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the full app list; the receiver sees the latest list on every
    /// change
    pub fn subscribe(&self) -> watch::Receiver<Vec<AppPolicy>> {
        self.inner.published.subscribe()
    }

    /// Set the networks `uid` is blocked on, keeping its firewall mode
    ///
    /// Unknown uids get a policy with regular firewalling.
    pub fn update_firewalled_apps(&self, uid: i32, connection: ConnectionStatus) -> Completion {
        let write = {
            let mut policies = self.inner.policies.write();
            match policies.get_mut(&uid) {
                Some(policy) => {
                    policy.connection_status = connection;
                    Write::UpdateStatus(uid, policy.firewall_status, connection)
                }
                None => {
                    let policy = AppPolicy::new(uid).with_status(FirewallStatus::None, connection);
                    policies.insert(uid, policy.clone());
                    Write::Upsert(policy)
                }
            }
        };
        self.commit(write)
    }

    /// Set both statuses for `uid`
    ///
    /// [`FirewallStatus::Untracked`] removes the policy.
    pub fn update_firewall_status(
        &self,
        uid: i32,
        firewall: FirewallStatus,
        connection: ConnectionStatus,
    ) -> Completion {
        if firewall == FirewallStatus::Untracked {
            return self.remove(uid);
        }

        let write = {
            let mut policies = self.inner.policies.write();
            match policies.get_mut(&uid) {
                Some(policy) => {
                    policy.firewall_status = firewall;
                    policy.connection_status = connection;
                    Write::UpdateStatus(uid, firewall, connection)
                }
                None => {
                    let policy = AppPolicy::new(uid).with_status(firewall, connection);
                    policies.insert(uid, policy.clone());
                    Write::Upsert(policy)
                }
            }
        };
        self.commit(write)
    }

    /// Store a full record, metadata included
    ///
    /// A record with [`FirewallStatus::Untracked`] removes the policy.
    pub fn upsert(&self, policy: AppPolicy) -> Completion {
        if policy.firewall_status == FirewallStatus::Untracked {
            return self.remove(policy.uid);
        }
        self.inner.policies.write().insert(policy.uid, policy.clone());
        self.commit(Write::Upsert(policy))
    }

    /// Forget `uid`; it reads as untracked afterwards
    pub fn remove(&self, uid: i32) -> Completion {
        self.inner.policies.write().remove(&uid);
        self.commit(Write::Delete(uid))
    }

    /// Mark `uid` as being in the foreground
    pub fn track_foreground(&self, uid: i32) {
        self.inner.foreground.insert(uid);
    }

    /// Mark `uid` as no longer in the foreground
    pub fn untrack_foreground(&self, uid: i32) {
        self.inner.foreground.remove(&uid);
    }

    /// Forget every foreground app
    pub fn clear_foreground(&self) {
        self.inner.foreground.clear();
    }

    /// Install the probe consulted by [`AppPolicyStore::is_app_foreground`]
    pub fn set_device_lock(&self, lock: Arc<dyn DeviceLock>) {
        *self.inner.device_lock.write() = lock;
    }

    /// True when the device is unlocked and `uid` is tracked as foreground
    pub fn is_app_foreground(&self, uid: i32) -> bool {
        !self.inner.device_lock.read().is_locked() && self.inner.foreground.contains(&uid)
    }

    fn commit(&self, write: Write) -> Completion {
        let repo = Arc::clone(&self.inner.repo);
        let completion = self.inner.dispatcher.submit("app_write", move || {
            let (uid, result) = match &write {
                Write::Upsert(policy) => (policy.uid, repo.upsert(policy)),
                Write::UpdateStatus(uid, firewall, connection) => {
                    (*uid, repo.update_status_by_uid(*uid, *firewall, *connection))
                }
                Write::Delete(uid) => (*uid, repo.delete(*uid)),
            };
            match result {
                Ok(()) => debug!(uid, "App policy persisted"),
                Err(e) => warn!(uid, "App policy not persisted: {}", e),
            }
        });
        self.publish();
        completion
    }

    fn publish(&self) {
        let apps = self.apps();
        self.inner.published.send_replace(apps);
    }
}

fn sorted(policies: &HashMap<i32, AppPolicy>) -> Vec<AppPolicy> {
    let mut apps: Vec<AppPolicy> = policies.values().cloned().collect();
    apps.sort_by_key(|p| p.uid);
    apps
}

impl std::fmt::Debug for AppPolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppPolicyStore")
            .field("apps", &self.len())
            .field("foreground", &self.inner.foreground.len())
            .finish()
    }
}
