//! JSON snapshot repository
//!
//! The whole store is one JSON document. Every write serializes the updated
//! snapshot to a sibling temp file and renames it over the original, so a
//! crash mid-write leaves the previous snapshot intact. The in-memory copy
//! only changes once the rename succeeded.

use super::{AppPolicyRepository, DomainRuleRepository, IpRuleRepository, Snapshot};
use crate::app::AppPolicy;
use crate::domain::DomainRule;
use crate::error::{Error, Result};
use crate::ip::{HostSpecifier, IpRule};
use crate::status::{ConnectionStatus, FirewallStatus};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Repository persisted to a single JSON file
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
}

impl FileRepository {
    /// Open `path`, starting empty if the file does not exist yet
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read or parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            if snapshot.version > Snapshot::VERSION {
                return Err(Error::persistence(
                    "open",
                    format!(
                        "{} has format version {}, newest supported is {}",
                        path.display(),
                        snapshot.version,
                        Snapshot::VERSION
                    ),
                ));
            }
            info!(
                path = %path.display(),
                domains = snapshot.domain_rules.len(),
                ips = snapshot.ip_rules.len(),
                apps = snapshot.app_policies.len(),
                "Opened policy store"
            );
            snapshot
        } else {
            debug!(path = %path.display(), "Policy store does not exist yet, starting empty");
            Snapshot::new()
        };

        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
        })
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of everything stored
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().clone()
    }

    fn commit<T>(&self, operation: &'static str, apply: impl FnOnce(&mut Snapshot) -> T) -> Result<T> {
        let mut current = self.snapshot.lock();
        let mut next = current.clone();
        let out = apply(&mut next);
        next.version = Snapshot::VERSION;

        self.save(&next)
            .map_err(|e| Error::persistence(operation, e.to_string()))?;
        *current = next;
        Ok(out)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DomainRuleRepository for FileRepository {
    fn all_rules(&self) -> Result<Vec<DomainRule>> {
        Ok(self.snapshot.lock().domain_rules.clone())
    }

    fn insert_or_update(&self, rule: &DomainRule) -> Result<()> {
        self.commit("domain_insert_or_update", |s| s.upsert_domain(rule))
    }

    fn delete(&self, rule: &DomainRule) -> Result<()> {
        self.commit("domain_delete", |s| s.delete_domain(rule))
    }
}

impl IpRuleRepository for FileRepository {
    fn all_rules(&self) -> Result<Vec<IpRule>> {
        Ok(self.snapshot.lock().ip_rules.clone())
    }

    fn insert_or_update(&self, rule: &IpRule) -> Result<()> {
        self.commit("ip_insert_or_update", |s| s.upsert_ip(rule))
    }

    fn delete_by_uid_and_host(&self, uid: i32, host: &HostSpecifier) -> Result<()> {
        self.commit("ip_delete", |s| s.delete_ip(uid, host))
    }

    fn delete_all_for_uid(&self, uid: i32) -> Result<()> {
        self.commit("ip_delete_uid", |s| s.delete_ip_for_uid(uid))
    }

    fn delete_all_global(&self) -> Result<()> {
        self.commit("ip_delete_all", |s| s.ip_rules.clear())
    }
}

impl AppPolicyRepository for FileRepository {
    fn all_app_policies(&self) -> Result<Vec<AppPolicy>> {
        Ok(self.snapshot.lock().app_policies.clone())
    }

    fn upsert(&self, policy: &AppPolicy) -> Result<()> {
        self.commit("app_upsert", |s| s.upsert_app(policy))
    }

    fn update_status_by_uid(
        &self,
        uid: i32,
        firewall: FirewallStatus,
        connection: ConnectionStatus,
    ) -> Result<()> {
        if self.commit("app_update_status", |s| s.update_app_status(uid, firewall, connection))? {
            Ok(())
        } else {
            Err(Error::persistence("app_update_status", format!("no policy for uid {uid}")))
        }
    }

    fn delete(&self, uid: i32) -> Result<()> {
        self.commit("app_delete", |s| s.delete_app(uid))
    }
}
