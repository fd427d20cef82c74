//! # fwpolicy Core
//!
//! Policy resolution for a per-app VPN firewall.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Domain resolver** - exact, public suffix and wildcard rules for DNS queries
//! - **Connection resolver** - per-app address, subnet and port rules
//! - **App policies** - per-app firewall modes and the foreground overlay
//! - **Persistence** - repository traits plus memory and JSON-file backends
//! - **Configuration** - TOML configuration for cache sizing and storage
//!
//! Lookups are synchronous and never fail; anything without a rule resolves
//! to the default-allow status. Mutations are applied by a background worker.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fwpolicy_core::{DomainKind, DomainStatus, EngineConfig, PolicyEngine};
//!
//! let engine = PolicyEngine::open(EngineConfig::load("fwpolicy.toml")?)?;
//! engine.load()?;
//!
//! engine.block_domain("ru", DomainKind::Tld)?;
//! engine.flush()?;
//!
//! assert_eq!(engine.resolve_domain("anything.ru"), DomainStatus::Block);
//! # Ok::<(), fwpolicy_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ip;
pub mod persistence;
pub mod status;

// Re-exports for convenience
pub use app::{AppPolicy, AppPolicyStore, DeviceLock, ManualDeviceLock};
pub use config::EngineConfig;
pub use dispatch::{Completion, Dispatcher};
pub use domain::{DomainRule, DomainStore};
pub use engine::{LoadSummary, PolicyEngine};
pub use error::{Error, Result};
pub use ip::{HostSpecifier, IpRule, IpStore};
pub use persistence::{FileRepository, MemoryRepository, PolicyRepository};
pub use status::{
    ConnectionStatus, DomainKind, DomainStatus, FirewallStatus, IpRuleStatus, MatchedBy,
};

/// Milliseconds since the Unix epoch, 0 if the clock is before it
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
