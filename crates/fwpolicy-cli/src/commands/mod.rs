//! CLI commands

pub mod app;
pub mod completions;
pub mod config;
pub mod domain;
pub mod ip;
pub mod resolve;

use anyhow::{Context, Result};
use clap::Subcommand;
use fwpolicy_core::{EngineConfig, PolicyEngine};
use std::path::PathBuf;
use tracing::debug;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a domain or a connection against the stored rules
    Resolve(resolve::ResolveArgs),

    /// Domain rule management
    Domain(domain::DomainArgs),

    /// Per-app IP rule management
    Ip(ip::IpArgs),

    /// Per-app policy management
    App(app::AppArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Where the engine's configuration and store come from
#[derive(Debug, Clone)]
pub struct EngineSource {
    /// Explicit config file
    pub config: Option<PathBuf>,
    /// Explicit store file
    pub store: Option<PathBuf>,
}

impl EngineSource {
    /// Load the explicit config, a discovered one, or the defaults
    pub fn load_config(&self) -> Result<EngineConfig> {
        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => config::find_config_file(),
        };

        let mut config = match path {
            Some(path) => EngineConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(store) = &self.store {
            config.persistence.path = Some(store.clone());
        }
        Ok(config)
    }

    /// Open and load the engine over the resolved store
    pub fn open(&self) -> Result<PolicyEngine> {
        let mut config = self.load_config()?;
        if config.persistence.path.is_none() {
            config.persistence.path = Some(
                default_store_path().context("No store location; pass --store or set persistence.path")?,
            );
        }

        let store = config.persistence.path.clone().unwrap_or_default();
        debug!(store = %store.display(), "Opening policy store");

        let engine = PolicyEngine::open(config)
            .with_context(|| format!("Failed to open policy store {}", store.display()))?;
        engine.load().context("Failed to load policy store")?;
        Ok(engine)
    }
}

/// Per-user store location
pub fn default_store_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "fwpolicy").map(|dirs| dirs.data_dir().join("store.json"))
}

/// Wait for queued mutations so the snapshot is on disk before exit
pub fn settle(engine: &PolicyEngine) -> Result<()> {
    engine.flush().context("Background writer stopped before settling")
}
