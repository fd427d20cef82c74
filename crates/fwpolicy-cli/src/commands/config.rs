//! Config command - configuration management

use super::{default_store_path, EngineSource};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use fwpolicy_core::EngineConfig;
use std::path::PathBuf;
use tracing::info;

const PROJECT: &str = "fwpolicy";

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Generate a configuration file with the defaults
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "fwpolicy.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate
        file: PathBuf,
    },

    /// Show config and store file locations
    Paths,
}

/// Execute config command
pub fn execute(args: ConfigArgs, source: &EngineSource) -> Result<()> {
    match args.action {
        ConfigAction::Show => show_config(source),
        ConfigAction::Generate { output, force } => generate_config(&output, force),
        ConfigAction::Validate { file } => validate_config(&file),
        ConfigAction::Paths => {
            show_paths();
            Ok(())
        }
    }
}

fn show_config(source: &EngineSource) -> Result<()> {
    let config = source.load_config()?;
    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

fn generate_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", output.display());
    }

    let toml_str = EngineConfig::default()
        .to_toml()
        .context("Failed to serialize config")?;

    let content = format!(
        "# fwpolicy configuration\n\
         # Every key is optional; missing keys take the values below.\n\
         # Set persistence.path to choose where rules are stored.\n\n\
         {toml_str}"
    );

    std::fs::write(output, content)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;

    info!("Generated config file: {}", output.display());
    println!("Configuration file generated: {}", output.display());
    Ok(())
}

fn validate_config(file: &PathBuf) -> Result<()> {
    let config = EngineConfig::load(file)
        .with_context(|| format!("Failed to load config from {}", file.display()))?;

    config.validate().context("Configuration validation failed")?;

    println!("✓ Configuration is valid");
    println!("  Domain cache: {} entries", config.cache.domain_capacity);
    println!("  IP cache: {} entries", config.cache.ip_capacity);
    match &config.persistence.path {
        Some(path) => println!("  Store: {}", path.display()),
        None => println!("  Store: (default)"),
    }
    println!("  Log level: {}", config.logging.level);

    Ok(())
}

fn show_paths() {
    println!("Configuration file search paths:");
    println!();
    println!("  1. ./fwpolicy.toml");
    if let Some(dirs) = directories::ProjectDirs::from("", "", PROJECT) {
        println!("  2. {}", dirs.config_dir().join("config.toml").display());
    }

    println!();
    println!("Default policy store:");
    println!();
    match default_store_path() {
        Some(path) => println!("  {}", path.display()),
        None => println!("  (none; pass --store)"),
    }
}

/// First existing config file on the search path
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("fwpolicy.toml");
    if local.exists() {
        return Some(local);
    }

    let dirs = directories::ProjectDirs::from("", "", PROJECT)?;
    let path = dirs.config_dir().join("config.toml");
    path.exists().then_some(path)
}
