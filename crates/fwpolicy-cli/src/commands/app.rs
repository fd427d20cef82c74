//! Per-app policy commands

use super::{settle, EngineSource};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use fwpolicy_core::{AppPolicy, ConnectionStatus, FileRepository, FirewallStatus, PolicyEngine};
use tracing::info;

/// App policy arguments
#[derive(Args, Debug)]
pub struct AppArgs {
    #[command(subcommand)]
    pub command: AppCommands,
}

/// App subcommands
#[derive(Subcommand, Debug)]
pub enum AppCommands {
    /// Set an app's firewall mode and blocked networks
    Set {
        /// App uid
        uid: i32,

        /// Firewall mode: none, exclude, isolate, bypass-universal,
        /// bypass-dns-firewall or untracked (removes the policy)
        #[arg(short, long, default_value = "none")]
        firewall: FirewallStatus,

        /// Blocked networks: allow, both, metered or unmetered
        #[arg(short, long, default_value = "allow")]
        connection: ConnectionStatus,

        /// Package name to record
        #[arg(long)]
        package: Option<String>,

        /// Display name to record
        #[arg(long)]
        name: Option<String>,
    },

    /// Show one app or every stored app
    Show {
        /// App uid
        uid: Option<i32>,
    },
}

/// Execute app command
pub fn execute(args: AppArgs, source: &EngineSource) -> Result<()> {
    let engine = source.open()?;

    match args.command {
        AppCommands::Set {
            uid,
            firewall,
            connection,
            package,
            name,
        } => set(&engine, uid, firewall, connection, package, name),
        AppCommands::Show { uid: Some(uid) } => {
            show_one(&engine, uid);
            Ok(())
        }
        AppCommands::Show { uid: None } => {
            show_all(&engine);
            Ok(())
        }
    }
}

fn set(
    engine: &PolicyEngine,
    uid: i32,
    firewall: FirewallStatus,
    connection: ConnectionStatus,
    package: Option<String>,
    name: Option<String>,
) -> Result<()> {
    if package.is_some() || name.is_some() {
        if firewall == FirewallStatus::Untracked {
            bail!("Names cannot be recorded for an untracked app");
        }
        let mut policy = engine
            .apps()
            .get(uid)
            .unwrap_or_else(|| AppPolicy::new(uid))
            .with_status(firewall, connection);
        policy.package_name = package.or(policy.package_name);
        policy.app_name = name.or(policy.app_name);
        engine.apps().upsert(policy);
    } else {
        engine.update_app_policy(uid, firewall, connection);
    }
    settle(engine)?;

    // The in-memory table changes even when the write fails, so check the file.
    if let Some(path) = &engine.config().persistence.path {
        let stored = FileRepository::open(path)
            .with_context(|| format!("Failed to reopen policy store {}", path.display()))?;
        if !persisted(&stored.snapshot().app_policies, uid, firewall, connection) {
            bail!("Policy for uid {uid} was not saved; see the log for the storage error");
        }
    }

    info!(uid, %firewall, %connection, "App policy saved");
    if firewall == FirewallStatus::Untracked {
        println!("{} uid {} is no longer tracked", "✓".green(), uid);
    } else {
        println!("{} uid {}: {}, blocked on {}", "✓".green(), uid, firewall, connection);
    }
    Ok(())
}

fn persisted(
    policies: &[AppPolicy],
    uid: i32,
    firewall: FirewallStatus,
    connection: ConnectionStatus,
) -> bool {
    let stored = policies.iter().find(|policy| policy.uid == uid);
    match stored {
        None => firewall == FirewallStatus::Untracked,
        Some(policy) => {
            policy.firewall_status == firewall && policy.connection_status == connection
        }
    }
}

fn show_one(engine: &PolicyEngine, uid: i32) {
    match engine.apps().get(uid) {
        Some(policy) => print_policy(&policy),
        None => println!(
            "uid {}: {}, blocked on {}",
            uid,
            FirewallStatus::Untracked.to_string().dimmed(),
            ConnectionStatus::Allow
        ),
    }
}

fn show_all(engine: &PolicyEngine) {
    let apps = engine.apps().apps();

    println!("{}", "═".repeat(50).bright_blue());
    println!("{}", " App Policies".bright_white().bold());
    println!("{}", "═".repeat(50).bright_blue());
    println!("Total apps: {}", apps.len().to_string().green());
    println!("{}", "─".repeat(50).bright_black());

    if apps.is_empty() {
        println!("{}", "  (empty)".dimmed());
    }
    for policy in &apps {
        print_policy(policy);
    }

    println!("{}", "═".repeat(50).bright_blue());
}

fn print_policy(policy: &AppPolicy) {
    let label = match (&policy.app_name, &policy.package_name) {
        (Some(name), Some(package)) => format!(" {name} ({package})"),
        (Some(name), None) => format!(" {name}"),
        (None, Some(package)) => format!(" {package}"),
        (None, None) => String::new(),
    };
    let firewall = match policy.firewall_status {
        FirewallStatus::Isolate => policy.firewall_status.to_string().yellow(),
        FirewallStatus::Exclude | FirewallStatus::BypassUniversal | FirewallStatus::BypassDnsFirewall => {
            policy.firewall_status.to_string().green()
        }
        FirewallStatus::None | FirewallStatus::Untracked => policy.firewall_status.to_string().normal(),
    };
    let connection = if policy.connection_status == ConnectionStatus::Allow {
        policy.connection_status.to_string().normal()
    } else {
        policy.connection_status.to_string().red()
    };

    println!("  uid {}{}: {}, blocked on {}", policy.uid, label.cyan(), firewall, connection);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_matches_statuses() {
        let stored = vec![AppPolicy::new(7).with_status(FirewallStatus::Isolate, ConnectionStatus::Metered)];

        assert!(persisted(&stored, 7, FirewallStatus::Isolate, ConnectionStatus::Metered));
        assert!(!persisted(&stored, 7, FirewallStatus::Isolate, ConnectionStatus::Both));
        assert!(!persisted(&stored, 8, FirewallStatus::Exclude, ConnectionStatus::Allow));
    }

    #[test]
    fn test_persisted_untracked_means_absent() {
        let stored = vec![AppPolicy::new(7).with_status(FirewallStatus::None, ConnectionStatus::Allow)];

        assert!(persisted(&stored, 8, FirewallStatus::Untracked, ConnectionStatus::Allow));
        assert!(!persisted(&stored, 7, FirewallStatus::Untracked, ConnectionStatus::Allow));
    }
}
