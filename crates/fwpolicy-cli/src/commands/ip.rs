//! Per-app IP rule management commands

use super::{settle, EngineSource};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use fwpolicy_core::{HostSpecifier, IpRuleStatus, PolicyEngine};
use tracing::info;

/// IP rule arguments
#[derive(Args, Debug)]
pub struct IpArgs {
    #[command(subcommand)]
    pub command: IpCommands,
}

/// Rule target shared by the mutating subcommands
#[derive(Args, Debug)]
pub struct RuleTarget {
    /// App uid
    pub uid: i32,

    /// Address or CIDR block (0.0.0.0 or :: for any address)
    pub host: String,

    /// Only match this destination port
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// IP subcommands
#[derive(Subcommand, Debug)]
pub enum IpCommands {
    /// Block connections to a host
    Block(RuleTarget),

    /// Let connections to a host skip the app's rules
    BypassApp(RuleTarget),

    /// Let connections to a host skip every rule
    BypassUniversal(RuleTarget),

    /// Remove a rule
    Clear(RuleTarget),

    /// List stored rules
    List {
        /// Only list rules for this uid
        uid: Option<i32>,
    },
}

/// Execute ip command
pub fn execute(args: IpArgs, source: &EngineSource) -> Result<()> {
    let engine = source.open()?;

    match args.command {
        IpCommands::Block(target) => set(&engine, &target, IpRuleStatus::Block),
        IpCommands::BypassApp(target) => set(&engine, &target, IpRuleStatus::BypassAppRules),
        IpCommands::BypassUniversal(target) => set(&engine, &target, IpRuleStatus::BypassUniversal),
        IpCommands::Clear(target) => clear(&engine, &target),
        IpCommands::List { uid } => {
            list(&engine, uid);
            Ok(())
        }
    }
}

fn set(engine: &PolicyEngine, target: &RuleTarget, status: IpRuleStatus) -> Result<()> {
    let RuleTarget { uid, host, port } = target;
    let rule_host = HostSpecifier::parse(host, *port).with_context(|| format!("Invalid host: {host}"))?;

    match status {
        IpRuleStatus::BypassAppRules => engine.bypass_app_rules_ip(*uid, host, *port),
        IpRuleStatus::BypassUniversal => engine.bypass_universal_ip(*uid, host, *port),
        _ => engine.block_ip(*uid, host, *port),
    }?;
    settle(engine)?;

    if stored_status(engine, *uid, &rule_host) != Some(status) {
        bail!("Rule for uid {uid} {rule_host} was not saved; see the log for the storage error");
    }
    info!(uid, host = %rule_host, %status, "IP rule saved");
    println!("{} {} uid {} -> {}", "✓".green(), status, uid, rule_host.to_string().cyan());
    Ok(())
}

fn clear(engine: &PolicyEngine, target: &RuleTarget) -> Result<()> {
    let RuleTarget { uid, host, port } = target;
    let rule_host = HostSpecifier::parse(host, *port).with_context(|| format!("Invalid host: {host}"))?;

    if stored_status(engine, *uid, &rule_host).is_none() {
        println!("{}", format!("No rule for uid {uid} {rule_host}").yellow());
        return Ok(());
    }

    engine.clear_ip_rule(*uid, host, *port)?;
    settle(engine)?;

    if stored_status(engine, *uid, &rule_host).is_some() {
        bail!("Rule for uid {uid} {rule_host} was not removed; see the log for the storage error");
    }
    println!("{} removed uid {} -> {}", "✓".green(), uid, rule_host.to_string().cyan());
    Ok(())
}

fn stored_status(engine: &PolicyEngine, uid: i32, host: &HostSpecifier) -> Option<IpRuleStatus> {
    engine
        .ips()
        .rules_for_uid(uid)
        .into_iter()
        .find(|r| r.host == *host)
        .map(|r| r.status)
}

fn list(engine: &PolicyEngine, uid: Option<i32>) {
    let rules = match uid {
        Some(uid) => engine.ips().rules_for_uid(uid),
        None => engine.ips().rules(),
    };

    println!("{}", "═".repeat(50).bright_blue());
    println!("{}", " IP Rules".bright_white().bold());
    println!("{}", "═".repeat(50).bright_blue());
    println!("Total rules: {}", rules.len().to_string().green());
    println!("{}", "─".repeat(50).bright_black());

    if rules.is_empty() {
        println!("{}", "  (empty)".dimmed());
    }
    for rule in &rules {
        let status = match rule.status {
            IpRuleStatus::Block => rule.status.to_string().red(),
            IpRuleStatus::None => rule.status.to_string().dimmed(),
            IpRuleStatus::BypassAppRules | IpRuleStatus::BypassUniversal => {
                rule.status.to_string().green()
            }
        };
        println!("  {:>6}  {:<17} {}", rule.uid, status, rule.host);
    }

    println!("{}", "═".repeat(50).bright_blue());
}
