//! Domain rule management commands

use super::{settle, EngineSource};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use fwpolicy_core::{DomainKind, DomainStatus, PolicyEngine};
use tracing::info;

/// Domain rule arguments
#[derive(Args, Debug)]
pub struct DomainArgs {
    #[command(subcommand)]
    pub command: DomainCommands,
}

/// Domain subcommands
#[derive(Subcommand, Debug)]
pub enum DomainCommands {
    /// Block a domain, suffix or pattern
    Block {
        /// Domain (use *.example.com for a wildcard)
        domain: String,

        /// Rule kind: exact, wildcard or tld (default: wildcard if the
        /// domain contains '*', exact otherwise)
        #[arg(short, long)]
        kind: Option<DomainKind>,
    },

    /// Always allow a domain, suffix or pattern
    Whitelist {
        /// Domain (use *.example.com for a wildcard)
        domain: String,

        /// Rule kind: exact, wildcard or tld
        #[arg(short, long)]
        kind: Option<DomainKind>,
    },

    /// Remove a rule
    Clear {
        /// Domain as it was added
        domain: String,

        /// Rule kind: exact, wildcard or tld
        #[arg(short, long)]
        kind: Option<DomainKind>,
    },

    /// List stored rules
    List {
        /// Only list rules of this kind
        #[arg(short, long)]
        kind: Option<DomainKind>,
    },
}

/// Execute domain command
pub fn execute(args: DomainArgs, source: &EngineSource) -> Result<()> {
    let engine = source.open()?;

    match args.command {
        DomainCommands::Block { domain, kind } => {
            set(&engine, &domain, infer_kind(&domain, kind), DomainStatus::Block)
        }
        DomainCommands::Whitelist { domain, kind } => {
            set(&engine, &domain, infer_kind(&domain, kind), DomainStatus::Whitelist)
        }
        DomainCommands::Clear { domain, kind } => clear(&engine, &domain, infer_kind(&domain, kind)),
        DomainCommands::List { kind } => {
            list(&engine, kind);
            Ok(())
        }
    }
}

/// Explicit kind, or wildcard when the domain contains a `*`
pub fn infer_kind(domain: &str, kind: Option<DomainKind>) -> DomainKind {
    kind.unwrap_or(if domain.contains('*') {
        DomainKind::Wildcard
    } else {
        DomainKind::Exact
    })
}

fn set(engine: &PolicyEngine, domain: &str, kind: DomainKind, status: DomainStatus) -> Result<()> {
    let completion = match status {
        DomainStatus::Whitelist => engine.whitelist_domain(domain, kind),
        _ => engine.block_domain(domain, kind),
    }
    .with_context(|| format!("Invalid domain rule: {domain}"))?;
    completion.wait().context("Background writer stopped")?;

    match engine.domains().get(domain, kind) {
        Some(rule) if rule.status == status => {
            info!(domain = %rule.domain, %kind, %status, "Domain rule saved");
            println!("{} {} {} ({})", "✓".green(), status, rule.domain.cyan(), kind);
            Ok(())
        }
        _ => bail!("Rule for {domain} was not saved; see the log for the storage error"),
    }
}

fn clear(engine: &PolicyEngine, domain: &str, kind: DomainKind) -> Result<()> {
    if engine.domains().get(domain, kind).is_none() {
        println!("{}", format!("No {kind} rule for {domain}").yellow());
        return Ok(());
    }

    engine.clear_domain_rule(domain, kind);
    settle(engine)?;

    if engine.domains().get(domain, kind).is_some() {
        bail!("Rule for {domain} was not removed; see the log for the storage error");
    }
    println!("{} removed {} ({})", "✓".green(), domain.cyan(), kind);
    Ok(())
}

fn list(engine: &PolicyEngine, kind: Option<DomainKind>) {
    let rules: Vec<_> = engine
        .domains()
        .rules()
        .into_iter()
        .filter(|r| kind.map_or(true, |k| r.kind == k))
        .collect();

    println!("{}", "═".repeat(50).bright_blue());
    println!("{}", " Domain Rules".bright_white().bold());
    println!("{}", "═".repeat(50).bright_blue());
    println!("Total rules: {}", rules.len().to_string().green());
    println!("{}", "─".repeat(50).bright_black());

    if rules.is_empty() {
        println!("{}", "  (empty)".dimmed());
    }
    for rule in &rules {
        let status = match rule.status {
            DomainStatus::Block => rule.status.to_string().red(),
            DomainStatus::Whitelist => rule.status.to_string().green(),
            DomainStatus::None => rule.status.to_string().dimmed(),
        };
        println!("  {:<9} {:<9} {}", status, rule.kind.to_string(), rule.domain);
    }

    println!("{}", "═".repeat(50).bright_blue());
}
