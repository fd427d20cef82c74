//! Resolve command - run a query through the resolvers

use super::EngineSource;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use fwpolicy_core::{DomainStatus, IpRuleStatus, MatchedBy};

/// Resolve command arguments
#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(subcommand)]
    pub target: ResolveTarget,
}

/// What to resolve
#[derive(Subcommand, Debug)]
pub enum ResolveTarget {
    /// Resolve a DNS query
    Domain {
        /// Domain name
        domain: String,
    },

    /// Resolve a connection by an app
    Conn {
        /// App uid
        uid: i32,

        /// Destination address
        address: String,

        /// Destination port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Execute resolve command
pub fn execute(args: ResolveArgs, source: &EngineSource) -> Result<()> {
    let engine = source.open()?;

    match args.target {
        ResolveTarget::Domain { domain } => {
            let (matched_by, status) = engine.resolve_domain_detailed(&domain);
            println!(
                "{}  {}  ({})",
                domain,
                paint_domain(status),
                tier_name(matched_by, status)
            );
        }
        ResolveTarget::Conn { uid, address, port } => {
            let status = engine.resolve_connection(uid, &address, port);
            let target = match port {
                Some(port) => format!("{address} port {port}"),
                None => address,
            };
            println!("uid {uid} -> {target}  {}", paint_ip(status));

            let firewall = engine.app_firewall_status(uid);
            let connection = engine.app_connection_status(uid);
            println!("  app: {firewall}, blocked on: {connection}");
        }
    }

    Ok(())
}

fn tier_name(matched_by: MatchedBy, status: DomainStatus) -> &'static str {
    match (matched_by, status) {
        (_, DomainStatus::None) => "no rule",
        (MatchedBy::Cache, _) => "cached",
        (MatchedBy::Domain, _) => "exact rule",
        (MatchedBy::Tld, _) => "suffix rule",
        (MatchedBy::Wildcard, _) => "wildcard rule",
    }
}

fn paint_domain(status: DomainStatus) -> String {
    match status {
        DomainStatus::Block => status.to_string().red().bold().to_string(),
        DomainStatus::Whitelist => status.to_string().green().bold().to_string(),
        DomainStatus::None => status.to_string().dimmed().to_string(),
    }
}

fn paint_ip(status: IpRuleStatus) -> String {
    match status {
        IpRuleStatus::Block => status.to_string().red().bold().to_string(),
        IpRuleStatus::BypassAppRules | IpRuleStatus::BypassUniversal => {
            status.to_string().green().bold().to_string()
        }
        IpRuleStatus::None => status.to_string().dimmed().to_string(),
    }
}
