//! Command-line argument parsing

use crate::commands::Command;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// fwpolicy - network policy rules for a per-app firewall
///
/// Inspects and edits the domain, IP and app rules stored in a policy
/// snapshot, and resolves queries against them.
#[derive(Parser, Debug)]
#[command(name = "fwpolicy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", env = "FWPOLICY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Policy store path (overrides persistence.path)
    #[arg(short = 's', long, value_name = "FILE", env = "FWPOLICY_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format for logs
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Log file path
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<String>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// Compact format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{domain::DomainCommands, Command};
    use fwpolicy_core::DomainKind;

    #[test]
    fn test_verbose() {
        let args = Args::parse_from(["fwpolicy", "-v", "config", "paths"]);
        assert_eq!(args.verbose, 1);

        let args = Args::parse_from(["fwpolicy", "config", "paths", "-vvv"]);
        assert_eq!(args.verbose, 3);
    }

    #[test]
    fn test_global_store() {
        let args = Args::parse_from(["fwpolicy", "domain", "list", "--store", "/tmp/s.json"]);
        assert_eq!(args.store, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn test_domain_kind_parsing() {
        let args = Args::parse_from(["fwpolicy", "domain", "block", "ru", "--kind", "tld"]);
        match args.command {
            Command::Domain(d) => match d.command {
                DomainCommands::Block { domain, kind } => {
                    assert_eq!(domain, "ru");
                    assert_eq!(kind, Some(DomainKind::Tld));
                }
                other => panic!("unexpected command {other:?}"),
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_bad_kind_rejected() {
        assert!(Args::try_parse_from(["fwpolicy", "domain", "block", "ru", "--kind", "suffix"]).is_err());
    }
}
