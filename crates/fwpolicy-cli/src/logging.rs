//! Logging initialization

use anyhow::{Context, Result};
use fwpolicy_core::config::LoggingConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Args, LogFormat};

/// Level used when `RUST_LOG` is unset; flags win over the config file
fn default_level(args: &Args, config: &LoggingConfig) -> LevelFilter {
    if args.quiet {
        return LevelFilter::ERROR;
    }
    match args.verbose {
        0 => config.level.parse().unwrap_or(LevelFilter::WARN),
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Initialize logging from CLI arguments, falling back to the config file
pub fn init(args: &Args, config: &LoggingConfig) -> Result<()> {
    let level = default_level(args, config);

    let format = if args.log_format == LogFormat::Text && config.json_format {
        LogFormat::Json
    } else {
        args.log_format
    };

    let log_file = args.log_file.as_ref().or(config.file.as_ref());
    let file = log_file
        .map(|path| {
            std::fs::File::create(path).with_context(|| format!("Failed to create log file: {path}"))
        })
        .transpose()?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    match format {
        LogFormat::Text => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(args.verbose >= 2)
                    .with_thread_names(args.verbose >= 3)
                    .with_file(args.verbose >= 3)
                    .with_line_number(args.verbose >= 3),
            );

            if let Some(file) = file {
                subscriber
                    .with(fmt::layer().with_ansi(false).with_writer(file))
                    .init();
            } else {
                subscriber.init();
            }
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr));

            if let Some(file) = file {
                subscriber.with(fmt::layer().json().with_writer(file)).init();
            } else {
                subscriber.init();
            }
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn test_config_level_off_silences() {
        let args = Args::parse_from(["fwpolicy", "config", "paths"]);
        assert_eq!(default_level(&args, &config("off")), LevelFilter::OFF);
        assert_eq!(default_level(&args, &config("info")), LevelFilter::INFO);
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from(["fwpolicy", "-q", "config", "paths"]);
        assert_eq!(default_level(&args, &config("off")), LevelFilter::ERROR);

        let args = Args::parse_from(["fwpolicy", "-v", "config", "paths"]);
        assert_eq!(default_level(&args, &config("off")), LevelFilter::DEBUG);
    }
}
