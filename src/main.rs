//! siteform - transactional host configuration
//!
//! This is the main entry point for the siteform CLI.

mod cli;

use anyhow::{Context, Result};
use cli::Cli;
use colored::Colorize;
use siteform::config::{Config, LogFormat, LoggingConfig};
use siteform::site::{RunSummary, Site, SiteRunner};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply_to(&mut config);

    init_logging(cli.verbosity(), &config.logging);
    debug!(version = siteform::VERSION, ?config, "Configuration loaded");

    if !config.colors.enabled {
        colored::control::set_override(false);
    }

    let exit_code = match run(&cli, &config).await {
        Ok(summary) => {
            print!("\n{}", summary.render(config.colors.enabled));
            summary.exit_code()
        }
        Err(err) => {
            eprintln!("{} {}", "ERROR:".red().bold(), err);
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            err.exit_code()
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: &Cli, config: &Config) -> siteform::Result<RunSummary> {
    let site = Site::from_file(&cli.site)?;
    let selected = site.select(cli.hosts.as_deref())?;
    SiteRunner::new(&site, config).run(&selected).await
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .with(env_filter)
            .init(),
    }
}
