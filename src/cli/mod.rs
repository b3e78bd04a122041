//! CLI module for siteform
//!
//! Argument parsing and the mapping of flags onto the loaded configuration.

use clap::Parser;
use siteform::config::Config;
use std::path::PathBuf;

/// siteform - bring hosts to a declared state
///
/// Every change is applied in a transaction and reported as one line.
#[derive(Parser, Debug, Clone)]
#[command(name = "siteform")]
#[command(version)]
#[command(about = "Bring hosts to a declared state", long_about = None)]
pub struct Cli {
    /// Site description (TOML, YAML or JSON)
    #[arg(default_value = "site.toml", env = "SITEFORM_SITE")]
    pub site: PathBuf,

    /// Comma separated hosts to run (default: all)
    #[arg(short = 'H', long)]
    pub hosts: Option<String>,

    /// Report what would change without changing anything
    #[arg(short = 'p', long)]
    pub pretend: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log everything, same as -vvv
    #[arg(long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Path to configuration file
    #[arg(short = 'c', long, env = "SITEFORM_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parse arguments from the process
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        if self.debug {
            3
        } else {
            self.verbose.min(3)
        }
    }

    /// Apply flags that override configuration values
    pub fn apply_to(&self, config: &mut Config) {
        if self.pretend {
            config.defaults.pretend = true;
        }
        if self.no_color {
            config.colors.enabled = false;
        }
    }
}
