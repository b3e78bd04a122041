//! Configuration module for siteform
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/siteform/siteform.toml)
//! - User configuration (~/.siteform.toml)
//! - Project configuration (./siteform.toml)
//! - Environment variables
//! - Command-line arguments (applied by the binary)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default settings
    pub defaults: Defaults,

    /// SSH settings
    pub ssh: SshConfig,

    /// Colors and output settings
    pub colors: ColorsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Default configuration values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Command timeout in seconds, 0 disables it
    pub timeout: u64,

    /// Report what would change without changing anything
    pub pretend: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: 30,
            pretend: false,
        }
    }
}

/// SSH configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// SSH client executable
    pub executable: String,

    /// Remote user, unless the host entry names one
    pub user: Option<String>,

    /// Remote port, unless the host entry names one
    pub port: Option<u16>,

    /// Extra arguments passed to the client before the destination
    pub extra_args: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            executable: "ssh".to_string(),
            user: None,
            port: None,
            extra_args: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }
}

/// Colors configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    /// Enable colors
    pub enabled: bool,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base log level when neither RUST_LOG nor -v is given
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Settings one configuration file actually sets.
///
/// Unset fields keep the value from earlier sources.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    defaults: DefaultsLayer,
    ssh: SshLayer,
    colors: ColorsLayer,
    logging: LoggingLayer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DefaultsLayer {
    timeout: Option<u64>,
    pretend: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SshLayer {
    executable: Option<String>,
    user: Option<String>,
    port: Option<u16>,
    extra_args: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ColorsLayer {
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingLayer {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            } else if config_path == Some(&path) {
                anyhow::bail!("Config file not found: {}", path.display());
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        if let Ok(env_config) = std::env::var("SITEFORM_CONFIG") {
            return vec![PathBuf::from(env_config)];
        }

        let mut paths = vec![PathBuf::from("/etc/siteform/siteform.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".siteform.toml"));
        }
        paths.push(PathBuf::from("siteform.toml"));
        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let layer: ConfigLayer = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        Ok(self.merge(layer))
    }

    /// Merge a file layer into this config; every field the layer sets wins
    fn merge(&self, layer: ConfigLayer) -> Config {
        let mut merged = self.clone();

        if let Some(timeout) = layer.defaults.timeout {
            merged.defaults.timeout = timeout;
        }
        if let Some(pretend) = layer.defaults.pretend {
            merged.defaults.pretend = pretend;
        }

        if let Some(executable) = layer.ssh.executable {
            merged.ssh.executable = executable;
        }
        if layer.ssh.user.is_some() {
            merged.ssh.user = layer.ssh.user;
        }
        if layer.ssh.port.is_some() {
            merged.ssh.port = layer.ssh.port;
        }
        if let Some(extra_args) = layer.ssh.extra_args {
            merged.ssh.extra_args = extra_args;
        }

        if let Some(enabled) = layer.colors.enabled {
            merged.colors.enabled = enabled;
        }

        if let Some(level) = layer.logging.level {
            merged.logging.level = level;
        }
        if let Some(format) = layer.logging.format {
            merged.logging.format = format;
        }

        merged
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // SITEFORM_TIMEOUT
        if let Ok(timeout) = std::env::var("SITEFORM_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.defaults.timeout = n;
            }
        }

        // SITEFORM_SSH_USER
        if let Ok(user) = std::env::var("SITEFORM_SSH_USER") {
            self.ssh.user = Some(user);
        }

        // SITEFORM_PRETEND
        if let Ok(pretend) = std::env::var("SITEFORM_PRETEND") {
            self.defaults.pretend = !matches!(pretend.as_str(), "" | "0" | "false" | "no");
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() || std::env::var("SITEFORM_NO_COLOR").is_ok() {
            self.colors.enabled = false;
        }

        // SITEFORM_LOG_FORMAT
        if let Ok(format) = std::env::var("SITEFORM_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.logging.format = format;
            }
        }
    }

    /// Command timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        match self.defaults.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Load from a specific file only
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.timeout, 30);
        assert!(!config.defaults.pretend);
        assert_eq!(config.ssh.executable, "ssh");
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let mut config = Config::default();
        config.defaults.timeout = 0;
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_config_merge() {
        let base = Config {
            ssh: SshConfig {
                user: Some("deploy".to_string()),
                ..SshConfig::default()
            },
            ..Config::default()
        };
        let layer: ConfigLayer = toml::from_str("[defaults]\ntimeout = 10\n").unwrap();

        let merged = base.merge(layer);
        assert_eq!(merged.defaults.timeout, 10);
        assert_eq!(merged.ssh.user.as_deref(), Some("deploy"));
    }

    #[test]
    fn test_later_layer_restores_defaults() {
        let earlier: ConfigLayer = toml::from_str(
            "[defaults]\ntimeout = 5\npretend = true\n\n[colors]\nenabled = false\n",
        )
        .unwrap();
        let later: ConfigLayer = toml::from_str(
            "[defaults]\ntimeout = 30\npretend = false\n\n[colors]\nenabled = true\n",
        )
        .unwrap();

        let config = Config::default().merge(earlier);
        assert!(config.defaults.pretend);
        assert!(!config.colors.enabled);

        let config = config.merge(later);
        assert_eq!(config.defaults.timeout, 30);
        assert!(!config.defaults.pretend);
        assert!(config.colors.enabled);
    }

    #[test]
    fn test_unset_fields_keep_earlier_values() {
        let earlier: ConfigLayer =
            toml::from_str("[defaults]\npretend = true\n\n[ssh]\nport = 2200\n").unwrap();
        let later: ConfigLayer = toml::from_str("[logging]\nlevel = \"info\"\n").unwrap();

        let config = Config::default().merge(earlier).merge(later);
        assert!(config.defaults.pretend);
        assert_eq!(config.ssh.port, Some(2200));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[ssh]\nport = 2222\nextra_args = []\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.ssh.port, Some(2222));
        assert!(config.ssh.extra_args.is_empty());
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "defaults:\n  pretend: true").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.defaults.pretend);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file() {
        let path = PathBuf::from("/nonexistent/siteform.toml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("SITEFORM_TIMEOUT", "5");
        std::env::set_var("SITEFORM_PRETEND", "1");
        std::env::set_var("SITEFORM_LOG_FORMAT", "json");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.defaults.timeout, 5);
        assert!(config.defaults.pretend);
        assert_eq!(config.logging.format, LogFormat::Json);
        std::env::remove_var("SITEFORM_TIMEOUT");
        std::env::remove_var("SITEFORM_PRETEND");
        std::env::remove_var("SITEFORM_LOG_FORMAT");
    }
}
