//! Site description and driver.
//!
//! A site maps host identifiers to a connection target and an ordered list of
//! resources. The driver runs every selected host in turn, one transaction per
//! resource, and stops a host at its first failed transaction.

use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::connection;
use crate::error::{Error, ErrorContext, Result};
use crate::host::HostContext;
use crate::report::{ConsoleReporter, Reporter};
use crate::secrets::{EnvSecretStore, SecretStore};
use crate::tasks::{self, parse_mode, FileAttrs};
use crate::transaction::CompletedTransaction;

/// Valid host identifiers
static HOST_KEY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("Invalid host key regex"));

/// Whether `key` may be used as a host identifier
pub fn is_valid_key(key: &str) -> bool {
    HOST_KEY_REGEX.is_match(key)
}

/// A parsed site description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Hosts by identifier, iterated in sorted order
    #[serde(default)]
    pub hosts: BTreeMap<String, HostEntry>,
}

/// How to reach a host and what to manage on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    /// SSH destination, or `local` to run on the control node
    pub ssh_host: String,

    /// SSH port
    #[serde(default)]
    pub port: Option<u16>,

    /// Resources in application order
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl HostEntry {
    /// Entry without resources
    pub fn new(ssh_host: impl Into<String>) -> Self {
        Self {
            ssh_host: ssh_host.into(),
            port: None,
            resources: Vec::new(),
        }
    }

    /// Append a resource
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }
}

/// One declared target state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Resource {
    /// A directory
    Directory {
        path: String,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
    },
    /// A regular file with inline or secret content
    File {
        path: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        secret: Option<String>,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
    },
    /// Nothing at the path
    Absent { path: String },
}

impl Resource {
    /// Target path
    pub fn path(&self) -> &str {
        match self {
            Resource::Directory { path, .. }
            | Resource::File { path, .. }
            | Resource::Absent { path } => path,
        }
    }

    fn attrs(&self) -> FileAttrs {
        match self {
            Resource::Directory {
                mode, owner, group, ..
            }
            | Resource::File {
                mode, owner, group, ..
            } => FileAttrs {
                mode: mode.clone(),
                owner: owner.clone(),
                group: group.clone(),
            },
            Resource::Absent { .. } => FileAttrs::default(),
        }
    }

    fn validate(&self, host: &str) -> Result<()> {
        let key = format!("hosts.{}.resources", host);
        if self.path().is_empty() {
            return Err(Error::invalid_config(key, "resource path must not be empty"));
        }
        if let Some(mode) = &self.attrs().mode {
            parse_mode(mode)?;
        }
        if let Resource::File {
            path,
            content,
            secret,
            ..
        } = self
        {
            if content.is_some() == secret.is_some() {
                return Err(Error::invalid_config(
                    key,
                    format!("file '{}' needs exactly one of 'content' or 'secret'", path),
                ));
            }
        }
        Ok(())
    }
}

impl Site {
    /// Load a site description, choosing the format by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read site file: {}", path.display()))?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let site: Site = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        site.validate()?;
        Ok(site)
    }

    /// Parse a TOML site description
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let site: Site = toml::from_str(content)?;
        site.validate()?;
        Ok(site)
    }

    /// Parse a YAML site description
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let site: Site = serde_yaml::from_str(content)?;
        site.validate()?;
        Ok(site)
    }

    /// Check host identifiers and resources
    pub fn validate(&self) -> Result<()> {
        for (name, entry) in &self.hosts {
            if !is_valid_key(name) {
                return Err(Error::invalid_config(
                    "hosts",
                    format!("'{}' is not a valid host identifier", name),
                ));
            }
            if entry.ssh_host.trim().is_empty() {
                return Err(Error::invalid_config(
                    format!("hosts.{}.ssh_host", name),
                    "must not be empty",
                ));
            }
            for resource in &entry.resources {
                resource.validate(name)?;
            }
        }
        Ok(())
    }

    /// Resolve a comma separated host selection.
    ///
    /// `None` selects every host. Duplicates are ignored and the result is
    /// sorted.
    pub fn select(&self, hosts: Option<&str>) -> Result<Vec<String>> {
        let Some(hosts) = hosts else {
            return Ok(self.hosts.keys().cloned().collect());
        };

        let mut selected = BTreeSet::new();
        for name in hosts.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !self.hosts.contains_key(name) {
                return Err(Error::HostNotFound(name.to_string()));
            }
            selected.insert(name.to_string());
        }
        Ok(selected.into_iter().collect())
    }
}

/// Counts for one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostSummary {
    /// Host identifier
    pub host: String,
    /// Transactions that found the host already in the target state
    pub ok: usize,
    /// Transactions that changed the host
    pub changed: usize,
    /// Transactions that failed
    pub failed: usize,
    /// Why the host was stopped, if it was
    pub halted: Option<String>,
}

impl HostSummary {
    fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    fn record(&mut self, completed: &CompletedTransaction) {
        if completed.changed() {
            self.changed += 1;
        } else {
            self.ok += 1;
        }
    }
}

/// Outcome of a site run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Per-host counts in run order
    pub hosts: Vec<HostSummary>,
}

impl RunSummary {
    /// Whether no host was halted
    pub fn success(&self) -> bool {
        self.hosts.iter().all(|h| h.halted.is_none())
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            2
        }
    }

    /// Render the recap block
    pub fn render(&self, use_color: bool) -> String {
        let header = "RECAP";
        let stars = "*".repeat(80 - header.len() - 1);
        let mut out = if use_color {
            format!("{} {}\n", header.bright_white().bold(), stars.bright_black())
        } else {
            format!("{} {}\n", header, stars)
        };

        for summary in &self.hosts {
            let counts = format!(
                "ok={:<4} changed={:<4} failed={:<4}",
                summary.ok, summary.changed, summary.failed
            );
            let host = format!("{:<30}", summary.host);
            let host = if !use_color {
                host
            } else if summary.failed > 0 {
                host.red().bold().to_string()
            } else if summary.changed > 0 {
                host.yellow().to_string()
            } else {
                host.green().to_string()
            };
            out.push_str(&format!("{} : {}\n", host, counts));
        }
        out
    }
}

/// Runs a site against its hosts.
pub struct SiteRunner<'s> {
    site: &'s Site,
    config: &'s Config,
    reporter: Arc<dyn Reporter>,
    secrets: Arc<dyn SecretStore>,
    pretend: bool,
}

impl<'s> SiteRunner<'s> {
    /// Runner using the console reporter and environment secrets
    pub fn new(site: &'s Site, config: &'s Config) -> Self {
        Self {
            site,
            config,
            reporter: Arc::new(ConsoleReporter::new(config.colors.enabled)),
            secrets: Arc::new(EnvSecretStore::default()),
            pretend: config.defaults.pretend,
        }
    }

    /// Replace the reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the secret store
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Enable or disable pretend mode
    pub fn with_pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    /// Run the selected hosts in order.
    ///
    /// A failed transaction stops its host and the run continues with the
    /// next one. A logic error aborts the whole run.
    pub async fn run(&self, selected: &[String]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for name in selected {
            let entry = self
                .site
                .hosts
                .get(name)
                .ok_or_else(|| Error::HostNotFound(name.clone()))?;
            let host = HostContext::new(name.clone(), connection::connect(entry, self.config))
                .with_reporter(self.reporter.clone())
                .with_pretend(self.pretend);
            summary.hosts.push(self.run_host(&host, entry).await?);
        }
        Ok(summary)
    }

    /// Apply every resource of `entry` to `host`.
    #[instrument(skip_all, fields(host = %host.name()))]
    pub async fn run_host(&self, host: &HostContext, entry: &HostEntry) -> Result<HostSummary> {
        info!(resources = entry.resources.len(), pretend = host.pretend(), "Running host");
        let mut summary = HostSummary::new(host.name());

        for resource in &entry.resources {
            match self.apply(host, resource).await {
                Ok(completed) => summary.record(&completed),
                Err(err) if err.is_logic_error() => return Err(err),
                Err(err) => {
                    if err.as_transaction_error().is_some() {
                        summary.failed += 1;
                    }
                    error!(error = %err, "Host halted");
                    summary.halted = Some(err.to_string());
                    break;
                }
            }
        }

        if summary.halted.is_none() {
            info!(ok = summary.ok, changed = summary.changed, "Host finished");
        } else {
            warn!(
                skipped = entry.resources.len() - summary.ok - summary.changed - summary.failed,
                "Remaining resources skipped"
            );
        }
        Ok(summary)
    }

    async fn apply(&self, host: &HostContext, resource: &Resource) -> Result<CompletedTransaction> {
        match resource {
            Resource::Directory { path, .. } => {
                tasks::directory(host, path, &resource.attrs()).await
            }
            Resource::File {
                path,
                content,
                secret,
                ..
            } => {
                let content = match (content, secret) {
                    (Some(content), _) => content.clone(),
                    (None, Some(key)) => self.secrets.get(key)?,
                    (None, None) => {
                        return Err(Error::invalid_config(
                            "content",
                            format!("file '{}' has no content", path),
                        ))
                    }
                };
                tasks::file(host, path, content, &resource.attrs()).await
            }
            Resource::Absent { path } => tasks::absent(host, path).await,
        }
    }
}
