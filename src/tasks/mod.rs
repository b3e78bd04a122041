//! Tasks: transaction clients that manage resources on a host.
//!
//! Each task opens one transaction, observes the current state through the
//! host's executor, changes the host if needed and completes the transaction.
//! In pretend mode a task records the target state without mutating anything.

pub mod file;

pub use file::{absent, directory, file};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::connection::RemoteExecError;
use crate::error::{Error, Result};
use crate::host::HostContext;

/// Type of a filesystem entry on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Link,
    /// Anything else (socket, device, fifo)
    Other,
}

impl FileType {
    fn from_stat(description: &str) -> Self {
        match description {
            "regular file" | "regular empty file" => FileType::File,
            "directory" => FileType::Directory,
            "symbolic link" => FileType::Link,
            _ => FileType::Other,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::File => write!(f, "file"),
            FileType::Directory => write!(f, "directory"),
            FileType::Link => write!(f, "link"),
            FileType::Other => write!(f, "other"),
        }
    }
}

/// Observed attributes of a path on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStat {
    /// Type of the entry (links are not followed)
    pub file_type: FileType,
    /// Permission bits as an octal string, e.g. `"755"`
    pub mode: String,
    /// Owning user name
    pub owner: String,
    /// Owning group name
    pub group: String,
}

impl RemoteStat {
    /// Parse one line of `stat -c '%F;%a;%U;%G'` output
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(4, ';');
        let file_type = FileType::from_stat(parts.next()?);
        let mode = parts.next()?.to_string();
        let owner = parts.next()?.to_string();
        let group = parts.next()?.to_string();
        Some(Self {
            file_type,
            mode,
            owner,
            group,
        })
    }
}

const STAT_SCRIPT: &str =
    "if [ -e \"$1\" ] || [ -L \"$1\" ]; then stat -c '%F;%a;%U;%G' -- \"$1\"; fi";

/// Observe `path` on the host; `None` if nothing exists there.
pub async fn stat(host: &HostContext, path: &str) -> Result<Option<RemoteStat>> {
    let result = host
        .exec_checked(&["sh", "-c", STAT_SCRIPT, "stat", path], None)
        .await?;
    let stdout = result.stdout_lossy();
    if stdout.trim().is_empty() {
        return Ok(None);
    }
    RemoteStat::parse(&stdout).map(Some).ok_or_else(|| Error::Other {
        message: format!("Unexpected stat output for '{}': {}", path, stdout.trim()),
        source: None,
    })
}

/// Normalize an octal mode string (`"0755"` becomes `"755"`).
pub fn parse_mode(mode: &str) -> Result<String> {
    let value = u32::from_str_radix(mode, 8)
        .map_err(|_| Error::invalid_config("mode", format!("'{}' is not an octal mode", mode)))?;
    if value > 0o7777 {
        return Err(Error::invalid_config(
            "mode",
            format!("'{}' is out of range", mode),
        ));
    }
    Ok(format!("{:o}", value))
}

/// Ownership and permissions a task should enforce.
///
/// Owner and group are only managed when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttrs {
    /// Octal permission bits
    #[serde(default)]
    pub mode: Option<String>,
    /// Owning user
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group
    #[serde(default)]
    pub group: Option<String>,
}

impl FileAttrs {
    /// Create empty attributes
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mode
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the owner
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Validate against a default mode
    pub(crate) fn resolve(&self, default_mode: &str) -> Result<ResolvedAttrs> {
        Ok(ResolvedAttrs {
            mode: parse_mode(self.mode.as_deref().unwrap_or(default_mode))?,
            owner: self.owner.clone(),
            group: self.group.clone(),
        })
    }
}

/// Validated attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedAttrs {
    pub(crate) mode: String,
    pub(crate) owner: Option<String>,
    pub(crate) group: Option<String>,
}

/// Whether a remote error is an expected, reportable failure.
pub(crate) fn is_operational(err: &Error) -> bool {
    matches!(err, Error::Remote(RemoteExecError::CommandFailed { .. }))
}
