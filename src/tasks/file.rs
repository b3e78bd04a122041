//! Filesystem tasks: directories, files with managed content, and absent paths.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{is_operational, stat, FileAttrs, FileType, RemoteStat, ResolvedAttrs};
use crate::error::{Error, Result};
use crate::host::HostContext;
use crate::transaction::{ActiveTransaction, CompletedTransaction, StateMap};

/// Mode for directories without an explicit mode
pub const DEFAULT_DIRECTORY_MODE: &str = "755";

/// Mode for files without an explicit mode
pub const DEFAULT_FILE_MODE: &str = "644";

const UPLOAD_SCRIPT: &str = "cat > \"$1\"";

/// Hex encoded SHA-256 of `content`
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Ensure `path` is a directory with the given attributes.
pub async fn directory(
    host: &HostContext,
    path: &str,
    attrs: &FileAttrs,
) -> Result<CompletedTransaction> {
    let managed = attrs.resolve(DEFAULT_DIRECTORY_MODE)?;
    let path = path.to_string();
    host.transaction(format!("dir {}", path))
        .run(move |tx, host| Box::pin(ensure_directory(tx, host, path, managed)))
        .await
}

/// Ensure `path` is a regular file holding `content` with the given attributes.
///
/// The completed transaction carries the hash of `content` as the extra
/// value `sha256`.
pub async fn file(
    host: &HostContext,
    path: &str,
    content: impl Into<Vec<u8>>,
    attrs: &FileAttrs,
) -> Result<CompletedTransaction> {
    let managed = attrs.resolve(DEFAULT_FILE_MODE)?;
    let path = path.to_string();
    let content = content.into();
    host.transaction(format!("file {}", path))
        .run(move |tx, host| Box::pin(ensure_file(tx, host, path, content, managed)))
        .await
}

/// Ensure nothing exists at `path`.
pub async fn absent(host: &HostContext, path: &str) -> Result<CompletedTransaction> {
    let path = path.to_string();
    host.transaction(format!("absent {}", path))
        .run(move |tx, host| Box::pin(ensure_absent(tx, host, path)))
        .await
}

async fn ensure_directory(
    tx: &mut ActiveTransaction,
    host: &HostContext,
    path: String,
    managed: ResolvedAttrs,
) -> Result<()> {
    let current = stat(host, &path).await?;
    let initial = attr_state(current.as_ref(), &managed, None);
    tx.initial_state(initial.clone())?;

    if let Some(found) = current.as_ref().filter(|s| s.file_type != FileType::Directory) {
        tx.final_state(initial)?;
        tx.failure(format!(
            "path exists and is not a directory (type is '{}')",
            found.file_type
        ))?;
        return Ok(());
    }

    let target = target_state(&managed, None);
    if initial == target {
        tx.unchanged()?;
        return Ok(());
    }

    if !host.pretend() {
        if let Err(err) = create_directory(host, &path, current.as_ref(), &managed).await {
            return fail_observed(tx, host, &path, &managed, None, err).await;
        }
    }

    tx.final_state(target)?;
    tx.success()?;
    Ok(())
}

async fn create_directory(
    host: &HostContext,
    path: &str,
    current: Option<&RemoteStat>,
    managed: &ResolvedAttrs,
) -> Result<()> {
    if current.is_none() {
        host.exec_checked(&["mkdir", "-p", "--", path], None).await?;
    }
    apply_attrs(host, path, current, managed).await
}

async fn ensure_file(
    tx: &mut ActiveTransaction,
    host: &HostContext,
    path: String,
    content: Vec<u8>,
    managed: ResolvedAttrs,
) -> Result<()> {
    let desired_hash = sha256_hex(&content);
    let current = stat(host, &path).await?;
    let current_hash = match &current {
        Some(s) if s.file_type == FileType::File => remote_sha256(host, &path).await?,
        _ => None,
    };

    let initial = attr_state(current.as_ref(), &managed, Some(json!(current_hash)));
    tx.initial_state(initial.clone())?;

    if let Some(found) = current.as_ref().filter(|s| s.file_type != FileType::File) {
        tx.final_state(initial)?;
        tx.failure(format!(
            "path exists and is not a file (type is '{}')",
            found.file_type
        ))?;
        return Ok(());
    }

    let target = target_state(&managed, Some(json!(desired_hash)));
    if initial == target {
        tx.unchanged_with([("sha256", desired_hash)])?;
        return Ok(());
    }

    if !host.pretend() {
        let applied = write_file(
            host,
            &path,
            &content,
            current.as_ref(),
            current_hash.as_deref() == Some(desired_hash.as_str()),
            &managed,
        )
        .await;
        if let Err(err) = applied {
            return fail_observed(tx, host, &path, &managed, Some(desired_hash), err).await;
        }
    }

    tx.final_state(target)?;
    tx.success_with([("sha256", desired_hash)])?;
    Ok(())
}

async fn write_file(
    host: &HostContext,
    path: &str,
    content: &[u8],
    current: Option<&RemoteStat>,
    content_matches: bool,
    managed: &ResolvedAttrs,
) -> Result<()> {
    if !content_matches {
        debug!(host = %host.name(), path = %path, size = content.len(), "Uploading file content");
        host.exec_checked(&["sh", "-c", UPLOAD_SCRIPT, "upload", path], Some(content))
            .await?;
    }
    apply_attrs(host, path, current, managed).await
}

async fn ensure_absent(tx: &mut ActiveTransaction, host: &HostContext, path: String) -> Result<()> {
    let current = stat(host, &path).await?;
    tx.initial_state([("exists", current.is_some())])?;
    if current.is_none() {
        tx.unchanged()?;
        return Ok(());
    }

    if !host.pretend() {
        if let Err(err) = host.exec_checked(&["rm", "-rf", "--", path.as_str()], None).await {
            let err = Error::from(err);
            if !is_operational(&err) {
                return Err(err);
            }
            let still_exists = stat(host, &path).await?.is_some();
            tx.final_state([("exists", still_exists)])?;
            tx.failure(err.to_string())?;
            return Ok(());
        }
    }

    tx.final_state([("exists", false)])?;
    tx.success()?;
    Ok(())
}

/// Set mode and ownership where they differ from `current`.
async fn apply_attrs(
    host: &HostContext,
    path: &str,
    current: Option<&RemoteStat>,
    managed: &ResolvedAttrs,
) -> Result<()> {
    if current.map(|s| s.mode.as_str()) != Some(managed.mode.as_str()) {
        host.exec_checked(&["chmod", managed.mode.as_str(), "--", path], None)
            .await?;
    }

    let differs = |wanted: &Option<String>, actual: Option<&str>| match wanted {
        Some(wanted) => actual != Some(wanted.as_str()),
        None => false,
    };
    let owner_differs = differs(&managed.owner, current.map(|s| s.owner.as_str()));
    let group_differs = differs(&managed.group, current.map(|s| s.group.as_str()));
    if owner_differs || group_differs {
        let spec = match (&managed.owner, &managed.group) {
            (Some(owner), Some(group)) => format!("{}:{}", owner, group),
            (Some(owner), None) => owner.clone(),
            (None, Some(group)) => format!(":{}", group),
            (None, None) => return Ok(()),
        };
        host.exec_checked(&["chown", spec.as_str(), "--", path], None)
            .await?;
    }
    Ok(())
}

/// Record what the host actually looks like after a failed mutation.
async fn fail_observed(
    tx: &mut ActiveTransaction,
    host: &HostContext,
    path: &str,
    managed: &ResolvedAttrs,
    desired_hash: Option<String>,
    err: Error,
) -> Result<()> {
    if !is_operational(&err) {
        return Err(err);
    }
    let current = stat(host, path).await?;
    let hash = match (&desired_hash, &current) {
        (Some(_), Some(s)) if s.file_type == FileType::File => Some(json!(remote_sha256(host, path).await?)),
        (Some(_), _) => Some(Value::Null),
        (None, _) => None,
    };
    tx.final_state(attr_state(current.as_ref(), managed, hash))?;
    tx.failure(err.to_string())?;
    Ok(())
}

async fn remote_sha256(host: &HostContext, path: &str) -> Result<Option<String>> {
    let result = host.exec(&["sha256sum", "--", path], None).await?;
    if !result.success() {
        return Ok(None);
    }
    Ok(result
        .stdout_lossy()
        .split_whitespace()
        .next()
        .map(str::to_string))
}

/// Observed state of a path restricted to the managed attributes.
fn attr_state(current: Option<&RemoteStat>, managed: &ResolvedAttrs, sha256: Option<Value>) -> StateMap {
    let mut state = StateMap::new();
    state.insert("exists".to_string(), json!(current.is_some()));
    if let Some(hash) = sha256 {
        state.insert("sha256".to_string(), hash);
    }
    state.insert("mode".to_string(), json!(current.map(|s| s.mode.clone())));
    if managed.owner.is_some() {
        state.insert("owner".to_string(), json!(current.map(|s| s.owner.clone())));
    }
    if managed.group.is_some() {
        state.insert("group".to_string(), json!(current.map(|s| s.group.clone())));
    }
    state
}

/// Target state for the managed attributes.
fn target_state(managed: &ResolvedAttrs, sha256: Option<Value>) -> StateMap {
    let mut state = StateMap::new();
    state.insert("exists".to_string(), json!(true));
    if let Some(hash) = sha256 {
        state.insert("sha256".to_string(), hash);
    }
    state.insert("mode".to_string(), json!(managed.mode));
    if let Some(owner) = &managed.owner {
        state.insert("owner".to_string(), json!(owner));
    }
    if let Some(group) = &managed.group {
        state.insert("group".to_string(), json!(group));
    }
    state
}
