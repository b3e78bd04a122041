//! Remote execution layer.
//!
//! Every observation and mutation of host state goes through a [`RemoteExecutor`]:
//! given an argument vector and optional stdin bytes, it runs a command on the
//! target host and returns the exit code together with the raw output.
//!
//! # Supported Transports
//!
//! - **Local**: direct execution on the control node
//! - **SSH**: execution through the system `ssh` client
//!
//! A non-zero exit code is *not* an error at this layer; it is handed back to the
//! caller for interpretation. Only failures to reach the host or to start the
//! process are reported as [`RemoteExecError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use siteform::connection::{LocalExecutor, RemoteExecutor};
//!
//! let executor = LocalExecutor::new();
//! let argv = vec!["uname".to_string(), "-a".to_string()];
//! let result = executor.execute(&argv, None).await?;
//! println!("{}", result.stdout_lossy());
//! ```

/// Local execution on the control node.
pub mod local;

/// Execution through the system ssh client.
pub mod ssh;

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use crate::config::Config;
use crate::site::HostEntry;

pub use local::LocalExecutor;
pub use ssh::SshExecutor;

/// Errors that can occur while executing a command on a host.
#[derive(Error, Debug)]
pub enum RemoteExecError {
    /// Failed to establish a connection to the host.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The process could not be started or awaited.
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// A checked command exited with a non-zero code.
    #[error("Command '{command}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        /// The command line that was run
        command: String,
        /// Exit code
        code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The command did not finish in time.
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    /// An empty argument vector was passed.
    #[error("Cannot execute an empty command")]
    EmptyCommand,

    /// I/O error while talking to the process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for remote execution.
pub type ExecResult<T> = Result<T, RemoteExecError>;

/// The result of executing a command on a host.
///
/// # Example
///
/// ```rust
/// use siteform::connection::ExecutionResult;
///
/// let result = ExecutionResult::new(0, b"hello\n".to_vec(), Vec::new());
/// assert!(result.success());
/// assert_eq!(result.stdout_lossy().trim(), "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code of the command (0 typically indicates success).
    pub return_code: i32,
    /// Bytes written to standard output.
    pub stdout: Vec<u8>,
    /// Bytes written to standard error.
    pub stderr: Vec<u8>,
}

impl ExecutionResult {
    /// Create a new execution result
    pub fn new(return_code: i32, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            return_code,
            stdout,
            stderr,
        }
    }

    /// `true` if the exit code is 0
    pub fn success(&self) -> bool {
        self.return_code == 0
    }

    /// Standard output decoded lossily as UTF-8
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Executes commands on one target host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Identifier of the target (hostname or ssh destination)
    fn identifier(&self) -> &str;

    /// Execute `argv` on the host, feeding `input` to its standard input.
    async fn execute(&self, argv: &[String], input: Option<&[u8]>)
        -> ExecResult<ExecutionResult>;
}

/// Create the executor for a site host entry.
///
/// `ssh_host` values of `local` or `localhost` run on the control node.
pub fn connect(entry: &HostEntry, config: &Config) -> Arc<dyn RemoteExecutor> {
    let timeout = config.timeout();
    match entry.ssh_host.as_str() {
        "local" | "localhost" => Arc::new(LocalExecutor::new().with_timeout(timeout)),
        destination => {
            let port = entry.port.or(config.ssh.port);
            let mut executor = SshExecutor::new(destination)
                .with_executable(config.ssh.executable.clone())
                .with_extra_args(config.ssh.extra_args.clone())
                .with_timeout(timeout);
            if let Some(port) = port {
                executor = executor.with_port(port);
            }
            if let Some(user) = &config.ssh.user {
                executor = executor.with_user(user.clone());
            }
            Arc::new(executor)
        }
    }
}

/// Spawn `cmd`, feed `input`, and collect its output with an optional timeout.
///
/// Input is written while the output is collected, and the timeout covers both.
/// A process that exits without reading all of its input is judged by its exit
/// code, not by the broken pipe.
pub(crate) async fn run_process(
    mut cmd: Command,
    input: Option<&[u8]>,
    timeout: Option<Duration>,
) -> ExecResult<ExecutionResult> {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| RemoteExecError::ExecutionFailed(format!("Failed to spawn process: {}", e)))?;

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            match stdin.write_all(input).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    trace!(input_len = %input.len(), "Process closed stdin early");
                }
                Err(e) => {
                    return Err(RemoteExecError::ExecutionFailed(format!(
                        "Failed to write input: {}",
                        e
                    )))
                }
            }
            // Dropping stdin signals end of input.
        }
        Ok(())
    };
    let exchange = async move { tokio::join!(feed, child.wait_with_output()) };

    // The child is killed on drop when the timeout fires.
    let (fed, output) = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => return Err(RemoteExecError::Timeout(timeout.as_secs())),
        },
        None => exchange.await,
    };
    let output = output.map_err(|e| {
        RemoteExecError::ExecutionFailed(format!("Failed to wait for process: {}", e))
    })?;
    fed?;

    let return_code = output.status.code().unwrap_or(-1);
    trace!(
        return_code = %return_code,
        stdout_len = %output.stdout.len(),
        stderr_len = %output.stderr.len(),
        "Command completed"
    );

    Ok(ExecutionResult::new(return_code, output.stdout, output.stderr))
}
