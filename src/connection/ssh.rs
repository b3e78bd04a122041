//! SSH executor
//!
//! Runs argument vectors on a remote host through the system `ssh` client. The
//! remote side receives a single shell-quoted command line, so arguments with
//! spaces or quotes arrive unchanged.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{run_process, ExecResult, ExecutionResult, RemoteExecError, RemoteExecutor};

/// Exit status the ssh client uses for its own errors.
const SSH_CONNECTION_ERROR: i32 = 255;

/// Executor for running commands on a remote host via ssh
#[derive(Debug, Clone)]
pub struct SshExecutor {
    /// ssh destination (`host` or `user@host`)
    destination: String,
    /// ssh client executable
    executable: String,
    /// Port override
    port: Option<u16>,
    /// Login user override
    user: Option<String>,
    /// Additional client arguments
    extra_args: Vec<String>,
    /// Per-command timeout
    timeout: Option<Duration>,
}

impl SshExecutor {
    /// Create a new executor for the given destination
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            executable: "ssh".to_string(),
            port: None,
            user: None,
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Set the ssh client executable
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the login user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Append client arguments
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args.extend(args);
        self
    }

    /// Bound every command by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to the ssh client for `argv`
    pub fn client_args(&self, argv: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra_args.len() + 6);
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(user) = &self.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(self.destination.clone());
        args.push(shell_words::join(argv));
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn identifier(&self) -> &str {
        &self.destination
    }

    async fn execute(
        &self,
        argv: &[String],
        input: Option<&[u8]>,
    ) -> ExecResult<ExecutionResult> {
        if argv.is_empty() {
            return Err(RemoteExecError::EmptyCommand);
        }
        debug!(host = %self.destination, command = ?argv, "Executing remote command");

        let mut cmd = Command::new(&self.executable);
        cmd.args(self.client_args(argv));
        let result = run_process(cmd, input, self.timeout).await?;

        if result.return_code == SSH_CONNECTION_ERROR {
            return Err(RemoteExecError::ConnectionFailed(format!(
                "{}: {}",
                self.destination,
                result.stderr_lossy().trim()
            )));
        }
        Ok(result)
    }
}
