//! Local executor
//!
//! Runs argument vectors directly on the control node without any network
//! transport. Used for `localhost` hosts and for testing tasks against a
//! scratch directory.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{run_process, ExecResult, ExecutionResult, RemoteExecError, RemoteExecutor};

/// Executor for running commands on the current host
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    /// Identifier for this executor
    identifier: String,
    /// Per-command timeout
    timeout: Option<Duration>,
}

impl LocalExecutor {
    /// Create a new local executor named after the local hostname
    pub fn new() -> Self {
        let identifier = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());

        Self {
            identifier,
            timeout: None,
        }
    }

    /// Create a local executor with a custom identifier
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            timeout: None,
        }
    }

    /// Bound every command by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        argv: &[String],
        input: Option<&[u8]>,
    ) -> ExecResult<ExecutionResult> {
        let (program, args) = argv.split_first().ok_or(RemoteExecError::EmptyCommand)?;
        debug!(command = ?argv, "Executing local command");

        let mut cmd = Command::new(program);
        cmd.args(args);
        run_process(cmd, input, self.timeout).await
    }
}
