//! Host context: the live handle used by tasks to reach one host.

use std::fmt;
use std::sync::Arc;

use crate::connection::{ExecResult, ExecutionResult, RemoteExecError, RemoteExecutor};
use crate::report::{ConsoleReporter, Reporter};
use crate::transaction::{CompletedTransaction, Transaction};

/// Everything a task needs to observe and change one host.
///
/// Owned by the driver for the whole run against the host; transactions only
/// borrow it.
#[derive(Clone)]
pub struct HostContext {
    name: String,
    executor: Arc<dyn RemoteExecutor>,
    reporter: Arc<dyn Reporter>,
    pretend: bool,
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("name", &self.name)
            .field("executor", &self.executor.identifier())
            .field("pretend", &self.pretend)
            .finish()
    }
}

impl HostContext {
    /// Create a context for `name` reaching the host through `executor`
    pub fn new(name: impl Into<String>, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            name: name.into(),
            executor,
            reporter: Arc::new(ConsoleReporter::default()),
            pretend: false,
        }
    }

    /// Replace the reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Enable or disable pretend mode
    pub fn with_pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    /// Host identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether tasks should only report what they would do
    pub fn pretend(&self) -> bool {
        self.pretend
    }

    /// The executor reaching this host
    pub fn executor(&self) -> &Arc<dyn RemoteExecutor> {
        &self.executor
    }

    /// Start a new transaction against this host
    pub fn transaction(&self, name: impl Into<String>) -> Transaction<'_> {
        Transaction::new(self, name)
    }

    /// Execute a command; a non-zero exit code is returned to the caller.
    pub async fn exec<S>(&self, argv: &[S], input: Option<&[u8]>) -> ExecResult<ExecutionResult>
    where
        S: AsRef<str> + Sync,
    {
        let argv: Vec<String> = argv.iter().map(|s| s.as_ref().to_string()).collect();
        self.executor.execute(&argv, input).await
    }

    /// Execute a command that must exit with code 0.
    pub async fn exec_checked<S>(
        &self,
        argv: &[S],
        input: Option<&[u8]>,
    ) -> ExecResult<ExecutionResult>
    where
        S: AsRef<str> + Sync,
    {
        let result = self.exec(argv, input).await?;
        if !result.success() {
            let command: Vec<&str> = argv.iter().map(|s| s.as_ref()).collect();
            return Err(RemoteExecError::CommandFailed {
                command: shell_words::join(command),
                code: result.return_code,
                stderr: result.stderr_lossy().trim().to_string(),
            });
        }
        Ok(result)
    }

    pub(crate) fn report(&self, name: &str, completed: &CompletedTransaction) {
        self.reporter.report(&self.name, name, completed);
    }
}
