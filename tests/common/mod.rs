//! Shared test utilities and fixtures for the siteform test suite.
//!
//! This module provides:
//! - A scripted [`MockExecutor`] that records every argv it receives
//! - Host context builders wired to a [`CapturingReporter`]
//! - Stat output helpers matching what the tasks parse
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use siteform::connection::{ExecResult, ExecutionResult, RemoteExecError, RemoteExecutor};
use siteform::host::HostContext;
use siteform::report::CapturingReporter;

type Responder = Box<dyn Fn() -> ExecResult<ExecutionResult> + Send + Sync>;

/// One recorded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Argument vector as passed to the executor
    pub argv: Vec<String>,
    /// Standard input, if any
    pub input: Option<Vec<u8>>,
}

impl RecordedCall {
    /// Arguments joined by single spaces
    pub fn line(&self) -> String {
        self.argv.join(" ")
    }
}

/// A mock executor for testing tasks and transactions.
///
/// Responses are scripted against a substring of the space-joined argv. Each
/// scripted response is used once, in the order it was added; commands with
/// no matching response succeed with empty output.
///
/// # Example
///
/// ```rust,ignore
/// let mock = MockExecutor::new("web1");
/// mock.respond("stat /etc/app", ok_stdout("directory;755;root;root\n"));
///
/// let host = mock_host(&mock);
/// let stat = siteform::tasks::stat(&host, "/etc/app").await?;
/// assert_eq!(mock.call_count(), 1);
/// ```
pub struct MockExecutor {
    identifier: String,
    calls: RwLock<Vec<RecordedCall>>,
    responses: RwLock<Vec<(String, Responder)>>,
}

impl MockExecutor {
    /// Create a new mock executor with the given identifier.
    pub fn new(identifier: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.into(),
            calls: RwLock::new(Vec::new()),
            responses: RwLock::new(Vec::new()),
        })
    }

    /// Script the result of the next command containing `pattern`.
    pub fn respond(&self, pattern: impl Into<String>, result: ExecutionResult) -> &Self {
        self.responses
            .write()
            .push((pattern.into(), Box::new(move || Ok(result.clone()))));
        self
    }

    /// Script an executor error for the next command containing `pattern`.
    pub fn fail(
        &self,
        pattern: impl Into<String>,
        error: impl Fn() -> RemoteExecError + Send + Sync + 'static,
    ) -> &Self {
        self.responses
            .write()
            .push((pattern.into(), Box::new(move || Err(error()))));
        self
    }

    /// Every command executed so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().clone()
    }

    /// Number of commands executed
    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    /// Whether any executed command starts with `program`
    pub fn ran(&self, program: &str) -> bool {
        self.calls
            .read()
            .iter()
            .any(|c| c.argv.first().map(String::as_str) == Some(program))
    }

    /// Scripted responses that were never used
    pub fn pending(&self) -> Vec<String> {
        self.responses.read().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        argv: &[String],
        input: Option<&[u8]>,
    ) -> ExecResult<ExecutionResult> {
        let call = RecordedCall {
            argv: argv.to_vec(),
            input: input.map(<[u8]>::to_vec),
        };
        let line = call.line();
        self.calls.write().push(call);

        let responder = {
            let mut responses = self.responses.write();
            responses
                .iter()
                .position(|(pattern, _)| line.contains(pattern.as_str()))
                .map(|index| responses.remove(index).1)
        };
        match responder {
            Some(respond) => respond(),
            None => Ok(ExecutionResult::new(0, Vec::new(), Vec::new())),
        }
    }
}

/// Successful result with `stdout`
pub fn ok_stdout(stdout: &str) -> ExecutionResult {
    ExecutionResult::new(0, stdout.as_bytes().to_vec(), Vec::new())
}

/// Failed result with exit `code` and `stderr`
pub fn exit_with(code: i32, stderr: &str) -> ExecutionResult {
    ExecutionResult::new(code, Vec::new(), stderr.as_bytes().to_vec())
}

/// Output of the stat helper for an existing path
pub fn stat_line(kind: &str, mode: &str, owner: &str, group: &str) -> ExecutionResult {
    ok_stdout(&format!("{};{};{};{}\n", kind, mode, owner, group))
}

/// Output of `sha256sum` for `path`
pub fn sha256_line(hash: &str, path: &str) -> ExecutionResult {
    ok_stdout(&format!("{}  {}\n", hash, path))
}

/// Host context on `executor` with a capturing reporter
pub fn mock_host(executor: &Arc<MockExecutor>) -> (HostContext, Arc<CapturingReporter>) {
    let reporter = Arc::new(CapturingReporter::new());
    let host = HostContext::new("test-host", executor.clone()).with_reporter(reporter.clone());
    (host, reporter)
}
