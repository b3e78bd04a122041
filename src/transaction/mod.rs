//! Transaction engine.
//!
//! A transaction is an operational unit that moves a host from an observed
//! initial state to a known target state. Tasks wrap every remote mutation in
//! one:
//!
//! 1. examine the host and record the initial state,
//! 2. apply whatever change is needed and record the final state,
//! 3. complete the transaction with [`ActiveTransaction::success`] or
//!    [`ActiveTransaction::failure`].
//!
//! When the scope ends the transaction is finalized exactly once: the protocol
//! is validated, one report line is rendered, and a failure verdict is raised
//! as [`Error::TransactionFailed`].
//!
//! # Example
//!
//! ```rust,ignore
//! use siteform::transaction::Transaction;
//!
//! let completed = Transaction::new(&host, "dir: /etc/app")
//!     .run(|tx, host| {
//!         Box::pin(async move {
//!             let exists = host.exec(&["test", "-d", "/etc/app"], None).await?.success();
//!             tx.initial_state([("exists", exists)])?;
//!             if !exists {
//!                 host.exec_checked(&["mkdir", "/etc/app"], None).await?;
//!             }
//!             tx.final_state([("exists", true)])?;
//!             tx.success()?;
//!             Ok(())
//!         })
//!     })
//!     .await?;
//! ```

mod completed;

pub use completed::{state_map, CompletedTransaction, StateMap};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, LogicError, Result, TransactionError};
use crate::host::HostContext;

/// A single-use, scoped unit of work against one host.
///
/// The host context is borrowed for the lifetime of the transaction and never
/// retained past it.
#[derive(Debug)]
pub struct Transaction<'h> {
    host: &'h HostContext,
    name: String,
    started: bool,
}

impl<'h> Transaction<'h> {
    /// Create a transaction named `name` against `host`
    pub fn new(host: &'h HostContext, name: impl Into<String>) -> Self {
        Self {
            host,
            name: name.into(),
            started: false,
        }
    }

    /// Name used for reporting
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host this transaction runs against
    pub fn host(&self) -> &'h HostContext {
        self.host
    }

    /// Begin the transaction.
    ///
    /// A transaction may only be started once.
    pub fn begin(&mut self) -> std::result::Result<ActiveTransaction, LogicError> {
        if self.started {
            return Err(LogicError::AlreadyStarted);
        }
        self.started = true;
        debug!(host = %self.host.name(), transaction = %self.name, "Transaction started");
        Ok(ActiveTransaction::new())
    }

    /// Finalize `active` after its body finished with `outcome`.
    ///
    /// Consumes the active transaction, so it runs exactly once. If the body
    /// failed after a result was set, the transaction is still reported and the
    /// body error is returned afterwards. A finalize error takes precedence.
    pub fn end(&self, active: ActiveTransaction, outcome: Result<()>) -> Result<CompletedTransaction> {
        match outcome {
            Ok(()) => active.finalize_with_cause(self.host, &self.name, None),
            Err(err) if active.is_completed() => {
                active.finalize_with_cause(self.host, &self.name, None)?;
                Err(err)
            }
            Err(err) => active.finalize_with_cause(self.host, &self.name, Some(err)),
        }
    }

    /// Run `body` inside the transaction scope.
    ///
    /// Finalization happens on every exit path of the body: normal return,
    /// early `?` return or any other error.
    pub async fn run<F>(&mut self, body: F) -> Result<CompletedTransaction>
    where
        F: for<'a> FnOnce(&'a mut ActiveTransaction, &'a HostContext) -> BoxFuture<'a, Result<()>>,
    {
        let mut active = self.begin()?;
        let outcome = body(&mut active, self.host).await;
        self.end(active, outcome)
    }
}

/// Completion verdict recorded by `success` or `failure`.
#[derive(Debug)]
struct Verdict {
    success: bool,
    failure_reason: Option<String>,
    extra: StateMap,
}

/// The mutable record of one state-change attempt.
///
/// Accumulates the initial state, the final state and exactly one result.
#[derive(Debug)]
pub struct ActiveTransaction {
    initial_state: Option<StateMap>,
    final_state: Option<StateMap>,
    result: Option<Verdict>,
    finalized: bool,
}

impl ActiveTransaction {
    fn new() -> Self {
        Self {
            initial_state: None,
            final_state: None,
            result: None,
            finalized: false,
        }
    }

    fn ensure_open(&self) -> std::result::Result<(), LogicError> {
        if self.result.is_some() {
            return Err(LogicError::AlreadyCompleted);
        }
        Ok(())
    }

    /// Record the observed initial state of the host.
    pub fn initial_state<K, V>(
        &mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> std::result::Result<(), LogicError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.ensure_open()?;
        self.initial_state = Some(state_map(fields));
        Ok(())
    }

    /// Record the (expected) final state of the host.
    pub fn final_state<K, V>(
        &mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> std::result::Result<(), LogicError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.ensure_open()?;
        self.final_state = Some(state_map(fields));
        Ok(())
    }

    /// The initial state recorded so far
    pub fn recorded_initial_state(&self) -> Option<&StateMap> {
        self.initial_state.as_ref()
    }

    /// Whether `success` or `failure` has been called
    pub fn is_completed(&self) -> bool {
        self.result.is_some()
    }

    /// Complete successfully with the final state equal to the initial state.
    pub fn unchanged(&mut self) -> std::result::Result<(), LogicError> {
        self.unchanged_with(StateMap::new())
    }

    /// Like [`unchanged`](Self::unchanged), storing extra result values.
    pub fn unchanged_with<K, V>(
        &mut self,
        extra: impl IntoIterator<Item = (K, V)>,
    ) -> std::result::Result<(), LogicError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.ensure_open()?;
        let initial = self
            .initial_state
            .clone()
            .ok_or(LogicError::UnchangedWithoutInitialState)?;
        self.final_state = Some(initial);
        self.complete(true, None, state_map(extra))
    }

    /// Complete the transaction with successful status.
    pub fn success(&mut self) -> std::result::Result<(), LogicError> {
        self.complete(true, None, StateMap::new())
    }

    /// Complete successfully, storing extra result values for the caller.
    pub fn success_with<K, V>(
        &mut self,
        extra: impl IntoIterator<Item = (K, V)>,
    ) -> std::result::Result<(), LogicError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.complete(true, None, state_map(extra))
    }

    /// Complete the transaction, marking it as failed with `reason`.
    pub fn failure(&mut self, reason: impl Into<String>) -> std::result::Result<(), LogicError> {
        self.complete(false, Some(reason.into()), StateMap::new())
    }

    /// Complete as failed, storing extra result values for the caller.
    pub fn failure_with<K, V>(
        &mut self,
        reason: impl Into<String>,
        extra: impl IntoIterator<Item = (K, V)>,
    ) -> std::result::Result<(), LogicError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.complete(false, Some(reason.into()), state_map(extra))
    }

    fn complete(
        &mut self,
        success: bool,
        failure_reason: Option<String>,
        extra: StateMap,
    ) -> std::result::Result<(), LogicError> {
        if self.result.is_some() {
            return Err(LogicError::CompletedTwice);
        }
        self.result = Some(Verdict {
            success,
            failure_reason,
            extra,
        });
        Ok(())
    }

    /// Validate the protocol, report the outcome and raise a failure verdict.
    pub fn finalize(self, host: &HostContext, name: &str) -> Result<CompletedTransaction> {
        self.finalize_with_cause(host, name, None)
    }

    fn finalize_with_cause(
        mut self,
        host: &HostContext,
        name: &str,
        cause: Option<Error>,
    ) -> Result<CompletedTransaction> {
        self.finalized = true;

        let verdict = self.result.take().ok_or_else(|| LogicError::MissingResult {
            name: name.to_string(),
            source: cause.map(Box::new),
        })?;
        let initial_state = self
            .initial_state
            .take()
            .ok_or_else(|| LogicError::MissingInitialState(name.to_string()))?;
        let final_state = self
            .final_state
            .take()
            .ok_or_else(|| LogicError::MissingFinalState(name.to_string()))?;

        let same_keys = initial_state.len() == final_state.len()
            && initial_state.keys().all(|k| final_state.contains_key(k));
        if !same_keys {
            return Err(LogicError::KeyMismatch {
                name: name.to_string(),
                initial: initial_state.keys().cloned().collect(),
                final_keys: final_state.keys().cloned().collect(),
            }
            .into());
        }

        let completed = CompletedTransaction::new(
            verdict.success,
            verdict.failure_reason,
            initial_state,
            final_state,
            verdict.extra,
        );
        host.report(name, &completed);

        if !completed.success() {
            return Err(TransactionError {
                host: host.name().to_string(),
                name: name.to_string(),
                completed,
            }
            .into());
        }
        Ok(completed)
    }
}

impl Drop for ActiveTransaction {
    fn drop(&mut self) {
        if !self.finalized {
            warn!("Transaction dropped before it was finalized");
        }
    }
}
