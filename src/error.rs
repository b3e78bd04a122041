//! Error types for siteform.
//!
//! Two error kinds must never be confused:
//!
//! - [`TransactionError`]: an operational failure. A task could not bring the host
//!   into the desired state for an expected reason (permission denied, a conflicting
//!   file type, ...). It carries the full [`CompletedTransaction`].
//! - [`LogicError`]: the transaction protocol was used incorrectly by task code.
//!   These are programming defects and are always fatal.

use std::path::PathBuf;
use thiserror::Error;

use crate::connection::RemoteExecError;
use crate::transaction::CompletedTransaction;

/// Result type alias for siteform operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for siteform.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transaction Errors
    // ========================================================================
    /// The transaction protocol was violated by task code.
    #[error(transparent)]
    Logic(#[from] LogicError),

    /// A transaction completed with a failure verdict.
    #[error(transparent)]
    TransactionFailed(Box<TransactionError>),

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Executing a command on the host failed.
    #[error(transparent)]
    Remote(#[from] RemoteExecError),

    // ========================================================================
    // Site / Configuration Errors
    // ========================================================================
    /// Host not found in the site description.
    #[error("Unknown host '{0}'")]
    HostNotFound(String),

    /// Secret lookup failed.
    #[error("Secret '{key}' unavailable: {message}")]
    Secret {
        /// Secret key
        key: String,
        /// Error message
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new secret lookup error.
    pub fn secret(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Secret {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error signals a bug in task code.
    pub fn is_logic_error(&self) -> bool {
        matches!(self, Error::Logic(_))
    }

    /// Returns the failed transaction if this is an operational failure.
    pub fn as_transaction_error(&self) -> Option<&TransactionError> {
        match self {
            Error::TransactionFailed(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::TransactionFailed(_) => 2,
            Error::Remote(_) => 3,
            Error::Config(_)
            | Error::InvalidConfig { .. }
            | Error::YamlParse(_)
            | Error::TomlParse(_)
            | Error::FileNotFound(_) => 4,
            Error::HostNotFound(_) => 5,
            Error::Logic(_) => 70,
            _ => 1,
        }
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::TransactionFailed(Box::new(err))
    }
}

/// Violations of the transaction protocol.
#[derive(Error, Debug)]
pub enum LogicError {
    /// `begin` was called twice on the same transaction.
    #[error("A transaction may only be started once")]
    AlreadyStarted,

    /// State was recorded after the result was set.
    #[error("A transaction cannot be altered after it is completed")]
    AlreadyCompleted,

    /// `unchanged` was called before any initial state was recorded.
    #[error("A transaction cannot be unchanged without an initial state")]
    UnchangedWithoutInitialState,

    /// `success` or `failure` was called a second time.
    #[error("A transaction cannot be completed multiple times")]
    CompletedTwice,

    /// The body never called `success` or `failure`.
    #[error("Transaction '{name}' cannot be completed without a result status")]
    MissingResult {
        /// Transaction name
        name: String,
        /// Error that left the body before a result was set
        #[source]
        source: Option<Box<Error>>,
    },

    /// No initial state was recorded.
    #[error("Transaction '{0}' cannot be completed without an initial state")]
    MissingInitialState(String),

    /// No final state was recorded.
    #[error("Transaction '{0}' cannot be completed without a final state")]
    MissingFinalState(String),

    /// Initial and final state were recorded with different fields.
    #[error(
        "Transaction '{name}': initial and final state must have the same keys (initial: {initial:?}, final: {final_keys:?})"
    )]
    KeyMismatch {
        /// Transaction name
        name: String,
        /// Keys of the initial state
        initial: Vec<String>,
        /// Keys of the final state
        final_keys: Vec<String>,
    },
}

/// A transaction that completed with a failure verdict.
#[derive(Error, Debug, Clone)]
#[error("Transaction '{name}' failed on '{host}': {}", self.reason())]
pub struct TransactionError {
    /// Host the transaction ran against
    pub host: String,
    /// Transaction name
    pub name: String,
    /// The completed (failed) transaction
    pub completed: CompletedTransaction,
}

impl TransactionError {
    /// The failure reason recorded by the task.
    pub fn reason(&self) -> &str {
        self.completed.failure_reason().unwrap_or("unknown reason")
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}
