//! # siteform - Transactional Host Configuration
//!
//! siteform brings hosts to a declared state over a plain command channel. Every
//! change is wrapped in a transaction that records what the host looked like
//! before, what it looks like after, and whether the attempt succeeded.
//!
//! ## Core Concepts
//!
//! - **Transactions**: Scoped, single-use records of one state-change attempt
//! - **Host context**: The executor, reporter and mode used to reach one host
//! - **Executors**: Run argv vectors on a host (local processes or the `ssh` client)
//! - **Tasks**: Transaction clients that manage directories, files and absent paths
//! - **Reporter**: Renders one line per finished transaction
//! - **Sites**: Hosts and the resources declared for them
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                             │
//! │                    (clap-based command parsing)                     │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Site Runner (per host)                         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │      Tasks      │──▶│    Transactions     │──▶│      Reporter       │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 Remote Executor (local, ssh client)                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use siteform::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let host = HostContext::new("local", Arc::new(LocalExecutor::new()));
//!
//!     tasks::directory(&host, "/tmp/app", &FileAttrs::new().with_mode("750")).await?;
//!     let completed = tasks::file(&host, "/tmp/app/motd", "hello\n", &FileAttrs::new()).await?;
//!
//!     println!("changed: {}", completed.changed());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Executors
    pub use crate::connection::{
        ExecResult, ExecutionResult, LocalExecutor, RemoteExecError, RemoteExecutor, SshExecutor,
    };

    // Error handling
    pub use crate::error::{Error, ErrorContext, LogicError, Result, TransactionError};

    // Transactions
    pub use crate::host::HostContext;
    pub use crate::report::{CapturingReporter, ConsoleReporter, Reporter};
    pub use crate::transaction::{
        state_map, ActiveTransaction, CompletedTransaction, StateMap, Transaction,
    };

    // Tasks and sites
    pub use crate::config::Config;
    pub use crate::secrets::{EnvSecretStore, MapSecretStore, SecretStore};
    pub use crate::site::{HostEntry, Resource, RunSummary, Site, SiteRunner};
    pub use crate::tasks::{self, FileAttrs, FileType, RemoteStat};
}

pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod report;
pub mod secrets;
pub mod site;
pub mod tasks;
pub mod transaction;

pub use error::{Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
