//! Integration tests for the transaction engine
//!
//! These tests drive transactions the way tasks do, through both the scoped
//! `run` API and explicit `begin`/`end`, and check:
//! - protocol enforcement (one start, one result, matching state keys)
//! - the completed record and its `changed` flag
//! - the single report line per finalized transaction
//! - the distinction between failed transactions and logic errors

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;

use siteform::connection::RemoteExecError;
use siteform::error::{Error, LogicError, Result};
use siteform::host::HostContext;
use siteform::transaction::{state_map, ActiveTransaction, Transaction};

async fn create_srv(tx: &mut ActiveTransaction, host: &HostContext) -> Result<()> {
    let exists = host.exec(&["test", "-d", "/srv"], None).await?.success();
    tx.initial_state([("exists", exists)])?;
    if !exists {
        host.exec_checked(&["mkdir", "/srv"], None).await?;
    }
    tx.final_state([("exists", true)])?;
    tx.success()?;
    Ok(())
}

async fn forget_result(tx: &mut ActiveTransaction, _host: &HostContext) -> Result<()> {
    tx.initial_state([("exists", false)])?;
    tx.final_state([("exists", true)])?;
    Ok(())
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_unchanged_transaction() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "mode /etc/motd");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("mode", "644")]).unwrap();
    active.unchanged().unwrap();
    let completed = transaction.end(active, Ok(())).unwrap();

    assert!(completed.success());
    assert!(!completed.changed());
    assert_eq!(completed.final_state(), &state_map([("mode", "644")]));
    assert_eq!(
        reporter.lines(),
        vec!["[·] mode /etc/motd  mode: 644 (unchanged)"]
    );
}

#[test]
fn test_changed_transaction() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "dir /srv");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("exists", false)]).unwrap();
    active.final_state([("exists", true)]).unwrap();
    active.success().unwrap();
    let completed = transaction.end(active, Ok(())).unwrap();

    assert!(completed.success());
    assert!(completed.changed());
    assert_eq!(reporter.lines(), vec!["[+] dir /srv  exists: false → true"]);
}

#[test]
fn test_failure_without_final_state_is_logic_error() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "chmod");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("mode", "644")]).unwrap();
    active.failure("permission denied").unwrap();

    let err = transaction.end(active, Ok(())).unwrap_err();
    assert!(err.is_logic_error());
    assert!(err.as_transaction_error().is_none());
    assert!(matches!(
        err,
        Error::Logic(LogicError::MissingFinalState(ref name)) if name == "chmod"
    ));
    assert!(reporter.lines().is_empty());
}

#[test]
fn test_key_mismatch_is_logic_error_for_any_verdict() {
    let mock = MockExecutor::new("web1");
    let (host, _) = mock_host(&mock);

    for succeed in [true, false] {
        let mut transaction = Transaction::new(&host, "keys");
        let mut active = transaction.begin().unwrap();
        active.initial_state([("a", 1), ("b", 2)]).unwrap();
        active.final_state([("a", 1)]).unwrap();
        if succeed {
            active.success().unwrap();
        } else {
            active.failure("nope").unwrap();
        }

        let err = transaction.end(active, Ok(())).unwrap_err();
        match err {
            Error::Logic(LogicError::KeyMismatch {
                initial,
                final_keys,
                ..
            }) => {
                assert_eq!(initial, vec!["a", "b"]);
                assert_eq!(final_keys, vec!["a"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn test_long_values_are_cut_for_display_only() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);
    let before = "a".repeat(29) + "b";
    let after = "a".repeat(29) + "c";

    let mut transaction = Transaction::new(&host, "hash");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("sha256", before.as_str())]).unwrap();
    active.final_state([("sha256", after.as_str())]).unwrap();
    active.success().unwrap();
    let completed = transaction.end(active, Ok(())).unwrap();

    assert!(completed.changed());
    let shown = format!("{}…", "a".repeat(16));
    assert_eq!(
        reporter.lines(),
        vec![format!("[+] hash  sha256: {} → {}", shown, shown)]
    );
}

// ============================================================================
// Verdicts
// ============================================================================

#[test]
fn test_failure_raises_transaction_error_after_report() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "file /etc/shadow");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("mode", "600")]).unwrap();
    active.final_state([("mode", "600")]).unwrap();
    active
        .failure_with("permission denied", [("attempts", 3)])
        .unwrap();

    let err = transaction.end(active, Ok(())).unwrap_err();
    let failed = err.as_transaction_error().expect("transaction error");
    assert_eq!(failed.host, "test-host");
    assert_eq!(failed.name, "file /etc/shadow");
    assert_eq!(failed.reason(), "permission denied");
    assert_eq!(failed.completed.get("attempts"), Some(&json!(3)));
    assert!(!failed.completed.success());
    assert_eq!(err.exit_code(), 2);
    assert_eq!(
        reporter.lines(),
        vec!["[!] file /etc/shadow  mode: 600 (unchanged)"]
    );
}

#[test]
fn test_extra_values_are_kept_apart_from_state() {
    let mock = MockExecutor::new("web1");
    let (host, _) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "extra");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("exists", false)]).unwrap();
    active.final_state([("exists", true)]).unwrap();
    active.success_with([("sha256", "abc")]).unwrap();
    let completed = transaction.end(active, Ok(())).unwrap();

    assert_eq!(completed.get("sha256"), Some(&json!("abc")));
    assert_eq!(completed.get("exists"), None);
    assert_eq!(completed.final_state().len(), 1);
}

#[test]
fn test_state_order_does_not_affect_changed() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "order");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("a", 1), ("b", 2)]).unwrap();
    active.final_state([("b", 2), ("a", 1)]).unwrap();
    active.success().unwrap();
    let completed = transaction.end(active, Ok(())).unwrap();

    assert!(!completed.changed());
    assert_eq!(
        reporter.lines(),
        vec!["[·] order  b: 2 (unchanged)  a: 1 (unchanged)"]
    );
}

// ============================================================================
// Protocol violations
// ============================================================================

#[test]
fn test_double_completion() {
    let mock = MockExecutor::new("web1");
    let (host, _) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "twice");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("a", 1)]).unwrap();
    active.final_state([("a", 1)]).unwrap();
    active.failure("first").unwrap();
    assert!(matches!(active.success(), Err(LogicError::CompletedTwice)));
    assert!(matches!(
        active.failure("second"),
        Err(LogicError::CompletedTwice)
    ));

    let err = transaction.end(active, Ok(())).unwrap_err();
    assert_eq!(err.as_transaction_error().map(|e| e.reason()), Some("first"));
}

#[test]
fn test_missing_result_is_logic_error() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "no verdict");
    let mut active = transaction.begin().unwrap();
    active.initial_state([("a", 1)]).unwrap();
    active.final_state([("a", 1)]).unwrap();

    let err = transaction.end(active, Ok(())).unwrap_err();
    assert!(matches!(
        err,
        Error::Logic(LogicError::MissingResult { source: None, .. })
    ));
    assert_eq!(err.exit_code(), 70);
    assert!(reporter.lines().is_empty());
}

#[test]
fn test_missing_initial_state_is_logic_error() {
    let mock = MockExecutor::new("web1");
    let (host, _) = mock_host(&mock);

    let mut transaction = Transaction::new(&host, "no initial");
    let mut active = transaction.begin().unwrap();
    active.final_state([("a", 1)]).unwrap();
    active.success().unwrap();

    assert!(matches!(
        transaction.end(active, Ok(())),
        Err(Error::Logic(LogicError::MissingInitialState(_)))
    ));
}

// ============================================================================
// Scoped execution
// ============================================================================

#[tokio::test]
async fn test_run_creates_missing_directory() {
    let mock = MockExecutor::new("web1");
    mock.respond("test -d /srv", exit_with(1, ""));
    let (host, reporter) = mock_host(&mock);

    let completed = host
        .transaction("dir /srv")
        .run(|tx, host| Box::pin(create_srv(tx, host)))
        .await
        .unwrap();

    assert!(completed.changed());
    assert!(mock.ran("mkdir"));
    assert_eq!(reporter.lines(), vec!["[+] dir /srv  exists: false → true"]);
}

#[tokio::test]
async fn test_run_twice_is_logic_error() {
    let mock = MockExecutor::new("web1");
    let (host, reporter) = mock_host(&mock);

    let mut transaction = host.transaction("dir /srv");
    transaction
        .run(|tx, host| Box::pin(create_srv(tx, host)))
        .await
        .unwrap();
    let err = transaction
        .run(|tx, host| Box::pin(create_srv(tx, host)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Logic(LogicError::AlreadyStarted)));
    assert_eq!(reporter.lines().len(), 1);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_run_without_verdict_is_logic_error() {
    let mock = MockExecutor::new("web1");
    let (host, _) = mock_host(&mock);

    let err = host
        .transaction("forgetful")
        .run(|tx, host| Box::pin(forget_result(tx, host)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Logic(LogicError::MissingResult { ref name, .. }) if name == "forgetful"
    ));
}

#[tokio::test]
async fn test_executor_error_surfaces_as_missing_result() {
    let mock = MockExecutor::new("web1");
    mock.fail("test -d /srv", || {
        RemoteExecError::ConnectionFailed("host unreachable".to_string())
    });
    let (host, reporter) = mock_host(&mock);

    let err = host
        .transaction("dir /srv")
        .run(|tx, host| Box::pin(create_srv(tx, host)))
        .await
        .unwrap_err();

    match err {
        Error::Logic(LogicError::MissingResult { source, .. }) => {
            assert!(matches!(
                source.as_deref(),
                Some(Error::Remote(RemoteExecError::ConnectionFailed(_)))
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(reporter.lines().is_empty());
}

#[tokio::test]
async fn test_run_with_inline_body() {
    let mock = MockExecutor::new("web1");
    mock.respond("cat /etc/hostname", ok_stdout("web1\n"));
    let (host, reporter) = mock_host(&mock);

    let completed = host
        .transaction("hostname")
        .run(|tx, host| {
            Box::pin(async move {
                let current = host.exec_checked(&["cat", "/etc/hostname"], None).await?;
                let name = current.stdout_lossy().trim().to_string();
                tx.initial_state([("hostname", name.as_str())])?;
                tx.unchanged()?;
                Ok::<(), Error>(())
            })
        })
        .await
        .unwrap();

    assert!(!completed.changed());
    assert_eq!(
        reporter.lines(),
        vec!["[·] hostname  hostname: web1 (unchanged)"]
    );
}
