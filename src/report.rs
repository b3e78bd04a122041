//! Transaction reporting.
//!
//! Every finalized transaction produces exactly one line:
//!
//! ```text
//! [+] dir: /etc/app  exists: false → true  mode: 755 (unchanged)
//! ```
//!
//! The marker is `+` for a successful change, `·` for a no-op and `!` for a
//! failure. Rendering is presentation only and never touches the transaction.

use colored::Colorize;
use parking_lot::Mutex;
use serde_json::Value;

use crate::transaction::CompletedTransaction;

/// Values longer than this many characters are cut for display.
pub const DISPLAY_LIMIT: usize = 16;

/// Status of a finalized transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    /// Completed successfully and changed the host
    Changed,
    /// Completed successfully without changes
    Ok,
    /// Completed with a failure verdict
    Failed,
}

impl ReportStatus {
    /// Classify a completed transaction
    pub fn of(completed: &CompletedTransaction) -> Self {
        match (completed.success(), completed.changed()) {
            (false, _) => ReportStatus::Failed,
            (true, true) => ReportStatus::Changed,
            (true, false) => ReportStatus::Ok,
        }
    }

    /// Marker character shown in brackets
    pub fn marker(&self) -> &'static str {
        match self {
            ReportStatus::Changed => "+",
            ReportStatus::Ok => "·",
            ReportStatus::Failed => "!",
        }
    }

    /// Get the plain string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Changed => "changed",
            ReportStatus::Ok => "ok",
            ReportStatus::Failed => "failed",
        }
    }

    fn colored_marker(&self) -> String {
        match self {
            ReportStatus::Changed => self.marker().green().to_string(),
            ReportStatus::Ok => self.marker().blue().to_string(),
            ReportStatus::Failed => self.marker().red().bold().to_string(),
        }
    }
}

/// Display form of a state value, cut to [`DISPLAY_LIMIT`] characters.
pub fn display_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > DISPLAY_LIMIT {
        let mut cut: String = text.chars().take(DISPLAY_LIMIT).collect();
        cut.push('…');
        cut
    } else {
        text
    }
}

/// Render the report line for one completed transaction.
pub fn render_line(name: &str, completed: &CompletedTransaction, use_color: bool) -> String {
    let status = ReportStatus::of(completed);
    let marker = if use_color {
        status.colored_marker()
    } else {
        status.marker().to_string()
    };

    let mut line = format!("[{}] {}", marker, name);
    for (key, final_value) in completed.final_state() {
        let initial_value = completed.initial_state().get(key);
        let before = initial_value.map(display_value).unwrap_or_default();

        line.push_str("  ");
        if initial_value == Some(final_value) {
            let field = format!("{}: {} (unchanged)", key, before);
            if use_color {
                line.push_str(&field.white().to_string());
            } else {
                line.push_str(&field);
            }
        } else {
            let field = format!("{}: {} → {}", key, before, display_value(final_value));
            if use_color {
                line.push_str(&field.yellow().to_string());
            } else {
                line.push_str(&field);
            }
        }
    }
    line
}

/// Consumer of finalized transactions.
pub trait Reporter: Send + Sync {
    /// Report one finalized transaction on `host`.
    fn report(&self, host: &str, name: &str, completed: &CompletedTransaction);
}

/// Writes report lines to standard output
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    use_color: bool,
}

impl ConsoleReporter {
    /// Create a new console reporter
    pub fn new(use_color: bool) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        Self { use_color }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, _host: &str, name: &str, completed: &CompletedTransaction) {
        println!("{}", render_line(name, completed, self.use_color));
    }
}

/// Keeps uncolored report lines in memory
#[derive(Debug, Default)]
pub struct CapturingReporter {
    lines: Mutex<Vec<String>>,
}

impl CapturingReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines reported so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Reporter for CapturingReporter {
    fn report(&self, _host: &str, name: &str, completed: &CompletedTransaction) {
        self.lines.lock().push(render_line(name, completed, false));
    }
}
