//! The immutable outcome of a transaction.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered mapping from field name to observed value.
///
/// Equality ignores insertion order; reports follow it.
pub type StateMap = IndexMap<String, Value>;

/// Build a [`StateMap`] from `(name, value)` pairs.
///
/// ```rust
/// use siteform::transaction::state_map;
///
/// let state = state_map([("exists", false)]);
/// assert_eq!(state["exists"], serde_json::json!(false));
/// ```
pub fn state_map<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> StateMap
where
    K: Into<String>,
    V: Into<Value>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Manifest of the initial and final state of one transaction.
///
/// Besides both snapshots it records the success status, a `changed` flag
/// (at least one field differs) and any extra values the task stored for its
/// caller, such as the hash of freshly uploaded content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CompletedRecord")]
pub struct CompletedTransaction {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    initial_state: StateMap,
    final_state: StateMap,
    changed: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    extra: StateMap,
}

/// Serialized form of a [`CompletedTransaction`].
///
/// `changed` is accepted but recomputed from the two snapshots.
#[derive(Deserialize)]
struct CompletedRecord {
    success: bool,
    #[serde(default)]
    failure_reason: Option<String>,
    initial_state: StateMap,
    final_state: StateMap,
    #[serde(default, rename = "changed")]
    _changed: Option<bool>,
    #[serde(default)]
    extra: StateMap,
}

impl TryFrom<CompletedRecord> for CompletedTransaction {
    type Error = String;

    fn try_from(record: CompletedRecord) -> Result<Self, Self::Error> {
        if record.success == record.failure_reason.is_some() {
            return Err("failure_reason must be present iff success is false".to_string());
        }
        Ok(Self::new(
            record.success,
            record.failure_reason,
            record.initial_state,
            record.final_state,
            record.extra,
        ))
    }
}

impl CompletedTransaction {
    pub(crate) fn new(
        success: bool,
        failure_reason: Option<String>,
        initial_state: StateMap,
        final_state: StateMap,
        extra: StateMap,
    ) -> Self {
        let changed = initial_state != final_state;
        Self {
            success,
            failure_reason,
            initial_state,
            final_state,
            changed,
            extra,
        }
    }

    /// Whether the task reached its target state
    pub fn success(&self) -> bool {
        self.success
    }

    /// Reason given by the task, present iff the transaction failed
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Observed state before any mutation
    pub fn initial_state(&self) -> &StateMap {
        &self.initial_state
    }

    /// State after the task ran
    pub fn final_state(&self) -> &StateMap {
        &self.final_state
    }

    /// `true` iff the final state differs from the initial state
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// All extra result values
    pub fn extra(&self) -> &StateMap {
        &self.extra
    }

    /// Look up one extra result value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
