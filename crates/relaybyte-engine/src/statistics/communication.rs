//! Per-task statistics and run state.
//!
//! A [`Communication`] is written by the thread that owns the task and read
//! concurrently by reporters and by merges into task-group and job
//! aggregates. Counters and messages live in concurrent maps. State and
//! cause share one lock so a merge never exposes half of a transition.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use relaybyte_types::RunState;
use serde::Serialize;

/// A counter value. The kind is kept per key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CounterValue {
    Long(i64),
    Double(f64),
}

impl CounterValue {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_long(self) -> i64 {
        match self {
            Self::Long(v) => v,
            Self::Double(v) => v as i64,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_double(self) -> f64 {
        match self {
            Self::Long(v) => v as f64,
            Self::Double(v) => v,
        }
    }

    /// Sum two values: integer addition when both are `Long`, floating
    /// addition otherwise.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Long(a), Self::Long(b)) => Self::Long(a.wrapping_add(b)),
            (a, b) => Self::Double(a.as_double() + b.as_double()),
        }
    }
}

impl From<i64> for CounterValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for CounterValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

/// Terminal cause attached to a failed task. Cheap to clone and shared
/// between snapshots.
#[derive(Clone)]
pub struct Cause(Arc<anyhow::Error>);

impl Cause {
    #[must_use]
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    #[must_use]
    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether both handles point at the same error.
    #[must_use]
    pub fn same_as(&self, other: &Cause) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cause({:#})", self.0)
    }
}

#[derive(Debug, Clone, Default)]
struct Status {
    state: RunState,
    cause: Option<Cause>,
}

/// Mutable statistics and state of one task, task group or job.
pub struct Communication {
    counters: DashMap<String, CounterValue>,
    messages: DashMap<String, Vec<String>>,
    status: Mutex<Status>,
    timestamp: AtomicI64,
}

impl Communication {
    /// A running, zeroed communication stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            messages: DashMap::new(),
            status: Mutex::new(Status::default()),
            timestamp: AtomicI64::new(now_millis()),
        }
    }

    /// A zeroed communication starting in `state`.
    #[must_use]
    pub fn with_state(state: RunState) -> Self {
        let comm = Self::new();
        comm.status.lock().state = state;
        comm
    }

    /// Back to running, zero counters, no messages, no cause, fresh
    /// timestamp.
    pub fn reset(&self) {
        self.counters.clear();
        self.messages.clear();
        *self.status.lock() = Status::default();
        self.timestamp.store(now_millis(), Ordering::Release);
    }

    // ── Counters ────────────────────────────────────────────────────

    #[must_use]
    pub fn counter(&self, key: &str) -> Option<CounterValue> {
        self.counters.get(key).map(|v| *v)
    }

    /// Integer view of a counter, `0` when absent.
    #[must_use]
    pub fn long_counter(&self, key: &str) -> i64 {
        self.counter(key).map_or(0, CounterValue::as_long)
    }

    /// Floating view of a counter, `0.0` when absent.
    #[must_use]
    pub fn double_counter(&self, key: &str) -> f64 {
        self.counter(key).map_or(0.0, CounterValue::as_double)
    }

    pub fn set_long_counter(&self, key: &str, value: i64) {
        debug_assert!(!key.trim().is_empty(), "counter key must not be blank");
        self.counters.insert(key.to_string(), CounterValue::Long(value));
    }

    pub fn set_double_counter(&self, key: &str, value: f64) {
        debug_assert!(!key.trim().is_empty(), "counter key must not be blank");
        self.counters
            .insert(key.to_string(), CounterValue::Double(value));
    }

    /// Add `delta` to a counter; the result is an integer counter.
    pub fn increase_counter(&self, key: &str, delta: i64) {
        debug_assert!(!key.trim().is_empty(), "counter key must not be blank");
        self.counters
            .entry(key.to_string())
            .and_modify(|v| *v = CounterValue::Long(v.as_long().wrapping_add(delta)))
            .or_insert(CounterValue::Long(delta));
    }

    /// Sorted copy of every counter.
    #[must_use]
    pub fn counters(&self) -> BTreeMap<String, CounterValue> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    // ── Messages ────────────────────────────────────────────────────

    pub fn add_message(&self, key: &str, value: impl Into<String>) {
        self.messages
            .entry(key.to_string())
            .or_default()
            .push(value.into());
    }

    #[must_use]
    pub fn message(&self, key: &str) -> Vec<String> {
        self.messages
            .get(key)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Sorted copy of every message list.
    #[must_use]
    pub fn messages(&self) -> BTreeMap<String, Vec<String>> {
        self.messages
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    // ── State and cause ─────────────────────────────────────────────

    #[must_use]
    pub fn state(&self) -> RunState {
        self.status.lock().state
    }

    /// Move to `state` unless the current state is `Failed`.
    pub fn set_state(&self, state: RunState) {
        let mut status = self.status.lock();
        if status.state != RunState::Failed {
            status.state = state;
        }
    }

    /// Move to `state` unconditionally.
    pub fn force_state(&self, state: RunState) {
        self.status.lock().state = state;
    }

    #[must_use]
    pub fn cause(&self) -> Option<Cause> {
        self.status.lock().cause.clone()
    }

    /// Attach `cause` unless one is already attached.
    pub fn set_cause(&self, cause: Cause) {
        let mut status = self.status.lock();
        if status.cause.is_none() {
            status.cause = Some(cause);
        }
    }

    /// Replace the attached cause.
    pub fn force_cause(&self, cause: Cause) {
        self.status.lock().cause = Some(cause);
    }

    /// Rendered cause, empty when none is attached.
    #[must_use]
    pub fn cause_message(&self) -> String {
        self.cause().map(|c| c.to_string()).unwrap_or_default()
    }

    /// Mark the task failed and attach `error` as the cause if none is set,
    /// in one step.
    pub fn fail_with(&self, error: impl Into<anyhow::Error>) {
        let mut status = self.status.lock();
        status.state = RunState::Failed;
        if status.cause.is_none() {
            status.cause = Some(Cause::new(error));
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    // ── Timestamp ───────────────────────────────────────────────────

    /// Snapshot time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp.load(Ordering::Acquire)
    }

    pub fn set_timestamp(&self, millis: i64) {
        self.timestamp.store(millis, Ordering::Release);
    }

    /// Stamp with the current wall-clock time.
    pub fn touch(&self) {
        self.set_timestamp(now_millis());
    }

    // ── Merge ───────────────────────────────────────────────────────

    /// Fold `other` into `self`: counters are added, message lists
    /// appended, states combined, and `other`'s cause adopted when `self`
    /// has none. `other` is only read. Timestamps are left alone.
    ///
    /// Returns the merged state.
    pub fn merge_from(&self, other: &Communication) -> RunState {
        let counters: Vec<(String, CounterValue)> = other
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        for (key, value) in counters {
            self.counters
                .entry(key)
                .and_modify(|v| *v = v.add(value))
                .or_insert(value);
        }

        let messages: Vec<(String, Vec<String>)> = other
            .messages
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (key, values) in messages {
            self.messages.entry(key).or_default().extend(values);
        }

        let theirs = other.status.lock().clone();
        let mut status = self.status.lock();
        status.state = status.state.merge(theirs.state);
        if status.cause.is_none() {
            status.cause = theirs.cause;
        }
        status.state
    }

    /// Combined state with `other` without modifying either side.
    #[must_use]
    pub fn merged_state(&self, other: &Communication) -> RunState {
        self.state().merge(other.state())
    }
}

impl Default for Communication {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Communication {
    /// Deep copy: the clone shares no mutable storage with `self`.
    fn clone(&self) -> Self {
        let counters = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        let messages = self
            .messages
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        Self {
            counters,
            messages,
            status: Mutex::new(self.status.lock().clone()),
            timestamp: AtomicI64::new(self.timestamp()),
        }
    }
}

impl fmt::Debug for Communication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.lock().clone();
        f.debug_struct("Communication")
            .field("state", &status.state)
            .field("cause", &status.cause)
            .field("timestamp", &self.timestamp())
            .field("counters", &self.counters())
            .field("messages", &self.messages())
            .finish()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running_and_zeroed() {
        let comm = Communication::new();
        assert_eq!(comm.state(), RunState::Running);
        assert_eq!(comm.long_counter("anything"), 0);
        assert!(comm.cause().is_none());
        assert!(comm.timestamp() > 0);
    }

    #[test]
    fn counter_kind_follows_written_value() {
        let comm = Communication::new();
        comm.set_double_counter("ratio", 0.5);
        comm.set_long_counter("rows", 3);
        assert_eq!(comm.counter("ratio"), Some(CounterValue::Double(0.5)));
        assert_eq!(comm.counter("rows"), Some(CounterValue::Long(3)));

        comm.increase_counter("rows", 2);
        comm.increase_counter("fresh", 7);
        assert_eq!(comm.counter("rows"), Some(CounterValue::Long(5)));
        assert_eq!(comm.counter("fresh"), Some(CounterValue::Long(7)));
    }

    #[test]
    fn merge_adds_by_kind() {
        let a = Communication::new();
        let b = Communication::new();
        a.set_long_counter("rows", 10);
        b.set_long_counter("rows", 5);
        a.set_long_counter("mixed", 1);
        b.set_double_counter("mixed", 0.25);
        b.set_long_counter("only_b", 4);

        a.merge_from(&b);
        assert_eq!(a.counter("rows"), Some(CounterValue::Long(15)));
        assert_eq!(a.counter("mixed"), Some(CounterValue::Double(1.25)));
        assert_eq!(a.counter("only_b"), Some(CounterValue::Long(4)));
        assert_eq!(b.counter("rows"), Some(CounterValue::Long(5)));
    }

    #[test]
    fn merge_concatenates_messages() {
        let a = Communication::new();
        let b = Communication::new();
        a.add_message("warn", "first");
        b.add_message("warn", "second");
        b.add_message("warn", "second");
        a.merge_from(&b);
        assert_eq!(a.message("warn"), vec!["first", "second", "second"]);
    }

    #[test]
    fn merge_state_precedence() {
        let cases = [
            (RunState::Failed, RunState::Succeeded, RunState::Failed),
            (RunState::Succeeded, RunState::Killed, RunState::Failed),
            (RunState::Running, RunState::Succeeded, RunState::Running),
            (RunState::Succeeded, RunState::Succeeded, RunState::Succeeded),
        ];
        for (left, right, expected) in cases {
            let a = Communication::with_state(left);
            let b = Communication::with_state(right);
            assert_eq!(a.merge_from(&b), expected, "{left} + {right}");
        }
    }

    #[test]
    fn failed_is_not_downgraded_without_force() {
        let comm = Communication::new();
        comm.set_state(RunState::Failed);
        comm.set_state(RunState::Succeeded);
        assert_eq!(comm.state(), RunState::Failed);
        comm.force_state(RunState::Running);
        assert_eq!(comm.state(), RunState::Running);
    }

    #[test]
    fn first_cause_is_sticky() {
        let comm = Communication::new();
        comm.set_cause(Cause::new(anyhow::anyhow!("first")));
        comm.set_cause(Cause::new(anyhow::anyhow!("second")));
        assert_eq!(comm.cause_message(), "first");

        comm.force_cause(Cause::new(anyhow::anyhow!("forced")));
        assert_eq!(comm.cause_message(), "forced");
    }

    #[test]
    fn merge_adopts_cause_only_when_missing() {
        let a = Communication::new();
        let b = Communication::with_state(RunState::Failed);
        b.set_cause(Cause::new(anyhow::anyhow!("from b")));
        a.merge_from(&b);
        assert_eq!(a.cause_message(), "from b");

        let c = Communication::new();
        c.set_cause(Cause::new(anyhow::anyhow!("from c")));
        a.merge_from(&c);
        assert_eq!(a.cause_message(), "from b");
    }

    #[test]
    fn fail_with_sets_state_and_cause() {
        let comm = Communication::new();
        comm.fail_with(anyhow::anyhow!("disk full"));
        assert_eq!(comm.state(), RunState::Failed);
        assert!(comm.is_finished());
        assert_eq!(comm.cause_message(), "disk full");
    }

    #[test]
    fn clone_is_deep() {
        let live = Communication::new();
        live.set_long_counter("rows", 1);
        live.add_message("m", "a");
        let snapshot = live.clone();

        live.increase_counter("rows", 10);
        live.add_message("m", "b");
        live.force_state(RunState::Killed);

        assert_eq!(snapshot.long_counter("rows"), 1);
        assert_eq!(snapshot.message("m"), vec!["a"]);
        assert_eq!(snapshot.state(), RunState::Running);
        assert_eq!(snapshot.timestamp(), live.timestamp());
    }

    #[test]
    fn merge_into_self_doubles() {
        let comm = Communication::new();
        comm.set_long_counter("rows", 4);
        comm.merge_from(&comm);
        assert_eq!(comm.long_counter("rows"), 8);
    }

    #[test]
    fn reset_clears_everything() {
        let comm = Communication::new();
        comm.increase_counter("rows", 3);
        comm.add_message("m", "x");
        comm.fail_with(anyhow::anyhow!("boom"));
        comm.reset();
        assert_eq!(comm.state(), RunState::Running);
        assert!(comm.counters().is_empty());
        assert!(comm.messages().is_empty());
        assert!(comm.cause().is_none());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let comm = Arc::new(Communication::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let comm = Arc::clone(&comm);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        comm.increase_counter("rows", 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(comm.long_counter("rows"), 4000);
    }
}
