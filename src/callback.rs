// src/callback.rs

//! The observer contract a transaction drives
//!
//! The engine never prints. Everything a caller might want to surface —
//! lifecycle events, yes/no questions, per-target progress, download byte
//! counters, log lines — arrives through a [`CallbackSink`] owned by the
//! surrounding CLI, service, or test harness. All methods default to
//! no-ops (questions answer with their carried default), so a sink only
//! implements the categories it cares about. Callbacks are invoked
//! synchronously and must not re-enter the transaction that drives them.

/// Lifecycle events emitted during prepare and commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TransactionStart,
    TransactionDone,
    ResolveDepsStart,
    ResolveDepsDone,
    InterConflictsStart,
    InterConflictsDone,
    AddStart(String),
    AddDone(String),
    UpgradeStart(String),
    UpgradeDone(String),
    RemoveStart(String),
    RemoveDone(String),
    RetrieveStart(String),
    RetrieveDone(String),
}

impl Event {
    /// Short human-readable description of the event kind.
    pub fn describe(&self) -> &'static str {
        match self {
            Event::TransactionStart => "Starting transaction",
            Event::TransactionDone => "Transaction complete",
            Event::ResolveDepsStart => "Resolving dependencies",
            Event::ResolveDepsDone => "Done resolving dependencies",
            Event::InterConflictsStart => "Checking inter conflicts",
            Event::InterConflictsDone => "Done checking inter conflicts",
            Event::AddStart(_) => "Adding a package",
            Event::AddDone(_) => "Done adding a package",
            Event::UpgradeStart(_) => "Upgrading a package",
            Event::UpgradeDone(_) => "Done upgrading a package",
            Event::RemoveStart(_) => "Removing a package",
            Event::RemoveDone(_) => "Done removing a package",
            Event::RetrieveStart(_) => "Retrieving a package",
            Event::RetrieveDone(_) => "Done retrieving a package",
        }
    }
}

/// Questions the engine may put to the caller mid-operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    /// `first` conflicts with installed `second`; remove `second`?
    ConflictRemove { first: String, second: String },
    /// `new` replaces installed `old` during a system upgrade
    Replace { old: String, new: String },
    /// `name` is configured as a hold package; remove it anyway?
    RemoveHold { name: String },
}

impl Question {
    /// The answer a sink gives when it has no opinion.
    pub fn default_answer(&self) -> bool {
        match self {
            Question::ConflictRemove { .. } => false,
            Question::Replace { .. } => true,
            Question::RemoveHold { .. } => false,
        }
    }
}

/// Log severity forwarded through `on_log`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Debug,
}

/// Receiver for everything a transaction reports.
///
/// Progress state (last target and percentage seen) belongs to the sink
/// instance, not to the engine or any process-wide global.
pub trait CallbackSink {
    fn on_event(&mut self, event: &Event) {
        let _ = event;
    }

    fn on_question(&mut self, question: &Question) -> bool {
        question.default_answer()
    }

    fn on_progress(&mut self, target: &str, percent: u8, n_targets: usize, current: usize) {
        let _ = (target, percent, n_targets, current);
    }

    fn on_download(&mut self, filename: &str, transferred: u64, total: u64) {
        let _ = (filename, transferred, total);
    }

    fn on_log(&mut self, level: LogLevel, message: &str) {
        let _ = (level, message);
    }
}

/// Sink that ignores everything and answers questions with their default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl CallbackSink for NullSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_answers_defaults() {
        let mut sink = NullSink;
        assert!(!sink.on_question(&Question::ConflictRemove {
            first: "a".into(),
            second: "b".into(),
        }));
        assert!(sink.on_question(&Question::Replace {
            old: "a".into(),
            new: "b".into(),
        }));
    }

    #[test]
    fn test_event_description() {
        assert_eq!(
            Event::RemoveStart("foo".into()).describe(),
            "Removing a package"
        );
    }
}
