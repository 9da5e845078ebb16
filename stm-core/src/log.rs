//! The transaction log and its recording API.

use std::sync::Arc;

use crate::result::HookResult;
use crate::tvar::{ArcAny, TVarControlBlock};

cfg_if::cfg_if! {
    if #[cfg(feature = "hash-registers")] {
        use rustc_hash::FxHashMap;
        pub(crate) type RegisterMap = FxHashMap<u64, (Arc<TVarControlBlock>, ArcAny)>;
    } else {
        use std::collections::BTreeMap;
        pub(crate) type RegisterMap = BTreeMap<u64, (Arc<TVarControlBlock>, ArcAny)>;
    }
}

pub(crate) type BeforeHook = Box<dyn FnOnce() -> HookResult + Send>;
pub(crate) type AfterHook = Box<dyn FnOnce() -> HookResult + Send>;

/// Lifecycle state of a [`TLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Open,
    Committing,
    Committed,
    Aborted,
}

/// A transaction's log: the read set, write set, hook sequences, and
/// bookkeeping the commit engine consumes.
///
/// Each `TLog` is owned by the thread that created it for its entire
/// lifetime and is consumed by exactly one call to
/// [`crate::commit`] or [`crate::commit_nested`].
pub struct TLog {
    pub(crate) reads: RegisterMap,
    pub(crate) writes: RegisterMap,
    pub(crate) before_commit: Vec<Option<BeforeHook>>,
    pub(crate) after_commit: Vec<Option<AfterHook>>,
    pub(crate) changed: Vec<Arc<TVarControlBlock>>,
    state: LogState,
}

impl Default for TLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TLog {
    /// Create a new, empty top-level log.
    pub fn new() -> TLog {
        TLog {
            reads: RegisterMap::default(),
            writes: RegisterMap::default(),
            before_commit: Vec::new(),
            after_commit: Vec::new(),
            changed: Vec::new(),
            state: LogState::Open,
        }
    }

    /// Create a nested log as a snapshot-copy of `parent`'s current reads
    /// and writes. The nested block sees and mutates this copy;
    /// [`crate::commit_nested`] later folds it back into `parent`.
    pub fn new_nested(parent: &TLog) -> TLog {
        TLog {
            reads: parent.reads.clone(),
            writes: parent.writes.clone(),
            before_commit: Vec::new(),
            after_commit: Vec::new(),
            changed: Vec::new(),
            state: LogState::Open,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LogState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LogState) {
        self.state = state;
    }

    /// Record a read of `tv`. Repeatable: a TVar already in the read set
    /// returns its previously recorded value instead of re-sampling.
    pub(crate) fn read_raw(&mut self, tv: &Arc<TVarControlBlock>) -> ArcAny {
        if let Some((_, value)) = self.reads.get(&tv.id()) {
            return value.clone();
        }
        let value = tv.raw_value();
        self.reads.insert(tv.id(), (tv.clone(), value.clone()));
        value
    }

    /// Record a write of `tv`, overwriting any prior intended value.
    pub(crate) fn write_raw(&mut self, tv: &Arc<TVarControlBlock>, value: ArcAny) {
        self.writes.insert(tv.id(), (tv.clone(), value));
    }

    /// Register a before-commit hook. Hooks run in registration order; a
    /// hook may itself register further hooks, which are observed and run
    /// within the same commit attempt.
    pub fn call_before_commit<F>(&mut self, f: F)
    where
        F: FnOnce() -> HookResult + Send + 'static,
    {
        self.before_commit.push(Some(Box::new(f)));
    }

    /// Register an after-commit hook. See [`TLog::call_before_commit`] for
    /// the append-during-iteration guarantee.
    pub fn call_after_commit<F>(&mut self, f: F)
    where
        F: FnOnce() -> HookResult + Send + 'static,
    {
        self.after_commit.push(Some(Box::new(f)));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tvar::TVar;

    #[test]
    fn read_is_repeatable() {
        let mut log = TLog::new();
        let var = TVar::new(10);
        assert_eq!(var.read(&mut log), 10);
        // change the committed value behind the log's back; the log must
        // keep returning its first snapshot.
        assert!(var.control_block().try_lock());
        var.control_block().set_version_and_value(1, Arc::new(99));
        var.control_block().unlock();
        assert_eq!(var.read(&mut log), 10);
    }

    #[test]
    fn write_overwrites_prior_intent() {
        let mut log = TLog::new();
        let var = TVar::new(0);
        var.write(&mut log, 1);
        var.write(&mut log, 2);
        assert_eq!(log.writes.len(), 1);
    }

    #[test]
    fn nested_log_snapshots_parent_reads_and_writes() {
        let mut parent = TLog::new();
        let a = TVar::new(1);
        let b = TVar::new(2);
        a.read(&mut parent);
        b.write(&mut parent, 5);

        let child = TLog::new_nested(&parent);
        assert_eq!(child.reads.len(), 1);
        assert_eq!(child.writes.len(), 1);
    }
}
