//! `stm-core` is the transaction log lifecycle underneath a Software
//! Transactional Memory (STM) runtime: validation, two-phase commit with
//! lock ordering, nested transaction merge, and the pre/post-commit hook
//! protocol, together with the shared version counter and the minimal
//! contract for transactional variables (`TVar`) the commit protocol
//! consumes.
//!
//! This crate is deliberately *not* a full STM library. It does not provide
//! an atomic-block macro, a retry scheduler, or data structures layered on
//! top of `TVar` (queues, maps, ...). Those are the job of a driver crate
//! built on top of this one. What it guarantees is the hard part: that a
//! [`TLog`]'s read set can be validated against a consistent snapshot, that
//! its write set can be published atomically under a total lock order, and
//! that hooks registered mid-commit run exactly once, in order, even if they
//! enlist further hooks.
//!
//! # Usage sketch
//!
//! A driver constructs a [`TLog`], records reads and writes into it through
//! [`TVar::read`] and [`TVar::write`], then hands the log to [`commit`]:
//!
//! ```
//! use stm_core::{commit, TLog, TVar};
//!
//! let balance = TVar::new(100_i64);
//!
//! let mut log = TLog::new();
//! let current = balance.read(&mut log);
//! balance.write(&mut log, current - 10);
//!
//! assert_eq!(commit(log).unwrap(), true);
//! assert_eq!(balance.read_atomic(), 90);
//! ```
//!
//! A failed commit (`Ok(false)`) means another transaction committed a
//! conflicting write in the meantime; the driver is expected to build a
//! fresh `TLog` and re-run the transaction body.

mod commit;
mod current;
mod log;
mod nested;
mod result;
mod tvar;
mod validate;

pub mod version;

pub use crate::commit::commit;
pub use crate::current::with_current_transaction;
pub use crate::log::{LogState, TLog};
pub use crate::nested::{commit_nested, merge_reads};
pub use crate::result::{BoxedUserError, CommitError, CommitOutcome, HookError, HookResult};
pub use crate::tvar::{order, ArcAny, TVar, TVarControlBlock, Waker};
pub use crate::validate::{valid, valid_and_unlocked};

/// Register a before-commit hook on `log`. Equivalent to `log.call_before_commit(f)`.
pub fn call_before_commit<F>(f: F, log: &mut TLog)
where
    F: FnOnce() -> HookResult + Send + 'static,
{
    log.call_before_commit(f);
}

/// Register an after-commit hook on `log`. Equivalent to
/// `log.call_after_commit(f)`.
pub fn call_after_commit<F>(f: F, log: &mut TLog)
where
    F: FnOnce() -> HookResult + Send + 'static,
{
    log.call_after_commit(f);
}
