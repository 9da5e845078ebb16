//! Thread-local binding of "the current transaction", rebound around
//! before/after-commit hook execution.
//!
//! Another well-known STM implementation's `standard::transaction` module keeps a
//! thread-local current-transaction cell in the same spirit, reaching into it
//! from nested calls the way this module's `with_current_transaction` does
//! (that teacher module separately uses an unsafe lifetime-extending transmute
//! for its per-thread read/write guard caches, not for the transaction cell
//! itself). Here a raw pointer bound for the hook walk's duration lets a
//! before/after-commit hook, a zero-argument callback that cannot be handed
//! `&mut TLog` directly, read and write the log that is mid-commit on its own
//! thread.

use std::cell::Cell;
use std::ptr;

use crate::log::TLog;

thread_local! {
    static CURRENT: Cell<*mut TLog> = const { Cell::new(ptr::null_mut()) };
}

/// RAII guard that rebinds the current thread's "current transaction" to a
/// log for the guard's lifetime, restoring the previous binding on drop.
/// Used by the commit engine around each hook walk.
pub(crate) struct CurrentGuard {
    previous: *mut TLog,
}

impl CurrentGuard {
    /// # Safety
    /// `log` must remain valid and must not move for the lifetime of the
    /// returned guard, and no other thread may dereference it concurrently.
    /// The commit engine upholds this by holding `log` on its own stack for
    /// the duration of the hook walk.
    pub(crate) unsafe fn bind(log: *mut TLog) -> CurrentGuard {
        let previous = CURRENT.with(|cell| cell.replace(log));
        CurrentGuard { previous }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|cell| cell.set(self.previous));
    }
}

/// Run `f` against the log currently bound on this thread.
///
/// # Panics
/// Panics if called outside of a before/after-commit hook (i.e. with no
/// transaction bound). Calling this from anywhere else is a contract
/// violation, not a recoverable error.
pub fn with_current_transaction<R>(f: impl FnOnce(&mut TLog) -> R) -> R {
    let ptr = CURRENT.with(Cell::get);
    assert!(
        !ptr.is_null(),
        "stm-core: with_current_transaction called with no transaction bound; \
         this is only valid from inside a before/after-commit hook"
    );
    // SAFETY: non-null only while a `CurrentGuard` is alive on this thread,
    // which guarantees the pointee is still valid for the call's duration.
    let log = unsafe { &mut *ptr };
    f(log)
}
