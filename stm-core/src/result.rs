//! Error taxonomy for the commit protocol.
//!
//! `ConflictAbort` has no variant of its own: it is simply `Ok(false)` coming
//! back from [`crate::commit`], the same as a lock-acquisition failure.

use std::error::Error as StdError;

/// A boxed, thread-safe user error, as returned from a before/after-commit hook.
pub type BoxedUserError = Box<dyn StdError + Send + Sync>;

/// Outcome of running a single before- or after-commit hook.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook observed that the transaction is no longer valid and is
    /// asking the commit engine to abandon this attempt.
    #[error("transaction invalidated; rerun requested")]
    Rerun,

    /// Any other error raised by user code running inside the hook.
    #[error(transparent)]
    User(#[from] BoxedUserError),
}

/// `HookResult` is what a before/after-commit callback returns.
pub type HookResult = Result<(), HookError>;

/// Failure modes of [`crate::commit`] that are not ordinary commit/abort
/// outcomes.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// A before- or after-commit hook raised a [`HookError::User`].
    #[error("hook raised an error")]
    Hook(#[source] BoxedUserError),

    /// A hook violated its contract, e.g. an after-commit hook signalled
    /// `Rerun`, which only before-commit hooks are allowed to do.
    #[error("hook contract violation: {0}")]
    ContractViolation(&'static str),
}

/// Result of [`crate::commit`].
///
/// `Ok(true)` and `Ok(false)` are the two ordinary outcomes; `Err` carries the
/// two non-recoverable taxonomy entries. Note that an `Err` returned
/// because an *after*-commit hook failed does not mean the transaction's
/// writes were rolled back. They were already published before the
/// after-commit hooks ran.
pub type CommitOutcome = Result<bool, CommitError>;
