//! The top-level commit engine.

use std::sync::Arc;

use crate::current::CurrentGuard;
use crate::log::{LogState, RegisterMap, TLog};
use crate::result::{CommitError, CommitOutcome, HookError};
use crate::tvar::{ArcAny, TVarControlBlock};
use crate::validate::valid_and_unlocked;
use crate::version::GLOBAL_CLOCK;

/// Run the commit protocol for a top-level `log`, consuming it.
///
/// Returns `Ok(true)` if the transaction committed, `Ok(false)` if the
/// caller must re-execute the transaction against a fresh log. `Err`
/// surfaces a hook's user error or a contract violation.
pub fn commit(mut log: TLog) -> CommitOutcome {
    log.set_state(LogState::Committing);

    // Step 1: before-commit hooks, with the log rebound as "current" so
    // they can read/write through it and register further hooks.
    if let Err(err) = run_hooks(&mut log, HookPhase::Before) {
        log.set_state(LogState::Aborted);
        return match err {
            HookError::Rerun => Ok(false),
            HookError::User(e) => Err(CommitError::Hook(e)),
        };
    }

    // Step 2: read-only fast path.
    if log.writes.is_empty() {
        log.set_state(LogState::Committed);
        return finish(log);
    }

    // Step 3: lock the write set in the total order defined by `order`.
    let ordered = ordered_writes(&log.writes);
    let mut locked: Vec<Arc<TVarControlBlock>> = Vec::with_capacity(ordered.len());
    let mut lock_failed = false;
    for (tv, _) in &ordered {
        if tv.try_lock() {
            locked.push(tv.clone());
        } else {
            lock_failed = true;
            break;
        }
    }

    if lock_failed {
        release(&locked);
        log.set_state(LogState::Aborted);
        return Ok(false);
    }

    // Step 4: stamp a fresh version.
    let v_new = GLOBAL_CLOCK.incf();

    // Step 5: re-validate the read set under the write-set locks.
    let success = valid_and_unlocked(&log);

    // Step 6: write back, skipping identity-equal updates.
    if success {
        for (tv, intended) in &ordered {
            if !Arc::ptr_eq(&tv.raw_value(), intended) {
                tv.set_version_and_value(v_new, intended.clone());
                log.changed.push(tv.clone());
            }
        }
    }

    // Step 7: release locks unconditionally, regardless of outcome.
    release(&locked);

    log.set_state(if success {
        LogState::Committed
    } else {
        LogState::Aborted
    });

    if !success {
        return Ok(false);
    }

    // Step 8: notify waiters, then after-commit hooks.
    for tv in &log.changed {
        tv.notify_waiters_high_load();
    }

    finish(log)
}

/// Shared tail of the read-only fast path and the write-committing path:
/// run after-commit hooks and fold the result into the return value.
fn finish(mut log: TLog) -> CommitOutcome {
    match run_hooks(&mut log, HookPhase::After) {
        Ok(()) => Ok(true),
        Err(HookError::Rerun) => Err(CommitError::ContractViolation(
            "after-commit hook signalled rerun; only before-commit hooks may do that",
        )),
        Err(HookError::User(e)) => Err(CommitError::Hook(e)),
    }
}

#[derive(Clone, Copy)]
enum HookPhase {
    Before,
    After,
}

/// Walk a hook vector by index, rereading its length on every step so hooks
/// appended during the walk (by a hook itself, through the rebound "current
/// transaction") are observed and run.
fn run_hooks(log: &mut TLog, phase: HookPhase) -> Result<(), HookError> {
    let log_ptr: *mut TLog = log;
    // SAFETY: `log` is a valid, non-aliased `&mut TLog` on this thread for
    // the entire walk; the guard's lifetime matches this function's.
    let _guard = unsafe { CurrentGuard::bind(log_ptr) };

    let mut i = 0;
    loop {
        let hook = {
            let hooks: &mut Vec<Option<Box<dyn FnOnce() -> Result<(), HookError> + Send>>> =
                match phase {
                    HookPhase::Before => &mut log.before_commit,
                    HookPhase::After => &mut log.after_commit,
                };
            if i >= hooks.len() {
                break;
            }
            hooks[i]
                .take()
                .expect("hook slot consumed twice during commit")
        };
        hook()?;
        i += 1;
    }
    Ok(())
}

/// Sort the write set into the total order the commit engine locks in,
/// per §4.B's `order(a, b)` contract.
fn ordered_writes(writes: &RegisterMap) -> Vec<(Arc<TVarControlBlock>, ArcAny)> {
    let mut records: Vec<_> = writes
        .values()
        .map(|(tv, value)| (tv.clone(), value.clone()))
        .collect();
    records.sort_by(|(a, _), (b, _)| crate::tvar::order(a, b));
    records
}

fn release(locked: &[Arc<TVarControlBlock>]) {
    for tv in locked.iter().rev() {
        tv.unlock();
    }
}
