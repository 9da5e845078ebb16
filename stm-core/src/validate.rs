//! Read-set validation predicates.

use std::sync::Arc;

use crate::log::TLog;

/// `true` if every TVar in `log`'s read set still holds the value `log`
/// recorded on first read. Does not consult any locks.
pub fn valid(log: &TLog) -> bool {
    log.reads
        .values()
        .all(|(tv, recorded)| Arc::ptr_eq(&tv.raw_value(), recorded))
}

/// Like [`valid`], but additionally requires that no TVar in the read set is
/// locked by another thread. This is the check the commit engine runs under
/// write-set locks: it closes the race where a concurrent committer updates
/// a TVar this transaction read in between the read and this transaction's
/// own write-back.
pub fn valid_and_unlocked(log: &TLog) -> bool {
    log.reads.values().all(|(tv, recorded)| {
        Arc::ptr_eq(&tv.raw_value(), recorded) && tv.is_unlocked_by_other()
    })
}
