//! Nested-commit merge and sibling read-set merge.

use std::sync::Arc;

use crate::log::{LogState, TLog};

/// Fold a nested log into its parent.
///
/// `parent`'s reads and writes are replaced outright by `child`'s (the
/// child was created as a snapshot-copy of the parent's, so this carries
/// forward anything the parent already had plus whatever the nested block
/// added). Hook sequences are appended, parent-first. Always succeeds;
/// nested commit is bookkeeping, not validation. The merged result is only
/// checked when the *parent* eventually commits.
///
/// Returns `child`, now inert (its storage may be recycled or dropped).
pub fn commit_nested(mut child: TLog, parent: &mut TLog) -> TLog {
    parent.reads = std::mem::take(&mut child.reads);
    parent.writes = std::mem::take(&mut child.writes);

    if parent.before_commit.is_empty() {
        parent.before_commit = std::mem::take(&mut child.before_commit);
    } else {
        parent.before_commit.extend(child.before_commit.drain(..));
    }

    if parent.after_commit.is_empty() {
        parent.after_commit = std::mem::take(&mut child.after_commit);
    } else {
        parent.after_commit.extend(child.after_commit.drain(..));
    }

    child.set_state(LogState::Committed);
    child
}

/// Merge two sibling logs' read sets (e.g. the two branches of an `orElse`
/// composition), for example so that blocking on one also subscribes the
/// other's reads.
///
/// Returns the surviving log, with `l2`'s reads folded in, or `None` if the
/// two logs disagree (by identity) on the value of a TVar they both read,
/// in which case they could not possibly both have observed a single
/// consistent snapshot.
pub fn merge_reads(mut l1: TLog, mut l2: TLog) -> Option<TLog> {
    // Merge the smaller read set into the larger one.
    if l2.reads.len() > l1.reads.len() {
        std::mem::swap(&mut l1, &mut l2);
    }

    if l2.reads.is_empty() {
        return Some(l1);
    }

    for (id, (tv, value)) in l2.reads {
        match l1.reads.get(&id) {
            None => {
                l1.reads.insert(id, (tv, value));
            }
            Some((_, existing)) => {
                if !Arc::ptr_eq(existing, &value) {
                    return None;
                }
            }
        }
    }

    Some(l1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tvar::TVar;

    #[test]
    fn commit_nested_carries_reads_writes_and_appends_hooks_parent_first() {
        let mut parent = TLog::new();
        let p_var = TVar::new(1);
        p_var.read(&mut parent);

        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let order = order.clone();
            parent.call_before_commit(move || {
                order.lock().unwrap().push("P1");
                Ok(())
            });
        }

        let mut child = TLog::new_nested(&parent);
        let c_var = TVar::new(2);
        c_var.write(&mut child, 3);
        {
            let order = order.clone();
            child.call_before_commit(move || {
                order.lock().unwrap().push("C1");
                Ok(())
            });
        }

        let _inert = commit_nested(child, &mut parent);

        assert_eq!(parent.reads.len(), 1);
        assert_eq!(parent.writes.len(), 1);
        assert_eq!(parent.before_commit.len(), 2);

        assert_eq!(crate::commit::commit(parent).unwrap(), true);
        assert_eq!(*order.lock().unwrap(), vec!["P1", "C1"]);
        assert_eq!(c_var.read_atomic(), 3);
    }

    #[test]
    fn merge_reads_succeeds_on_agreement_and_fails_on_conflict() {
        let shared = TVar::new(1);

        let mut l1 = TLog::new();
        shared.read(&mut l1);
        let mut l2 = TLog::new();
        shared.read(&mut l2);
        assert!(merge_reads(l1, l2).is_some());

        let mut l1 = TLog::new();
        shared.read(&mut l1);
        let mut l2 = TLog::new();
        shared.write(&mut l2, 99);
        // l2's "read" entry doesn't exist (it only wrote), so no conflict:
        // writes aren't part of the read-set merge.
        assert!(merge_reads(l1, l2).is_some());
    }

    #[test]
    fn merge_reads_detects_a_genuine_conflict() {
        let shared = TVar::new(1);

        let mut l1 = TLog::new();
        shared.read(&mut l1);

        // force l2 to have recorded a different value for the same TVar by
        // committing a write to it between the two reads.
        let mut writer = TLog::new();
        shared.write(&mut writer, 2);
        assert_eq!(crate::commit::commit(writer).unwrap(), true);

        let mut l2 = TLog::new();
        shared.read(&mut l2);

        assert!(merge_reads(l1, l2).is_none());
    }
}
