// Copyright 2015-2016 rust-stm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The TVar contract the commit engine is built against.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use crate::log::TLog;

/// Type-erased transactional value. STM semantics only ever depend on the
/// identity of a value, never its contents, so reads and writes are carried
/// around as `Arc<dyn Any + Send + Sync>` until a `TVar<T>` downcasts them.
pub type ArcAny = Arc<dyn Any + Send + Sync>;

static TVAR_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

static THREAD_TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = THREAD_TOKEN_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
}

fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// A handle woken by [`TVarControlBlock::notify_waiters_high_load`].
///
/// This is deliberately the entire retry-wakeup contract this core owns
/// there is no wait loop, no timeout, and no connection to the
/// `retry()` primitive here. Those live in the out-of-scope retry dispatcher.
pub trait Waker: Send + Sync {
    fn wake(&self);
}

/// `TVarControlBlock` holds the data a `TVar<T>` needs while erasing `T`.
///
/// The control block, not `TVar<T>`, is what the commit engine locks,
/// validates and publishes to. `TVar<T>` is just a type-safe handle around
/// an `Arc<TVarControlBlock>`, mirroring the split other STM implementations draw
/// between `VarControlBlock` and `TVar<T>`.
pub struct TVarControlBlock {
    id: u64,

    /// `0` means unlocked; any other value is the token of the thread
    /// currently committing a write to this TVar. Lock acquisition and the
    /// owner stamp happen in the same compare-exchange, so there is no
    /// window where the lock looks held but the owner is stale.
    lock_owner: AtomicU64,

    /// The published (version, value) pair. Readers take a shared lock;
    /// the commit engine takes an exclusive one only after winning
    /// `lock_owner`.
    slot: RwLock<(u64, ArcAny)>,

    waiters: Mutex<Vec<Weak<dyn Waker>>>,
}

impl TVarControlBlock {
    fn new(value: ArcAny) -> Arc<TVarControlBlock> {
        Arc::new(TVarControlBlock {
            id: TVAR_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
            lock_owner: AtomicU64::new(0),
            slot: RwLock::new((crate::version::INVALID_VERSION, value)),
            waiters: Mutex::new(Vec::new()),
        })
    }

    /// Unique, immutable, strictly increasing id assigned at creation. Used
    /// both as the write-set lock order and as the map key for read/write
    /// sets.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current committed version stamp.
    pub fn version(&self) -> u64 {
        self.slot.read().0
    }

    /// Current committed value, read without synchronization against a
    /// concurrent committer. The commit engine re-validates under locks
    /// before trusting any value obtained this way.
    pub fn raw_value(&self) -> ArcAny {
        self.slot.read().1.clone()
    }

    /// Non-blocking: attempt to acquire the single-owner commit lock.
    /// Returns `true` on success, establishing acquire ordering.
    pub fn try_lock(&self) -> bool {
        self.lock_owner
            .compare_exchange(
                0,
                current_thread_token(),
                AtomicOrdering::Acquire,
                AtomicOrdering::Relaxed,
            )
            .is_ok()
    }

    /// Release the commit lock. The caller must currently hold it.
    pub fn unlock(&self) {
        debug_assert_eq!(
            self.lock_owner.load(AtomicOrdering::Relaxed),
            current_thread_token(),
            "unlock called by a thread that does not hold the lock"
        );
        self.lock_owner.store(0, AtomicOrdering::Release);
    }

    /// `true` if this TVar is unlocked, or locked by the calling thread
    /// itself (the same TVar may legitimately be in both a log's read set
    /// and its write set).
    pub fn is_unlocked_by_other(&self) -> bool {
        let holder = self.lock_owner.load(AtomicOrdering::Acquire);
        holder == 0 || holder == current_thread_token()
    }

    /// Publish a new (version, value) pair. Must only be called while the
    /// caller holds the commit lock.
    pub fn set_version_and_value(&self, version: u64, value: ArcAny) {
        debug_assert_eq!(
            self.lock_owner.load(AtomicOrdering::Relaxed),
            current_thread_token(),
            "set_version_and_value called without holding the lock"
        );
        let mut slot = self.slot.write();
        *slot = (version, value);
    }

    /// Register a waiter to be woken by a future
    /// [`TVarControlBlock::notify_waiters_high_load`] call. The handle is
    /// held weakly: a waiter that drops without unsubscribing does not keep
    /// this TVar's waiter list alive.
    pub fn subscribe(&self, waker: Weak<dyn Waker>) {
        self.waiters.lock().push(waker);
    }

    /// Wake every live waiter, dropping any whose handle has already gone
    /// away. Idempotent and safe to call without holding the commit lock.
    pub fn notify_waiters_high_load(&self) {
        self.waiters.lock().retain(|weak| match weak.upgrade() {
            Some(waker) => {
                waker.wake();
                true
            }
            None => false,
        });
    }
}

impl PartialEq for TVarControlBlock {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TVarControlBlock {}

impl PartialOrd for TVarControlBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TVarControlBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// The total order write-set locks are acquired in.
/// Any globally-consistent order works; ascending id is the one every
/// thread in this process agrees on.
pub fn order(a: &TVarControlBlock, b: &TVarControlBlock) -> Ordering {
    a.id.cmp(&b.id)
}

/// A transactional variable.
#[derive(Clone)]
pub struct TVar<T> {
    control_block: Arc<TVarControlBlock>,
    _marker: PhantomData<T>,
}

impl<T> TVar<T>
where
    T: Any + Send + Sync + Clone,
{
    /// Create a new `TVar` holding `val`.
    pub fn new(val: T) -> TVar<T> {
        TVar {
            control_block: TVarControlBlock::new(Arc::new(val)),
            _marker: PhantomData,
        }
    }

    /// Read the committed value without starting a transaction.
    pub fn read_atomic(&self) -> T {
        Self::downcast(self.control_block.raw_value())
    }

    /// Record a read of this TVar on `log`, returning the value the log will
    /// see for the rest of the transaction.
    pub fn read(&self, log: &mut TLog) -> T {
        Self::downcast(log.read_raw(&self.control_block))
    }

    /// Record a write of this TVar on `log`.
    pub fn write(&self, log: &mut TLog, value: T) {
        log.write_raw(&self.control_block, Arc::new(value));
    }

    /// Read-modify-write convenience built on [`TVar::read`] + [`TVar::write`].
    pub fn modify<F>(&self, log: &mut TLog, f: F)
    where
        F: FnOnce(T) -> T,
    {
        let old = self.read(log);
        self.write(log, f(old));
    }

    /// Write a new value, returning the value the log previously had.
    pub fn replace(&self, log: &mut TLog, value: T) -> T {
        let old = self.read(log);
        self.write(log, value);
        old
    }

    /// Two handles refer to the same TVar iff they share a control block.
    pub fn ref_eq(this: &TVar<T>, other: &TVar<T>) -> bool {
        Arc::ptr_eq(&this.control_block, &other.control_block)
    }

    /// Access the underlying control block. Used by the commit engine and by
    /// callers that need to subscribe a waker for retry-style blocking.
    pub fn control_block(&self) -> &Arc<TVarControlBlock> {
        &self.control_block
    }

    fn downcast(value: ArcAny) -> T {
        (&*value as &dyn Any)
            .downcast_ref::<T>()
            .expect("TVar read with mismatched type")
            .clone()
    }
}

impl<T> Debug for TVar<T>
where
    T: Any + Send + Sync + Clone + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TVar")
            .field("id", &self.control_block.id)
            .field("value", &self.read_atomic())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_atomic_returns_the_constructed_value() {
        let var = TVar::new(42);
        assert_eq!(var.read_atomic(), 42);
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let a = TVar::new(0);
        let b = TVar::new(0);
        assert!(b.control_block().id() > a.control_block().id());
    }

    #[test]
    fn try_lock_is_exclusive_to_other_threads_but_reentrant_for_the_owner() {
        let var = TVar::new(0);
        assert!(var.control_block().try_lock());
        assert!(!var.control_block().try_lock());
        assert!(var.control_block().is_unlocked_by_other());
        var.control_block().unlock();
        assert!(var.control_block().try_lock());
        var.control_block().unlock();
    }

    #[test]
    fn notify_drops_dead_weak_handles() {
        struct NoopWaker;
        impl Waker for NoopWaker {
            fn wake(&self) {}
        }

        let var = TVar::new(0);
        {
            let waker: Arc<dyn Waker> = Arc::new(NoopWaker);
            var.control_block().subscribe(Arc::downgrade(&waker));
        }
        // waker already dropped here
        var.control_block().notify_waiters_high_load();
        assert!(var.control_block().waiters.lock().is_empty());
    }
}
