//! Per-container mutual exclusion
//!
//! Operations against one container id are serialized, operations against
//! different ids never wait for each other. The table mutex only guards the
//! lookup/insert of a handle, it is never held while waiting for the id
//! itself.
//!
//! A handle counts the callers that hold or wait for it. The count only
//! changes under the table mutex, and the handle is dropped from the table
//! when it reaches zero, so the table holds at most one entry per id with an
//! operation in flight.
//!
//! Callers must not lock an id they already hold on the same thread.
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct IdLock {
    locked: Mutex<bool>,
    cond: Condvar,
}

impl IdLock {
    fn acquire(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        while *locked {
            locked = self
                .cond
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    // returns false if the lock was not held
    fn release(&self) -> bool {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        if !*locked {
            return false;
        }
        *locked = false;
        self.cond.notify_one();
        true
    }
}

#[derive(Debug)]
struct Entry {
    lock: Arc<IdLock>,
    users: usize,
}

#[derive(Debug, Default)]
pub struct ContainerLocks {
    table: Mutex<HashMap<String, Entry>>,
}

impl ContainerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the caller holds `id`. The returned guard unlocks on drop.
    pub fn lock(&self, id: &str) -> ContainerLockGuard<'_> {
        let handle = {
            let mut table = self.table();
            let entry = table.entry(id.to_owned()).or_insert_with(|| Entry {
                lock: Arc::default(),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.lock)
        };
        handle.acquire();
        tracing::trace!(id, "acquired container lock");

        ContainerLockGuard {
            locks: self,
            id: id.to_owned(),
            released: false,
        }
    }

    /// Releases `id`. Unlocking an id that is not held is reported and
    /// otherwise ignored.
    pub fn unlock(&self, id: &str) {
        let mut table = self.table();
        let Some(entry) = table.get_mut(id) else {
            tracing::warn!(id, "unlock of non-existing container lock");
            return;
        };
        if !entry.lock.release() {
            tracing::warn!(id, "unlock of container lock that is not held");
            return;
        }
        entry.users -= 1;
        if entry.users == 0 {
            table.remove(id);
        }
        tracing::trace!(id, "released container lock");
    }

    /// Number of ids that currently have a lock handle.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a container id locked until dropped or [`ContainerLockGuard::unlock`]ed.
#[must_use = "the container lock is released as soon as the guard is dropped"]
pub struct ContainerLockGuard<'a> {
    locks: &'a ContainerLocks,
    id: String,
    released: bool,
}

impl ContainerLockGuard<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unlock(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.locks.unlock(&self.id);
        }
    }
}

impl Drop for ContainerLockGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn test_lock_unlock_reclaims_handle() {
        let locks = ContainerLocks::new();
        let guard = locks.lock("c1");
        assert_eq!(guard.id(), "c1");
        assert_eq!(locks.len(), 1);
        guard.unlock();
        assert!(locks.is_empty());
    }

    #[test]
    fn test_unlock_unknown_id_is_ignored() {
        let locks = ContainerLocks::new();
        locks.unlock("missing");
        assert!(locks.is_empty());

        let _guard = locks.lock("c1");
        locks.unlock("other");
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_ids_do_not_block() {
        let locks = Arc::new(ContainerLocks::new());
        let _a = locks.lock("a");

        let (tx, rx) = bounded(1);
        let other = Arc::clone(&locks);
        thread::spawn(move || {
            let guard = other.lock("b");
            tx.send(()).unwrap();
            drop(guard);
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("lock on b must not wait for a");
    }

    #[test]
    fn test_same_id_is_serialized() {
        let locks = Arc::new(ContainerLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = locks.lock("same");
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_waiter_keeps_handle_alive() {
        let locks = Arc::new(ContainerLocks::new());
        let guard = locks.lock("c1");

        let (tx, rx) = bounded(1);
        let other = Arc::clone(&locks);
        let waiter = thread::spawn(move || {
            let guard = other.lock("c1");
            tx.send(()).unwrap();
            guard.unlock();
        });

        // the waiter cannot get in while we hold the lock
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        guard.unlock();
        rx.recv_timeout(Duration::from_secs(5))
            .expect("waiter should acquire after release");
        waiter.join().unwrap();
        assert!(locks.is_empty());
    }

    quickcheck! {
        fn property_lock_table_drains(ids: Vec<String>) -> bool {
            let locks = ContainerLocks::new();
            let mut unique = ids.clone();
            unique.sort();
            unique.dedup();
            let guards: Vec<_> = unique.iter().map(|id| locks.lock(id)).collect();
            let held = locks.len() == unique.len();
            drop(guards);
            held && locks.is_empty()
        }
    }
}
