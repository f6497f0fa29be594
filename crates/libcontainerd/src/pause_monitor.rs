//! Rendezvous between a pause/resume request and the daemon event that
//! confirms it.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::Sender;

use crate::backend::State;

/// Queues of callers waiting for a container to reach a state, one FIFO per
/// state. Appending and releasing happen from different threads without the
/// container lock held.
#[derive(Debug, Default)]
pub struct PauseMonitor {
    waiters: Mutex<HashMap<State, VecDeque<(WaiterId, Sender<()>)>>>,
    next_id: AtomicU64,
}

/// Identifies one queued waiter so it can be withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaiterId(u64);

impl PauseMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, state: State, signal: Sender<()>) -> WaiterId {
        let id = WaiterId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(state)
            .or_default()
            .push_back((id, signal));
        id
    }

    /// Withdraws a waiter that no longer expects a confirmation. Returns
    /// whether it was still queued.
    pub fn cancel(&self, state: State, id: WaiterId) -> bool {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = waiters.get_mut(&state) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|(waiter, _)| *waiter != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            waiters.remove(&state);
        }
        removed
    }

    /// Drops every waiter. Their receivers observe a disconnect, which is
    /// how callers learn that the container went away while they waited.
    pub fn clear(&self) {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Releases the oldest live waiter for `state`. Waiters that gave up
    /// (their receiver is gone) are discarded without consuming the
    /// confirmation. Returns whether a waiter was released.
    pub fn handle(&self, state: State) -> bool {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = waiters.get_mut(&state) else {
            return false;
        };

        let mut released = false;
        while let Some((_, signal)) = queue.pop_front() {
            if signal.try_send(()).is_ok() {
                released = true;
                break;
            }
        }
        if queue.is_empty() {
            waiters.remove(&state);
        }

        released
    }

    /// Number of queued waiters for `state`, including ones that gave up.
    pub fn pending(&self, state: State) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&state)
            .map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn test_handle_without_waiters() {
        let monitor = PauseMonitor::new();
        assert!(!monitor.handle(State::Pause));
    }

    #[test]
    fn test_releases_in_order() {
        let monitor = PauseMonitor::new();
        let (tx1, rx1) = bounded(1);
        let (tx2, rx2) = bounded(1);
        monitor.append(State::Pause, tx1);
        monitor.append(State::Pause, tx2);

        assert!(monitor.handle(State::Pause));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert_eq!(monitor.pending(State::Pause), 1);

        assert!(monitor.handle(State::Pause));
        assert!(rx2.try_recv().is_ok());
        assert_eq!(monitor.pending(State::Pause), 0);
    }

    #[test]
    fn test_states_are_independent() {
        let monitor = PauseMonitor::new();
        let (tx, rx) = bounded(1);
        monitor.append(State::Resume, tx);

        assert!(!monitor.handle(State::Pause));
        assert!(rx.try_recv().is_err());
        assert!(monitor.handle(State::Resume));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_cancel() {
        let monitor = PauseMonitor::new();
        let (tx1, rx1) = bounded(1);
        let (tx2, rx2) = bounded(1);
        let first = monitor.append(State::Pause, tx1);
        monitor.append(State::Pause, tx2);

        assert!(monitor.cancel(State::Pause, first));
        assert!(!monitor.cancel(State::Pause, first));
        assert!(!monitor.cancel(State::Resume, first));

        assert!(monitor.handle(State::Pause));
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_clear_disconnects_waiters() {
        let monitor = PauseMonitor::new();
        let (tx, rx) = bounded::<()>(1);
        monitor.append(State::Resume, tx);

        monitor.clear();
        assert!(rx.recv().is_err());
        assert_eq!(monitor.pending(State::Resume), 0);
    }

    #[test]
    fn test_abandoned_waiter_is_skipped() {
        let monitor = PauseMonitor::new();
        let (gone, gone_rx) = bounded(1);
        let (tx, rx) = bounded(1);
        monitor.append(State::Pause, gone);
        monitor.append(State::Pause, tx);
        drop(gone_rx);

        assert!(monitor.handle(State::Pause));
        assert!(rx.try_recv().is_ok());
        assert_eq!(monitor.pending(State::Pause), 0);
    }
}
