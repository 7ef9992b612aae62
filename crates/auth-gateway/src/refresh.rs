//! Refresh cycle state machine
//!
//! States: `Idle` and `Refreshing`. The first request to fail with 401 while
//! `Idle` becomes the cycle leader and performs the refresh; every request
//! failing while `Refreshing` is queued with a oneshot responder and waits
//! for the cycle's outcome. Waiters keep their own request and resubmit it
//! themselves, so no caller's response depends on another caller's future.
//!
//! Check-and-set on admission and drain-and-reset at cycle end each happen
//! inside one critical section with no `.await`, so exactly one request can
//! observe `Idle` and start a cycle, and no request can be queued after the
//! drain and be left behind.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use common::Secret;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::Result;
use crate::metrics;

/// Observable state of the refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Outcome of a cycle as seen by a waiter: the new access token or the
/// refresh error.
pub(crate) type RefreshOutcome = Result<Secret<String>>;

/// A caller waiting for the in-flight refresh to conclude.
pub(crate) struct PendingRequest {
    pub(crate) responder: oneshot::Sender<RefreshOutcome>,
}

/// Role handed to a request that failed with 401.
pub(crate) enum Admission<'a> {
    /// This request started the cycle and must run the refresh.
    Leader(RefreshCycle<'a>),
    /// A cycle was already running; the caller now waits in the queue.
    Queued(oneshot::Receiver<RefreshOutcome>),
}

#[derive(Default)]
struct CycleState {
    refreshing: bool,
    queue: VecDeque<PendingRequest>,
}

/// Owner of the `refreshing` flag and the pending request queue.
///
/// Invariant: the queue is empty whenever `refreshing` is false.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<CycleState>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefreshState {
        if self.lock().refreshing {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Number of requests waiting on the current cycle.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Atomically start a cycle or join the running one.
    pub(crate) fn admit(&self) -> Admission<'_> {
        let mut state = self.lock();
        if state.refreshing {
            let (responder, waiter) = oneshot::channel();
            state.queue.push_back(PendingRequest { responder });
            metrics::set_queue_depth(state.queue.len());
            Admission::Queued(waiter)
        } else {
            state.refreshing = true;
            Admission::Leader(RefreshCycle {
                coordinator: self,
                finished: false,
            })
        }
    }

    /// Return to `Idle` and hand back everything queued, in arrival order.
    fn end_cycle(&self) -> Vec<PendingRequest> {
        let mut state = self.lock();
        state.refreshing = false;
        let drained: Vec<PendingRequest> = state.queue.drain(..).collect();
        metrics::set_queue_depth(0);
        drained
    }

    fn lock(&self) -> MutexGuard<'_, CycleState> {
        // Every critical section leaves the state consistent before any code
        // that could panic runs, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Leader's handle on the running cycle.
///
/// Dropping it without `finish` (panic, cancelled future) still resets the
/// coordinator to `Idle`; the queued responders are dropped, which their
/// waiters observe as an aborted cycle.
pub(crate) struct RefreshCycle<'a> {
    coordinator: &'a RefreshCoordinator,
    finished: bool,
}

impl RefreshCycle<'_> {
    /// End the cycle and hand `outcome` to every waiter in arrival order.
    ///
    /// Returns how many waiters were released.
    pub(crate) fn finish(mut self, outcome: &RefreshOutcome) -> usize {
        self.finished = true;
        let pending = self.coordinator.end_cycle();
        let released = pending.len();
        for waiting in pending {
            // The waiter may have been dropped; nothing to deliver then.
            let _ = waiting.responder.send(outcome.clone());
        }
        released
    }
}

impl Drop for RefreshCycle<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let abandoned = self.coordinator.end_cycle();
        warn!(
            abandoned = abandoned.len(),
            "refresh cycle ended without completing, releasing queued requests"
        );
    }
}
