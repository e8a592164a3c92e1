//! Single-writer lane bookkeeping
//!
//! Each kind of writer (weaving, gardening) owns a [`Coalescer`]: at most
//! one run is in flight and at most one follow-up waits behind it. Triggers
//! arriving while a follow-up is already queued fold into that follow-up.
//! Mutual exclusion between the kinds comes from the engine's writer lease.

use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Summary status carried by every run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Every item processed, analytics converged
    #[default]
    Clean,
    /// Completed, but some items failed or analytics are approximate
    Degraded,
    /// Stopped at a phase boundary; nothing was committed
    Cancelled,
}

impl RunStatus {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// Outcome of submitting work to a lane
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<W> {
    /// The caller owns the lane and must run `W`, then call
    /// [`Coalescer::complete`]
    Run(W),
    /// Folded into the pending follow-up of the current runner
    Queued,
}

#[derive(Debug)]
enum LaneState<W> {
    /// `carry` holds work from a failed follow-up, folded into the next
    /// submission
    Idle { carry: Option<W> },
    Running { pending: Option<W>, carry: Option<W> },
}

/// `Idle → Running → Idle` with a pending slot of depth one
#[derive(Debug)]
pub struct Coalescer<W> {
    name: &'static str,
    state: Mutex<LaneState<W>>,
}

impl<W> Coalescer<W> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(LaneState::Idle { carry: None }),
        }
    }

    /// Claim the lane or fold `work` into the pending follow-up.
    ///
    /// `merge(existing, incoming)` combines two units of work.
    pub fn submit(&self, work: W, merge: impl FnOnce(&mut W, W)) -> Admission<W> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *state {
            LaneState::Idle { carry } => {
                let work = match carry.take() {
                    Some(mut carried) => {
                        merge(&mut carried, work);
                        carried
                    }
                    None => work,
                };
                *state = LaneState::Running {
                    pending: None,
                    carry: None,
                };
                Admission::Run(work)
            }
            LaneState::Running { pending, .. } => {
                match pending {
                    Some(existing) => merge(existing, work),
                    None => *pending = Some(work),
                }
                debug!(lane = self.name, "trigger coalesced into pending run");
                Admission::Queued
            }
        }
    }

    /// Finish the current run. Returns the follow-up to run next, in which
    /// case the lane stays `Running`; otherwise the lane goes `Idle`.
    pub fn complete(&self) -> Option<W> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *state {
            LaneState::Running { pending, carry } => {
                let next = pending.take();
                if next.is_none() {
                    let carry = carry.take();
                    *state = LaneState::Idle { carry };
                }
                next
            }
            LaneState::Idle { .. } => None,
        }
    }

    /// Keep work whose run failed so the next submission retries it
    pub fn carry(&self, work: W, merge: impl FnOnce(&mut W, W)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match &mut *state {
            LaneState::Idle { carry } | LaneState::Running { carry, .. } => carry,
        };
        match slot {
            Some(existing) => merge(existing, work),
            None => *slot = Some(work),
        }
        debug!(lane = self.name, "failed work carried to the next run");
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            LaneState::Running { .. }
        )
    }

    /// Whether work is waiting, either behind a runner or carried over
    pub fn has_pending(&self) -> bool {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            LaneState::Idle { carry } => carry.is_some(),
            LaneState::Running { pending, carry } => pending.is_some() || carry.is_some(),
        }
    }
}
