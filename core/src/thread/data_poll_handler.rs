// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adapts MAC data-poll and tx-complete events into the per-child
//! frame-preparation protocol (spec.md §4.2). Structured like
//! `virtual_mac.rs`'s `Op` enum driving `do_next_op_sync` /
//! `do_next_op_async` — a small per-user state machine whose transitions
//! decide whether a caller gets its completion on the same call stack or
//! has to wait for a later event.
//!
//! Unlike `virtual_mac.rs`, there is no callback trait wired back to the
//! orchestrator here: [`crate::thread::indirect_sender::IndirectSender`]
//! owns a `DataPollHandler` and drives it directly, reading
//! [`FrameChangeOutcome`] and the outcome of [`Self::end_transmission`] as
//! plain return values instead of re-entering through a `dyn` callback
//! (spec.md §9,
//! "Synchronous-or-async callback" — completion is still observable as
//! "now" vs "later", just expressed as data rather than a deferred call).

use crate::config::MAX_CHILDREN;
use crate::thread::child::ChildIndex;

/// Which frame-change operation is outstanding for a child (spec.md
/// §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameChangeKind {
    Purge,
    Replace,
}

/// Per-child poll state (spec.md §4.2, "a thin state machine per child").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    Idle,
    Armed,
    InFlight,
    ChangePending(FrameChangeKind),
}

/// Whether a [`FrameChangeKind`] request completed on this call or must
/// wait for the in-flight frame's tx-complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameChangeOutcome {
    Immediate,
    Deferred,
}

pub struct DataPollHandler {
    states: [PollState; MAX_CHILDREN],
}

impl DataPollHandler {
    pub fn new() -> Self {
        Self {
            states: [PollState::Idle; MAX_CHILDREN],
        }
    }

    fn state(&self, child: ChildIndex) -> PollState {
        self.states[child.get()]
    }

    fn set_state(&mut self, child: ChildIndex, state: PollState) {
        self.states[child.get()] = state;
    }

    /// `HandleNewFrame`: arms the handler so the next poll from `child`
    /// triggers preparation. A child mid-transmission stays `InFlight` —
    /// the in-flight frame is unaffected by a later message becoming
    /// available.
    pub fn handle_new_frame(&mut self, child: ChildIndex) {
        if !matches!(self.state(child), PollState::InFlight) {
            self.set_state(child, PollState::Armed);
        }
    }

    /// `RequestFrameChange`. Returns whether the caller should invoke
    /// `HandleFrameChangeDone` itself right away (`Immediate`) or wait for
    /// [`Self::end_transmission`] to report it (`Deferred`).
    pub fn request_frame_change(
        &mut self,
        child: ChildIndex,
        kind: FrameChangeKind,
    ) -> FrameChangeOutcome {
        match self.state(child) {
            PollState::InFlight | PollState::ChangePending(_) => {
                self.set_state(child, PollState::ChangePending(kind));
                FrameChangeOutcome::Deferred
            }
            PollState::Idle | PollState::Armed => {
                self.set_state(
                    child,
                    match kind {
                        FrameChangeKind::Purge => PollState::Idle,
                        FrameChangeKind::Replace => PollState::Armed,
                    },
                );
                FrameChangeOutcome::Immediate
            }
        }
    }

    /// Called when a data poll arrives for `child`: a frame is always
    /// prepared (even an empty one) regardless of prior arm state
    /// (spec.md §4.3.4).
    pub fn begin_transmission(&mut self, child: ChildIndex) {
        self.set_state(child, PollState::InFlight);
    }

    /// Called at tx-complete. Returns the deferred [`FrameChangeKind`] if
    /// one was queued while the frame was in flight, so the caller can
    /// now invoke `HandleFrameChangeDone`.
    pub fn end_transmission(&mut self, child: ChildIndex) -> Option<FrameChangeKind> {
        match self.state(child) {
            PollState::ChangePending(kind) => {
                self.set_state(child, PollState::Idle);
                Some(kind)
            }
            _ => {
                self.set_state(child, PollState::Idle);
                None
            }
        }
    }

    /// `Clear`: drops all per-child staged frames.
    pub fn clear(&mut self) {
        self.states = [PollState::Idle; MAX_CHILDREN];
    }
}

impl Default for DataPollHandler {
    fn default() -> Self {
        Self::new()
    }
}
