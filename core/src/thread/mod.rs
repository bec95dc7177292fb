// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The Thread-layer components of the indirect transmission subsystem:
//! [`child`]'s per-child state, the shared [`queue`], and the three
//! cooperating components of spec.md §4 — [`src_match_controller`],
//! [`data_poll_handler`], and [`indirect_sender`].

pub mod child;
pub mod data_poll_handler;
pub mod indirect_sender;
pub mod message;
pub mod queue;
pub mod src_match_controller;

use crate::thread::child::ChildIndex;

/// The child/neighbor layer this subsystem consumes (spec.md §6,
/// "Consumed from the child/neighbor layer"). Implemented by the
/// surrounding mesh forwarder; never by this crate.
pub trait ChildTable {
    fn rx_on_when_idle(&self, child: ChildIndex) -> bool;
    fn rloc16(&self, child: ChildIndex) -> u16;
    fn ext_address(&self, child: ChildIndex) -> [u8; 8];
    /// Resets the child's inactivity (supervision) timer after a
    /// successful send (spec.md §4.3.5, step 1).
    fn add_message_tx_status(&mut self, child: ChildIndex, ok: bool);
    /// Whether the child is still in a state (valid or restoring) that
    /// indirect messages may be held for (spec.md §4.3.5, step 8).
    fn is_valid_or_restoring(&self, child: ChildIndex) -> bool;
}
