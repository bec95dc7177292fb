// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Indirect transmission subsystem for an IEEE 802.15.4 / Thread mesh
//! router: buffers frames destined for sleepy children and releases each
//! one when the child polls for it.
//!
//! Three cooperating pieces, assembled by [`thread::indirect_sender::IndirectSender`]:
//! [`thread::src_match_controller::SourceMatchController`] keeps the
//! radio's hardware source-match table in sync with which children have
//! queued traffic; [`thread::data_poll_handler::DataPollHandler`] adapts
//! MAC data-poll and tx-complete events into a per-child protocol; the
//! sender itself owns the shared send queue and decides, for each child,
//! which message to transmit next and how to build the outgoing frame.
//!
//! `no_std`, no dynamic allocation — every collection is fixed-capacity
//! (see [`config`]). `no_std` is dropped under `cfg(test)` so the unit
//! and integration tests can run on the host.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
#[macro_use]
pub mod log;
pub mod mac;
pub mod net;
pub mod sixlowpan;
pub mod thread;

pub use error::Error;
pub use thread::child::ChildIndex;
pub use thread::indirect_sender::{IndirectSender, PreparedFrame, TxOutcome};
pub use thread::message::{MessageId, MessageType};
pub use thread::ChildTable;
