// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compile-time knobs. Mirrors how a Tock board picks its capsule
//! configuration at build time rather than through a config file: these are
//! `const`s, not parsed settings, and changing one means rebuilding.

/// Maximum number of children a parent can track. Bounds both the width of
/// every [`crate::thread::message::ChildMask`] and the range of
/// [`crate::thread::child::ChildIndex`]. Must stay under 2^14 so that
/// `queued_message_count` (a 14-bit field) can always hold an exact count.
pub const MAX_CHILDREN: usize = 32;

const _: () = assert!(MAX_CHILDREN < (1 << 14), "MAX_CHILDREN must fit in 14 bits");

/// Number of `u32` words needed to store one bit per child.
pub const CHILD_MASK_WORDS: usize = (MAX_CHILDREN + 31) / 32;

/// Maximum number of messages the shared send queue can hold at once.
pub const MAX_QUEUE_LEN: usize = 64;

/// Maximum encoded length of a single message body (e.g. an IPv6 datagram
/// before 6LoWPAN fragmentation). Bounded so the message pool never
/// allocates dynamically.
pub const MAX_MESSAGE_LEN: usize = 1280;

/// Maximum payload a single outgoing MAC frame can carry.
pub const MAX_FRAME_PAYLOAD: usize = 127;

/// `OPENTHREAD_CONFIG_DROP_MESSAGE_ON_FRAGMENT_TX_FAILURE`: if a fragment of
/// a multi-fragment message fails to transmit, skip the remaining fragments
/// instead of continuing to send them. See spec.md §4.3.5.
pub const DROP_MESSAGE_ON_FRAGMENT_TX_FAILURE: bool = true;

/// Whether supervision (keep-alive) frames request a MAC-layer ack.
pub const SUPERVISION_MSG_ACK_REQUEST: bool = true;

/// Largest value `fragment_offset` (a 14-bit field) can hold. Messages
/// whose length would need a larger offset are rejected upstream; this
/// subsystem only asserts the bound never overflows in its own bookkeeping
/// (spec.md §8, "Boundary cases").
pub const MAX_FRAGMENT_OFFSET: usize = (1 << 14) - 1;

const _: () = assert!(
    MAX_MESSAGE_LEN <= MAX_FRAGMENT_OFFSET + 1,
    "MAX_MESSAGE_LEN must fit in the 14-bit fragment offset"
);
