// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-child indirect state (spec.md §3). Packed into 32 bits with
//! `modular-bitfield`, the way `codyps-lorawan` packs its MAC-command
//! fields, since these six values are read and written together on every
//! `RequestMessageUpdate` and are cheap to keep in a single machine word
//! per child slot.

use cells::OptionalCell;
use modular_bitfield::prelude::*;

use crate::config::MAX_CHILDREN;
use crate::thread::message::MessageId;

/// A child table slot, `0..MAX_CHILDREN` (spec.md §6, `ChildIndex`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChildIndex(pub(crate) u16);

impl ChildIndex {
    pub fn new(index: usize) -> Option<Self> {
        if index < MAX_CHILDREN {
            Some(Self(index as u16))
        } else {
            None
        }
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// The six bit-packed fields of spec.md §3's "Per-child indirect state"
/// table, excluding `currentMessage` (held alongside in
/// [`IndirectChildState`] since it is a weak reference, not a bit flag).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedState {
    pub fragment_offset: B14,
    pub tx_success_so_far: bool,
    pub waiting_for_update: bool,
    pub queued_count: B14,
    pub use_short_address: bool,
    pub source_match_pending: bool,
}

/// Indirect transmission state for one child, exclusively owned by that
/// child's slot (spec.md §3, §9 — addressed by slot index, not by pointer
/// into a `Child`). `current_message` is an [`OptionalCell`] rather than a
/// plain `Option`, the way a Tock capsule keeps a per-client handle next
/// to its packed flags — it is read and replaced far more often than the
/// struct as a whole is moved.
pub struct IndirectChildState {
    current_message: OptionalCell<MessageId>,
    packed: PackedState,
}

impl IndirectChildState {
    pub fn new() -> Self {
        Self {
            current_message: OptionalCell::empty(),
            packed: PackedState::new(),
        }
    }

    pub fn current_message(&self) -> Option<MessageId> {
        self.current_message.get()
    }

    pub fn set_current_message(&mut self, msg: Option<MessageId>) {
        match msg {
            Some(id) => self.current_message.set(id),
            None => self.current_message.clear(),
        }
        self.packed.set_fragment_offset(0);
    }

    pub fn fragment_offset(&self) -> usize {
        self.packed.fragment_offset() as usize
    }

    pub fn set_fragment_offset(&mut self, offset: usize) {
        debug_assert!(offset <= crate::config::MAX_FRAGMENT_OFFSET);
        self.packed.set_fragment_offset(offset as u16);
    }

    pub fn tx_success_so_far(&self) -> bool {
        self.packed.tx_success_so_far()
    }

    pub fn set_tx_success_so_far(&mut self, value: bool) {
        self.packed.set_tx_success_so_far(value);
    }

    pub fn waiting_for_update(&self) -> bool {
        self.packed.waiting_for_update()
    }

    pub fn set_waiting_for_update(&mut self, value: bool) {
        self.packed.set_waiting_for_update(value);
    }

    pub fn queued_count(&self) -> u16 {
        self.packed.queued_count()
    }

    pub fn set_queued_count(&mut self, value: u16) {
        debug_assert!((value as usize) < (1 << 14));
        self.packed.set_queued_count(value);
    }

    pub fn increment_queued_count(&mut self) {
        self.set_queued_count(self.queued_count() + 1);
    }

    pub fn decrement_queued_count(&mut self) {
        self.set_queued_count(self.queued_count() - 1);
    }

    pub fn use_short_address(&self) -> bool {
        self.packed.use_short_address()
    }

    pub fn set_use_short_address(&mut self, value: bool) {
        self.packed.set_use_short_address(value);
    }

    pub fn source_match_pending(&self) -> bool {
        self.packed.source_match_pending()
    }

    pub fn set_source_match_pending(&mut self, value: bool) {
        self.packed.set_source_match_pending(value);
    }
}

impl Default for IndirectChildState {
    fn default() -> Self {
        Self::new()
    }
}

/// Indirect state for every child slot, owned by the
/// [`crate::thread::indirect_sender::IndirectSender`] (spec.md §9: "the
/// IndirectSender holds the arena, the MAC callbacks carry child
/// indices"). The rest of a child's fields — `rloc16`, `extAddress`,
/// `rxOnWhenIdle` — live in the caller's own child table and are reached
/// through [`crate::thread::ChildTable`], never through this arena.
pub struct ChildArena {
    slots: [IndirectChildState; MAX_CHILDREN],
}

impl ChildArena {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| IndirectChildState::new()),
        }
    }

    pub fn get(&self, child: ChildIndex) -> &IndirectChildState {
        &self.slots[child.get()]
    }

    pub fn get_mut(&mut self, child: ChildIndex) -> &mut IndirectChildState {
        &mut self.slots[child.get()]
    }

    /// Drops a child's indirect state entirely, as when the child leaves
    /// the valid/restoring states (spec.md §3, "Lifecycles").
    pub fn reset(&mut self, child: ChildIndex) {
        self.slots[child.get()] = IndirectChildState::new();
    }
}

impl Default for ChildArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::message::MessageId;

    fn child(i: usize) -> ChildIndex {
        ChildIndex::new(i).unwrap()
    }

    #[test]
    fn child_index_rejects_out_of_range() {
        assert!(ChildIndex::new(MAX_CHILDREN).is_none());
        assert!(ChildIndex::new(MAX_CHILDREN - 1).is_some());
    }

    #[test]
    fn packed_state_round_trips_every_field() {
        let mut s = IndirectChildState::new();
        s.set_fragment_offset(12345);
        s.set_tx_success_so_far(true);
        s.set_waiting_for_update(true);
        s.set_queued_count(9);
        s.set_use_short_address(true);
        s.set_source_match_pending(true);

        assert_eq!(s.fragment_offset(), 12345);
        assert!(s.tx_success_so_far());
        assert!(s.waiting_for_update());
        assert_eq!(s.queued_count(), 9);
        assert!(s.use_short_address());
        assert!(s.source_match_pending());
    }

    #[test]
    fn setting_current_message_resets_fragment_offset() {
        let mut s = IndirectChildState::new();
        s.set_fragment_offset(80);
        s.set_current_message(Some(MessageId(1)));
        assert_eq!(s.fragment_offset(), 0);
        assert_eq!(s.current_message(), Some(MessageId(1)));
        s.set_current_message(None);
        assert_eq!(s.current_message(), None);
    }

    #[test]
    fn arena_slots_are_independent() {
        let mut arena = ChildArena::new();
        arena.get_mut(child(0)).set_queued_count(3);
        assert_eq!(arena.get(child(1)).queued_count(), 0);
        arena.reset(child(0));
        assert_eq!(arena.get(child(0)).queued_count(), 0);
    }
}
