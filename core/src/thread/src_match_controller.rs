// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keeps the radio's hardware source-match table in sync with which
//! children have queued indirect traffic (spec.md §4.1). Grounded on
//! `virtual_mac.rs`'s pattern of a small component that only talks to one
//! hardware-facing trait (`SourceMatchRadio`) and otherwise touches child
//! state it's handed by the caller.

use heapless::Vec;

use crate::config::MAX_CHILDREN;
use crate::mac::SourceMatchRadio;
use crate::thread::child::{ChildArena, ChildIndex};
use crate::thread::ChildTable;

/// Owns no hardware itself; `radio` is borrowed for the duration of each
/// call, matching the single-threaded cooperative model of spec.md §5.
pub struct SourceMatchController {
    /// Children whose insertion failed because the hardware table was
    /// full, in the order they should be promoted once a slot frees
    /// (spec.md §4.1, "promoted in arbitrary but deterministic order").
    pending: Vec<ChildIndex, MAX_CHILDREN>,
    /// Whether the radio is currently enabled to honor the source-match
    /// table (false once the fallback policy trips).
    enabled: bool,
}

impl SourceMatchController {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            enabled: true,
        }
    }

    fn address_of(&self, child: ChildIndex, arena: &ChildArena, children: &dyn ChildTable) -> AddrForm {
        if arena.get(child).use_short_address() {
            AddrForm::Short(children.rloc16(child))
        } else {
            AddrForm::Extended(children.ext_address(child))
        }
    }

    fn insert(&mut self, radio: &mut dyn SourceMatchRadio, form: AddrForm) -> Result<(), ()> {
        match form {
            AddrForm::Short(rloc16) => radio.add_short(rloc16),
            AddrForm::Extended(ext) => radio.add_extended(ext),
        }
    }

    fn remove(&mut self, radio: &mut dyn SourceMatchRadio, form: AddrForm) {
        match form {
            AddrForm::Short(rloc16) => radio.clear_short(rloc16),
            AddrForm::Extended(ext) => radio.clear_extended(ext),
        }
    }

    fn try_insert(
        &mut self,
        child: ChildIndex,
        arena: &mut ChildArena,
        radio: &mut dyn SourceMatchRadio,
        children: &dyn ChildTable,
    ) {
        let form = self.address_of(child, arena, children);
        match self.insert(radio, form) {
            Ok(()) => {
                arena.get_mut(child).set_source_match_pending(false);
                if !self.enabled {
                    self.enabled = true;
                    radio.enable();
                    crate::debug!(
                        "source-match table recovered, re-enabling at child {}",
                        child.get()
                    );
                }
            }
            Err(()) => {
                arena.get_mut(child).set_source_match_pending(true);
                if !self.pending.iter().any(|c| *c == child) {
                    let _ = self.pending.push(child);
                }
                if self.enabled {
                    self.enabled = false;
                    radio.disable();
                    crate::debug!(
                        "source-match table exhausted at child {}, disabling table",
                        child.get()
                    );
                }
            }
        }
    }

    /// Promotes one pending child into the table, if any are waiting and
    /// the table now has room (spec.md §4.1, "as soon as a slot frees").
    fn try_promote_one(
        &mut self,
        arena: &mut ChildArena,
        radio: &mut dyn SourceMatchRadio,
        children: &dyn ChildTable,
    ) {
        if self.pending.is_empty() {
            return;
        }
        let child = self.pending.remove(0);
        self.try_insert(child, arena, radio, children);
    }

    /// `IncrementMessageCount` (spec.md §4.1).
    pub fn increment_message_count(
        &mut self,
        child: ChildIndex,
        arena: &mut ChildArena,
        radio: &mut dyn SourceMatchRadio,
        children: &dyn ChildTable,
    ) {
        let state = arena.get_mut(child);
        state.increment_queued_count();
        if state.queued_count() == 1 {
            self.try_insert(child, arena, radio, children);
        }
    }

    /// `DecrementMessageCount` (spec.md §4.1).
    pub fn decrement_message_count(
        &mut self,
        child: ChildIndex,
        arena: &mut ChildArena,
        radio: &mut dyn SourceMatchRadio,
        children: &dyn ChildTable,
    ) {
        let state = arena.get_mut(child);
        debug_assert!(state.queued_count() > 0);
        state.decrement_queued_count();
        if state.queued_count() == 0 {
            self.pending.retain(|c| *c != child);
            if !state.source_match_pending() {
                let form = self.address_of(child, arena, children);
                self.remove(radio, form);
            }
            arena.get_mut(child).set_source_match_pending(false);
            self.try_promote_one(arena, radio, children);
        }
    }

    /// `ResetMessageCount`: forced removal regardless of count (spec.md
    /// §4.1).
    pub fn reset_message_count(
        &mut self,
        child: ChildIndex,
        arena: &mut ChildArena,
        radio: &mut dyn SourceMatchRadio,
        children: &dyn ChildTable,
    ) {
        let state = arena.get_mut(child);
        let was_pending = state.source_match_pending();
        let had_entry = state.queued_count() > 0 && !was_pending;
        state.set_queued_count(0);
        state.set_source_match_pending(false);
        self.pending.retain(|c| *c != child);
        if had_entry {
            let form = self.address_of(child, arena, children);
            self.remove(radio, form);
        }
        self.try_promote_one(arena, radio, children);
    }

    /// `SetSrcMatchAsShort` (spec.md §4.1).
    pub fn set_src_match_as_short(
        &mut self,
        child: ChildIndex,
        use_short: bool,
        arena: &mut ChildArena,
        radio: &mut dyn SourceMatchRadio,
        children: &dyn ChildTable,
    ) {
        let state = arena.get_mut(child);
        if state.use_short_address() == use_short {
            return;
        }
        let queued = state.queued_count();
        let was_in_table = queued > 0 && !state.source_match_pending();
        if was_in_table {
            let old_form = self.address_of(child, arena, children);
            self.remove(radio, old_form);
        }
        arena.get_mut(child).set_use_short_address(use_short);
        if queued > 0 {
            self.pending.retain(|c| *c != child);
            self.try_insert(child, arena, radio, children);
        }
    }
}

impl Default for SourceMatchController {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddrForm {
    Short(u16),
    Extended([u8; 8]),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::child::ChildArena;

    /// A source-match hardware table with a configurable fixed capacity,
    /// the way `virtual_alarm.rs`'s `FakeAlarm` stands in for real
    /// hardware in tests.
    struct FakeRadio {
        capacity: usize,
        table: Vec<AddrForm, MAX_CHILDREN>,
        enabled: bool,
    }

    impl FakeRadio {
        fn new(capacity: usize) -> Self {
            Self {
                capacity,
                table: Vec::new(),
                enabled: true,
            }
        }
    }

    impl SourceMatchRadio for FakeRadio {
        fn add_short(&mut self, rloc16: u16) -> Result<(), ()> {
            if self.table.len() >= self.capacity {
                return Err(());
            }
            self.table.push(AddrForm::Short(rloc16)).map_err(|_| ())
        }

        fn add_extended(&mut self, ext_addr: [u8; 8]) -> Result<(), ()> {
            if self.table.len() >= self.capacity {
                return Err(());
            }
            self.table.push(AddrForm::Extended(ext_addr)).map_err(|_| ())
        }

        fn clear_short(&mut self, rloc16: u16) {
            self.table.retain(|f| *f != AddrForm::Short(rloc16));
        }

        fn clear_extended(&mut self, ext_addr: [u8; 8]) {
            self.table.retain(|f| *f != AddrForm::Extended(ext_addr));
        }

        fn enable(&mut self) {
            self.enabled = true;
        }

        fn disable(&mut self) {
            self.enabled = false;
        }
    }

    struct FakeChildren;

    impl ChildTable for FakeChildren {
        fn rx_on_when_idle(&self, _child: ChildIndex) -> bool {
            false
        }

        fn rloc16(&self, child: ChildIndex) -> u16 {
            child.get() as u16
        }

        fn ext_address(&self, child: ChildIndex) -> [u8; 8] {
            [child.get() as u8; 8]
        }

        fn add_message_tx_status(&mut self, _child: ChildIndex, _ok: bool) {}

        fn is_valid_or_restoring(&self, _child: ChildIndex) -> bool {
            true
        }
    }

    fn child(i: usize) -> ChildIndex {
        ChildIndex::new(i).unwrap()
    }

    #[test]
    fn increment_then_decrement_round_trips_table_entry() {
        let mut ctrl = SourceMatchController::new();
        let mut arena = ChildArena::new();
        let mut radio = FakeRadio::new(4);
        let children = FakeChildren;

        ctrl.increment_message_count(child(0), &mut arena, &mut radio, &children);
        assert_eq!(radio.table.len(), 1);
        assert!(!arena.get(child(0)).source_match_pending());

        ctrl.decrement_message_count(child(0), &mut arena, &mut radio, &children);
        assert!(radio.table.is_empty());
    }

    #[test]
    fn table_overflow_sets_pending_and_disables_radio() {
        let mut ctrl = SourceMatchController::new();
        let mut arena = ChildArena::new();
        let mut radio = FakeRadio::new(1);
        let children = FakeChildren;

        ctrl.increment_message_count(child(0), &mut arena, &mut radio, &children);
        assert!(radio.enabled);

        ctrl.increment_message_count(child(1), &mut arena, &mut radio, &children);
        assert!(arena.get(child(1)).source_match_pending());
        assert!(!radio.enabled);

        // Freeing the first child's slot promotes the pending one and
        // re-enables the table (spec.md §4.1, "Fallback policy").
        ctrl.decrement_message_count(child(0), &mut arena, &mut radio, &children);
        assert!(!arena.get(child(1)).source_match_pending());
        assert!(radio.enabled);
        assert_eq!(radio.table.len(), 1);
    }

    #[test]
    fn switching_address_form_moves_the_table_entry() {
        let mut ctrl = SourceMatchController::new();
        let mut arena = ChildArena::new();
        let mut radio = FakeRadio::new(4);
        let children = FakeChildren;

        ctrl.increment_message_count(child(0), &mut arena, &mut radio, &children);
        assert_eq!(radio.table[0], AddrForm::Extended([0u8; 8]));

        ctrl.set_src_match_as_short(child(0), true, &mut arena, &mut radio, &children);
        assert_eq!(radio.table.len(), 1);
        assert_eq!(radio.table[0], AddrForm::Short(0));
    }
}
