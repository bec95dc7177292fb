// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The orchestration layer (spec.md §4.3): ties the shared send queue,
//! per-child indirect state, [`SourceMatchController`], and
//! [`DataPollHandler`] together. Generic over its four external
//! collaborators the way `capsules/src/ieee802154/mac.rs`'s
//! `MacDevice<R: radio::Radio>` is generic over its radio — each
//! collaborator is owned by value rather than reached through a `dyn`
//! trait object, so the whole subsystem monomorphizes to one concrete
//! type per board with no dynamic dispatch on the hot path.

use heapless::Vec as HVec;

use crate::config::{
    DROP_MESSAGE_ON_FRAGMENT_TX_FAILURE, MAX_CHILDREN, MAX_QUEUE_LEN, SUPERVISION_MSG_ACK_REQUEST,
};
use crate::error::Error;
use crate::mac::{fcf, Frame, MacConfig, MacEndpoints, SourceMatchRadio, KEY_ID_MODE_1_MIC_32};
use crate::net::ieee802154::{MacAddress, SHORT_ADDRESS_INVALID};
use crate::sixlowpan::Fragmenter;
use crate::thread::child::{ChildArena, ChildIndex};
use crate::thread::data_poll_handler::{DataPollHandler, FrameChangeKind, FrameChangeOutcome};
use crate::thread::message::{MessageId, MessageType};
use crate::thread::queue::SendQueue;
use crate::thread::ChildTable;

/// Outcome of a completed MAC transmission attempt (spec.md §4.3.5,
/// "Interpret error"). `None` in the source maps to `Success` here to
/// avoid colliding with [`core::option::Option::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Success,
    NoAck,
    ChannelAccessFailure,
    Abort,
}

/// Result of [`IndirectSender::prepare_frame_for_child`]. Carries the
/// message identity and next fragment offset back to the caller instead
/// of stashing them in a mutable field the way the source's
/// `mMessageNextOffset` scratch variable does — spec.md §9 calls that
/// pattern out as correct only because transmissions are serialized per
/// radio, and recommends threading the value explicitly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedFrame {
    pub frame: Frame,
    pub message: Option<MessageId>,
    pub next_offset: usize,
}

pub struct IndirectSender<C, R, F, M> {
    children: C,
    radio: R,
    fragmenter: F,
    mac: M,
    queue: SendQueue,
    arena: ChildArena,
    src_match: crate::thread::src_match_controller::SourceMatchController,
    poll: DataPollHandler,
    enabled: bool,
    ip_tx_failures: u32,
}

impl<C, R, F, M> IndirectSender<C, R, F, M>
where
    C: ChildTable,
    R: SourceMatchRadio,
    F: Fragmenter,
    M: MacConfig,
{
    pub fn new(children: C, radio: R, fragmenter: F, mac: M) -> Self {
        Self {
            children,
            radio,
            fragmenter,
            mac,
            queue: SendQueue::new(),
            arena: ChildArena::new(),
            src_match: crate::thread::src_match_controller::SourceMatchController::new(),
            poll: DataPollHandler::new(),
            enabled: false,
            ip_tx_failures: 0,
        }
    }

    pub fn queue(&self) -> &SendQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut SendQueue {
        &mut self.queue
    }

    pub fn ip_tx_failures(&self) -> u32 {
        self.ip_tx_failures
    }

    pub fn indirect_state(&self, child: ChildIndex) -> &crate::thread::child::IndirectChildState {
        self.arena.get(child)
    }

    /// `Start` (spec.md §4.3.6).
    pub fn start(&mut self) {
        self.enabled = true;
    }

    /// `Stop` (spec.md §4.3.6).
    pub fn stop(&mut self) {
        self.enabled = false;
        for i in 0..MAX_CHILDREN {
            let child = ChildIndex::new(i).expect("i < MAX_CHILDREN");
            self.arena.get_mut(child).set_current_message(None);
            self.src_match
                .reset_message_count(child, &mut self.arena, &mut self.radio, &self.children);
        }
        self.poll.clear();
    }

    /// `AddMessageForSleepyChild` (spec.md §4.3.1).
    pub fn add_message_for_sleepy_child(
        &mut self,
        msg: MessageId,
        child: ChildIndex,
    ) -> Result<(), Error> {
        if self.children.rx_on_when_idle(child) {
            return Err(Error::InvalidState);
        }
        let m = self.queue.get_mut(msg).ok_or(Error::NotFound)?;
        if m.has_child(child) {
            return Err(Error::Already);
        }
        m.set_child(child);
        self.src_match
            .increment_message_count(child, &mut self.arena, &mut self.radio, &self.children);
        self.request_message_update(child);
        Ok(())
    }

    /// `RemoveMessageFromSleepyChild` (spec.md §4.3.1).
    pub fn remove_message_from_sleepy_child(
        &mut self,
        msg: MessageId,
        child: ChildIndex,
    ) -> Result<(), Error> {
        let m = self.queue.get_mut(msg).ok_or(Error::NotFound)?;
        if !m.has_child(child) {
            return Err(Error::NotFound);
        }
        m.clear_child(child);
        self.src_match
            .decrement_message_count(child, &mut self.arena, &mut self.radio, &self.children);
        self.maybe_free_message(msg);
        self.request_message_update(child);
        Ok(())
    }

    /// `ClearAllMessagesForSleepyChild` (spec.md §4.3.1). Idempotent: a
    /// second call finds nothing left with `child`'s bit set and only
    /// re-issues a no-op `Purge` (spec.md §8, "Idempotent clear").
    pub fn clear_all_messages_for_sleepy_child(&mut self, child: ChildIndex) {
        loop {
            let next = self.queue.iter().find(|m| m.has_child(child)).map(|m| m.id());
            let Some(id) = next else { break };
            if let Some(m) = self.queue.get_mut(id) {
                m.clear_child(child);
            }
            if self.arena.get(child).current_message() == Some(id) {
                self.arena.get_mut(child).set_current_message(None);
            }
            self.maybe_free_message(id);
        }
        self.arena.get_mut(child).set_current_message(None);
        self.src_match
            .reset_message_count(child, &mut self.arena, &mut self.radio, &self.children);
        self.issue_frame_change(child, FrameChangeKind::Purge);
    }

    /// `SetChildUseShortAddress` (spec.md §6, "Exposed upward").
    pub fn set_child_use_short_address(&mut self, child: ChildIndex, use_short: bool) {
        self.src_match
            .set_src_match_as_short(child, use_short, &mut self.arena, &mut self.radio, &self.children);
    }

    /// `FindIndirectMessage` (spec.md §4.3.2), including supervision
    /// coalescing.
    fn find_indirect_message(&mut self, child: ChildIndex) -> Option<MessageId> {
        loop {
            let candidate = self.queue.iter().find(|m| m.has_child(child)).map(|m| m.id());
            let id = candidate?;
            let is_supervision = self
                .queue
                .get(id)
                .map(|m| m.kind() == MessageType::Supervision)
                .unwrap_or(false);
            let queued_count = self.arena.get(child).queued_count();
            if is_supervision && queued_count > 1 {
                if let Some(m) = self.queue.get_mut(id) {
                    m.clear_child(child);
                }
                self.src_match
                    .decrement_message_count(child, &mut self.arena, &mut self.radio, &self.children);
                self.maybe_free_message(id);
                continue;
            }
            return Some(id);
        }
    }

    /// `RequestMessageUpdate` (spec.md §4.3.3).
    fn request_message_update(&mut self, child: ChildIndex) {
        let current = self.arena.get(child).current_message();

        // Case 1: current message no longer applies.
        if let Some(cur_id) = current {
            let still_applies = self
                .queue
                .get(cur_id)
                .map(|m| m.has_child(child))
                .unwrap_or(false);
            if !still_applies {
                self.arena.get_mut(child).set_current_message(None);
                self.arena.get_mut(child).set_waiting_for_update(true);
                // `cur_id` may now have no remaining consumers anywhere —
                // the caller that cleared this child's bit already tried
                // to free it while it was still `currentMessage` here.
                self.maybe_free_message(cur_id);
                self.issue_frame_change(child, FrameChangeKind::Purge);
                return;
            }
        }

        // Case 2: update already in flight.
        if self.arena.get(child).waiting_for_update() {
            return;
        }

        let next = self.find_indirect_message(child);
        let current = self.arena.get(child).current_message();

        // Case 3: no change in selection.
        if next == current {
            return;
        }

        // Case 4: currently idle, new message available.
        if current.is_none() {
            self.update_indirect_message(child);
            return;
        }

        // Case 5: currently transmitting a different message. Only safe
        // to swap before the first fragment goes out.
        if self.arena.get(child).fragment_offset() == 0 {
            self.arena.get_mut(child).set_waiting_for_update(true);
            self.issue_frame_change(child, FrameChangeKind::Replace);
        }
    }

    fn issue_frame_change(&mut self, child: ChildIndex, kind: FrameChangeKind) {
        match self.poll.request_frame_change(child, kind) {
            FrameChangeOutcome::Immediate => self.update_indirect_message(child),
            FrameChangeOutcome::Deferred => {}
        }
    }

    /// `UpdateIndirectMessage` (spec.md §4.3.3). Also serves as
    /// `HandleFrameChangeDone`, which per spec.md just invokes this.
    fn update_indirect_message(&mut self, child: ChildIndex) {
        let old = self.arena.get(child).current_message();
        self.arena.get_mut(child).set_waiting_for_update(false);
        let next = self.find_indirect_message(child);
        self.arena.get_mut(child).set_current_message(next);
        self.arena.get_mut(child).set_tx_success_so_far(true);
        // The old current message may have become unreferenced while it
        // was still `currentMessage` (e.g. supervision coalescing frees
        // its queue slot but `is_referenced` holds it back — see
        // `find_indirect_message`); retry now that it no longer is.
        if let Some(old_id) = old {
            if Some(old_id) != next {
                self.maybe_free_message(old_id);
            }
        }
        if next.is_some() {
            self.poll.handle_new_frame(child);
        }
    }

    fn resolve_dst_address(&self, child: ChildIndex) -> MacAddress {
        if self.arena.get(child).use_short_address() {
            MacAddress::Short(self.children.rloc16(child))
        } else {
            MacAddress::Extended(self.children.ext_address(child))
        }
    }

    fn dst_addr_mode_bits(dst: MacAddress) -> u16 {
        match dst {
            MacAddress::Short(_) => fcf::DST_ADDR_SHORT,
            MacAddress::Extended(_) => fcf::DST_ADDR_EXT,
        }
    }

    fn src_addr_mode_bits(src: MacAddress) -> u16 {
        match src {
            MacAddress::Short(_) => fcf::SRC_ADDR_SHORT,
            MacAddress::Extended(_) => fcf::SRC_ADDR_EXT,
        }
    }

    /// The parent's own source address for an outgoing frame to `dst`.
    /// Falls back to the extended form when the parent's short address is
    /// not yet valid, or when the destination itself is extended
    /// (`PrepareEmptyFrame`'s `macSource.IsShortAddrInvalid() ||
    /// macDest.IsExtended()` switch, which applies equally to data frames).
    fn resolve_src_address(&self, dst: MacAddress) -> MacAddress {
        if self.mac.short_address() == SHORT_ADDRESS_INVALID || dst.is_extended() {
            MacAddress::Extended(self.mac.extended_address())
        } else {
            MacAddress::Short(self.mac.short_address())
        }
    }

    fn build_empty_frame(&self, child: ChildIndex, ack_request: bool) -> Frame {
        let dst = self.resolve_dst_address(child);
        let src = self.resolve_src_address(dst);
        let mut bits = fcf::FRAME_DATA
            | fcf::FRAME_VERSION_2006
            | fcf::PANID_COMPRESSION
            | fcf::SECURITY_ENABLED
            | Self::src_addr_mode_bits(src)
            | Self::dst_addr_mode_bits(dst);
        if ack_request {
            bits |= fcf::ACK_REQUEST;
        }
        let mut frame = Frame::new();
        frame.init_mac_header(bits, KEY_ID_MODE_1_MIC_32);
        frame.set_dst_pan_id(self.mac.pan_id());
        frame.set_src_pan_id(self.mac.pan_id());
        frame.set_src_addr(src);
        frame.set_dst_addr(dst);
        frame.set_payload_length(0);
        frame
    }

    /// `PrepareFrameForChild` (spec.md §4.3.4).
    pub fn prepare_frame_for_child(&mut self, child: ChildIndex) -> Result<PreparedFrame, Error> {
        if !self.enabled {
            return Err(Error::Abort);
        }
        self.poll.begin_transmission(child);

        let current = self.arena.get(child).current_message();
        let queued_count = self.arena.get(child).queued_count();

        let Some(id) = current else {
            let frame = self.build_empty_frame(child, true);
            return Ok(PreparedFrame {
                frame,
                message: None,
                next_offset: 0,
            });
        };

        let kind = self.queue.get(id).ok_or(Error::NotFound)?.kind();
        match kind {
            MessageType::Ipv6 => {
                let dst = self.resolve_dst_address(child);
                let endpoints = MacEndpoints {
                    src: self.resolve_src_address(dst),
                    dst,
                };
                let mut frame = Frame::new();
                frame.init_mac_header(
                    fcf::FRAME_DATA
                        | fcf::FRAME_VERSION_2006
                        | fcf::PANID_COMPRESSION
                        | fcf::SECURITY_ENABLED
                        | fcf::ACK_REQUEST
                        | Self::src_addr_mode_bits(endpoints.src)
                        | Self::dst_addr_mode_bits(endpoints.dst),
                    KEY_ID_MODE_1_MIC_32,
                );
                frame.set_dst_pan_id(self.mac.pan_id());
                frame.set_src_pan_id(self.mac.pan_id());
                frame.set_src_addr(endpoints.src);
                frame.set_dst_addr(endpoints.dst);

                let offset = self.arena.get(child).fragment_offset();
                let msg = self.queue.get(id).ok_or(Error::NotFound)?.clone();
                let next_offset = self
                    .fragmenter
                    .prepare_data_frame(&mut frame, &msg, offset, endpoints);
                frame.set_frame_pending(queued_count > 1);

                crate::trace!(
                    "prepared ipv6 frame for child {} msg {:?} offset {}..{}",
                    child.get(),
                    id,
                    offset,
                    next_offset
                );
                Ok(PreparedFrame {
                    frame,
                    message: Some(id),
                    next_offset,
                })
            }
            MessageType::Supervision => {
                let mut frame = self.build_empty_frame(child, SUPERVISION_MSG_ACK_REQUEST);
                frame.set_frame_pending(queued_count > 1);
                let len = self.queue.get(id).map(|m| m.len()).unwrap_or(0);
                crate::trace!("prepared supervision frame for child {}", child.get());
                Ok(PreparedFrame {
                    frame,
                    message: Some(id),
                    next_offset: len,
                })
            }
        }
    }

    /// `HandleSentFrameToChild` (spec.md §4.3.5). `message` and
    /// `next_offset` are the values [`PrepareFrameForChild`] returned for
    /// this transmission, not re-read from per-child state, since a
    /// `RequestMessageUpdate` may have already moved `currentMessage` on
    /// by the time the MAC reports completion (spec.md §8, scenario 5).
    pub fn handle_sent_frame_to_child(
        &mut self,
        child: ChildIndex,
        message: Option<MessageId>,
        next_offset: usize,
        outcome: TxOutcome,
    ) -> Result<(), Error> {
        // A tx-complete callback can arrive after `stop()` if it was
        // in flight when the subsystem was disabled; `stop()` already
        // cleared `currentMessage`/source-match/the poll handler for every
        // child, and this late callback must not re-mutate any of it.
        if !self.enabled {
            return Ok(());
        }

        let deferred = self.poll.end_transmission(child);
        let mut promote_failed = false;
        let mut already_updated = false;

        if let Some(msg_id) = message {
            let mut next_offset = next_offset;
            crate::debug!("frame sent to child {} msg {:?}: {:?}", child.get(), msg_id, outcome);
            match outcome {
                TxOutcome::Success => {
                    self.children.add_message_tx_status(child, true);
                }
                TxOutcome::NoAck | TxOutcome::ChannelAccessFailure | TxOutcome::Abort => {
                    self.arena.get_mut(child).set_tx_success_so_far(false);
                    self.children.add_message_tx_status(child, false);
                    if DROP_MESSAGE_ON_FRAGMENT_TX_FAILURE {
                        if let Some(m) = self.queue.get(msg_id) {
                            next_offset = m.len();
                        }
                    }
                }
            }

            let msg_len = self.queue.get(msg_id).map(|m| m.len()).unwrap_or(next_offset);

            if next_offset < msg_len {
                // More fragments remain. A deferred Replace/Purge does not
                // retroactively cancel an already-in-flight message — it
                // only reassigns `currentMessage` once this transmission's
                // own bookkeeping is settled, handled below via the
                // `deferred` check. The message itself keeps its progress
                // and its child bit, to be resumed (or abandoned in favor
                // of a higher-priority selection) on the next poll.
                self.arena.get_mut(child).set_fragment_offset(next_offset);
                self.poll.handle_new_frame(child);
            } else {
                // 1. Clear currentMessage.
                self.arena.get_mut(child).set_current_message(None);
                // 2. Switch source-match to short-address form.
                self.src_match.set_src_match_as_short(
                    child,
                    true,
                    &mut self.arena,
                    &mut self.radio,
                    &self.children,
                );

                // 3. Do-not-drop policy: promote a mid-stream failure even
                // if the last fragment itself succeeded.
                let tx_success = self.arena.get(child).tx_success_so_far();
                promote_failed = !DROP_MESSAGE_ON_FRAGMENT_TX_FAILURE
                    && !tx_success
                    && matches!(outcome, TxOutcome::Success);

                // 4. IP-tx counters: only IPv6 messages feed the IP-tx
                // statistics; a failed Supervision keep-alive is not IP
                // traffic and must not count against it.
                let is_ipv6 = self
                    .queue
                    .get(msg_id)
                    .map(|m| m.kind() == MessageType::Ipv6)
                    .unwrap_or(false);
                if is_ipv6 && !tx_success {
                    self.ip_tx_failures = self.ip_tx_failures.wrapping_add(1);
                }

                // 5. Clear this child's bit if still set, decrement count.
                if let Some(m) = self.queue.get_mut(msg_id) {
                    if m.has_child(child) {
                        m.clear_child(child);
                        self.src_match.decrement_message_count(
                            child,
                            &mut self.arena,
                            &mut self.radio,
                            &self.children,
                        );
                    }
                }

                // 6. Dequeue and free if no consumers remain.
                self.maybe_free_message(msg_id);

                // 7. Pick the next message, if any.
                self.update_indirect_message(child);
                already_updated = true;
            }
        }

        // `HandleFrameChangeDone`: a deferred Purge/Replace completes
        // independently of whether the in-flight transmission above
        // retired its own message — it is the DataPollHandler reporting
        // that the change it was asked for earlier has now taken effect.
        // Calling `update_indirect_message` again when step 7 already did
        // is harmless: it recomputes the same selection.
        if deferred.is_some() && !already_updated {
            self.update_indirect_message(child);
        }

        // 8. Sweep children that left valid/restoring state.
        self.sweep_invalid_children();

        if promote_failed {
            Err(Error::Failed)
        } else {
            Ok(())
        }
    }

    fn is_referenced(&self, msg: MessageId) -> bool {
        (0..MAX_CHILDREN).any(|i| {
            let child = ChildIndex::new(i).expect("i < MAX_CHILDREN");
            self.arena.get(child).current_message() == Some(msg)
        })
    }

    fn maybe_free_message(&mut self, msg: MessageId) {
        let releasable = self.queue.get(msg).map(|m| m.is_releasable()).unwrap_or(false);
        if releasable && !self.is_referenced(msg) {
            crate::debug!("freeing message {:?}", msg);
            self.queue.remove(msg);
        }
    }

    fn sweep_invalid_children(&mut self) {
        let mut stale: HVec<ChildIndex, MAX_CHILDREN> = HVec::new();
        for i in 0..MAX_CHILDREN {
            let child = ChildIndex::new(i).expect("i < MAX_CHILDREN");
            if self.arena.get(child).queued_count() > 0 && !self.children.is_valid_or_restoring(child) {
                let _ = stale.push(child);
            }
        }
        for child in stale {
            self.clear_all_messages_for_sleepy_child(child);
        }
    }
}

const _: () = assert!(MAX_QUEUE_LEN > 0);
