// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The 6LoWPAN fragmenter, an external collaborator (spec.md §1, §6). This
//! subsystem only calls it, never implements it; `PrepareDataFrame` is the
//! single entry point it needs from that layer.

use crate::mac::{Frame, MacEndpoints};
use crate::thread::message::Message;

/// Builds one fragment of `msg`, starting at `msg`'s current fragment
/// offset, into `frame`, and returns the offset the next fragment should
/// start at (or `msg.len()` when the message is fully sent).
///
/// Implemented by the 6LoWPAN layer; out of scope here (spec.md §1).
pub trait Fragmenter {
    fn prepare_data_frame(
        &mut self,
        frame: &mut Frame,
        msg: &Message,
        offset: usize,
        endpoints: MacEndpoints,
    ) -> usize;
}
