// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Address and PAN types shared by the MAC frame builder and the indirect
//! sender. Mirrors `capsules-extra/src/net/ieee802154.rs` in scope, trimmed
//! to the subset the indirect transmission subsystem actually touches —
//! full frame (de)serialization is the MAC driver's job (spec.md §1,
//! "Out of scope").

pub mod ieee802154;
