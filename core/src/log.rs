// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A minimal stand-in for the teacher's `kernel::debug!`: this crate has no
//! kernel to hand a debug UART to, so instead a host process installs a
//! [`LogSink`] once at startup and the `debug!`/`trace!` macros forward to
//! it. With no sink installed, logging is a no-op rather than a panic.

use core::fmt::Arguments;

/// Severity of a single log line, ordered from most to least serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Trace,
}

/// Implemented by whatever the host platform uses to surface log lines
/// (a UART, a ring buffer, `defmt`, ...).
pub trait LogSink {
    fn log(&self, level: Level, args: Arguments<'_>);
}

struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: Level, _args: Arguments<'_>) {}
}

static NULL_SINK: NullSink = NullSink;

// Single-threaded cooperative scheduling (spec.md §5) means the sink is set
// once at startup, before the event loop that could call `debug!`/`trace!`
// begins; there is no concurrent writer to race with readers.
static mut SINK: Option<&'static dyn LogSink> = None;

/// Installs the process-wide log sink. Call once, before starting the
/// subsystem.
pub fn set_sink(sink: &'static dyn LogSink) {
    unsafe {
        SINK = Some(sink);
    }
}

#[doc(hidden)]
pub fn dispatch(level: Level, args: Arguments<'_>) {
    let sink = unsafe { SINK }.unwrap_or(&NULL_SINK);
    sink.log(level, args);
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Trace, format_args!($($arg)*))
    };
}
