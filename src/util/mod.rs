//! Debug logging utilities shared across the compiler passes.
//!
//! Passes write to named debug streams (`grammar`, `resolver`, `parser-ir`).
//! Streams are disabled by default and enabled once at process start through
//! [enable_debug_streams]; this registry is the only process-wide state the
//! crate keeps.
mod logger;

use once_cell::sync::OnceCell;
use std::collections::HashSet;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// A enum structure to assign multiple level debugging to compiler passes.
pub enum Log<T> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}

static DEBUG_STREAMS: OnceCell<HashSet<String>> = OnceCell::new();

/// Enable a set of named debug streams for the lifetime of the process.
/// Returns false if the registry was already initialized.
pub fn enable_debug_streams<I, S>(streams: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DEBUG_STREAMS
        .set(streams.into_iter().map(|s| s.into()).collect())
        .is_ok()
}

/// Whether a named debug stream has been enabled.
pub fn debug_stream_enabled(stream: &str) -> bool {
    DEBUG_STREAMS
        .get()
        .map_or(false, |streams| streams.contains(stream))
}

/// Write a line to a named debug stream if it is enabled.
pub fn debug_log(stream: &str, line: &str) {
    if debug_stream_enabled(stream) {
        eprintln!("[{}] {}", stream, line);
    }
}
