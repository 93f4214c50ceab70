//! Logging plumbing. The handle carries a structured logger; callers pass
//! one in, or the `CCN_DEBUG` environment variable turns on a terminal
//! logger for ad-hoc debugging.

pub use slog::{debug, error, info, o, trace, warn, Discard, Drain, Logger};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Build a stderr terminal logger at debug level.
pub fn term_logger() -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Debug);
    builder.destination(Destination::Stderr);
    builder.build().expect("terminal logger construction failed")
}

/// The logger a handle falls back to when the caller supplies none:
/// a terminal logger when `CCN_DEBUG` is set to anything non-empty,
/// otherwise discard.
pub fn default_logger() -> Logger {
    match std::env::var("CCN_DEBUG") {
        Ok(v) if !v.is_empty() => term_logger(),
        _ => Logger::root(Discard, o!()),
    }
}
