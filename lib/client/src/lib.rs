//! Client runtime for content-centric networking: express interests in
//! named data, answer interests with signed content, and drive the
//! protocol over a unix socket to the local forwarder daemon.
//!
//! Everything runs single-threaded and cooperatively on [`Handle::run`]:
//! the loop polls the one socket, frames inbound messages, dispatches
//! them to registered upcalls under longest-prefix matching, ages and
//! retransmits outstanding interests, and fetches missing publisher keys
//! on demand while the triggering interest waits.

pub mod buffer;
mod dispatch;
pub mod error;
mod get;
pub mod handle;
mod input;
mod interests;
mod keystore;
pub mod logging;
mod output;
mod run;
mod schedule;
pub mod upcall;

pub use ccn_wire as wire;

pub use error::{Error, Result};
pub use handle::{Handle, DEFAULT_LOCAL_SOCKNAME};
pub use output::PutStatus;
pub use upcall::{Action, ActionRef, UpcallFn, UpcallInfo, UpcallKind, UpcallResult};

/// Protocol lifetime of an outstanding interest, in microseconds. An
/// interest unanswered for this long is reconsidered by the scheduler.
pub const INTEREST_LIFETIME_MICROSEC: i64 = 4_000_000;
