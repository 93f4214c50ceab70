//! Wire-level support for the CCN client: the tagged binary coding, the
//! incremental skeleton decoder used for message framing, structured parsers
//! for Interests and ContentObjects, and the digest/signature primitives.
//!
//! Everything in here is pure bytes-in/bytes-out; no sockets, no clocks.

pub mod coding;
pub mod content;
pub mod crypto;
pub mod decoder;
pub mod interest;
pub mod name;

use std::ops::Range;

/// Errors raised by the codec and parsers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WireError {
    BadToken,
    BadElement,
    BadNumber,
    Truncated,
    BadKey,
    BadSignature,
}

pub type WireResult<T> = std::result::Result<T, WireError>;

/// An empty range anchored at `at`. Parsers use this for absent elements so
/// the offset still marks the insertion point.
#[inline]
pub(crate) fn empty_at(at: usize) -> Range<usize> {
    at..at
}
