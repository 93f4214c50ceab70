//! Outbound message framing and buffered writes.
//!
//! `put` accepts exactly one complete encoded message, mirrors it to the
//! tap when one is open, and tries to hand it to the socket immediately;
//! whatever the socket does not take is parked in the bounded output
//! buffer and pushed later when the loop sees writability.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::logging;
use ccn_wire::coding::check_message_framing;
use std::io::{self, Write};

/// The output buffer bound. A `put` that would overflow it fails with
/// `Error::Backpressure` instead of growing without limit.
pub(crate) const OUTBUF_CAPACITY: usize = 8 * 65536;

/// Outcome of a successful `put` or `pushout`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PutStatus {
    /// Everything is on the wire.
    Sent,
    /// Some bytes remain buffered; the loop will flush them.
    Buffered,
}

impl Handle {
    /// Queue one encoded message for transmission.
    pub fn put(&mut self, bytes: &[u8]) -> Result<PutStatus> {
        if bytes.is_empty() || check_message_framing(bytes).is_err() {
            return self.note_err(Error::InvalidArg, "put");
        }

        if let Some(tap) = self.tap.as_mut() {
            if let Err(err) = tap.write_all(bytes) {
                logging::error!(self.log, "tap write failed, closing tap"; "err" => ?err);
                self.tap = None;
            }
        }

        if self.output_is_pending() {
            if self.outbuf.len() + bytes.len() > OUTBUF_CAPACITY {
                return self.note_err(Error::Backpressure, "put");
            }
            self.outbuf.extend(bytes);
            return self.pushout();
        }

        // No backlog: try the socket directly.
        let written = match self.sock.as_mut() {
            None => 0,
            Some(stream) => match stream.write(bytes) {
                Ok(count) => count,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => 0,
                Err(err) => return self.note_err(err.into(), "put"),
            },
        };
        if written == bytes.len() {
            logging::trace!(self.log, "message sent"; "size" => bytes.len());
            return Ok(PutStatus::Sent);
        }
        if bytes.len() - written > OUTBUF_CAPACITY {
            return self.note_err(Error::Backpressure, "put");
        }
        self.outbuf.extend(&bytes[written..]);
        logging::trace!(self.log, "message partially sent, remainder buffered";
                        "size" => bytes.len(),
                        "written" => written);
        Ok(PutStatus::Buffered)
    }

    /// Flush as much buffered output as the socket accepts.
    pub fn pushout(&mut self) -> Result<PutStatus> {
        if !self.output_is_pending() {
            return Ok(PutStatus::Sent);
        }
        let stream = match self.sock.as_mut() {
            Some(stream) => stream,
            None => return Ok(PutStatus::Buffered),
        };
        match self.outbuf.egress(stream) {
            Ok(count) => {
                logging::trace!(self.log, "output drained"; "count" => count);
                Ok(PutStatus::Sent)
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(PutStatus::Buffered),
            Err(err) => self.note_err(err.into(), "pushout"),
        }
    }

    /// True while buffered output is waiting on socket writability.
    #[inline]
    pub fn output_is_pending(&self) -> bool {
        !self.outbuf.is_empty()
    }

    /// Bytes currently parked in the output buffer, for callers that want
    /// to throttle.
    #[inline]
    pub fn pending_bytes(&self) -> usize {
        self.outbuf.len()
    }
}
