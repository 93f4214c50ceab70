//! Inbound stream framing.
//!
//! One read per call; the skeleton decoder walks the new bytes and every
//! time it pauses at a message boundary the bytes are handed to the
//! dispatcher. Whatever partial message remains is kept at the start of
//! the buffer for the next read. The event loop calls this until the
//! socket reports WouldBlock.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::logging;
use std::io;

/// How much fresh tail space each read pass asks for.
const READ_HEADROOM: usize = 8800;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum InputStatus {
    /// Bytes were read and any completed messages dispatched.
    Progress,
    /// Nothing available right now.
    WouldBlock,
    /// The peer closed the stream; the handle has disconnected.
    Eof,
}

impl Handle {
    pub(crate) fn process_input(&mut self) -> Result<InputStatus> {
        if self.sock.is_none() {
            return self.note_err(Error::NotConnected, "process_input");
        }
        if self.inbuf.is_empty() {
            self.decoder.reset();
        }

        let read = {
            let stream = self.sock.as_mut().expect("socket checked above");
            self.inbuf.ingress_once(stream, READ_HEADROOM)
        };
        let count = match read {
            Ok(0) => {
                logging::debug!(self.log, "end of stream from forwarder");
                self.disconnect()?;
                return Ok(InputStatus::Eof);
            }
            Ok(count) => count,
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Ok(InputStatus::WouldBlock)
            }
            Err(err) => return self.note_err(err.into(), "process_input"),
        };
        logging::trace!(self.log, "received"; "count" => count);

        // Dispatch every complete message the decoder finds.
        let mut msg_start = 0usize;
        loop {
            let slice = self.inbuf.read_slice();
            self.decoder.feed(&slice[self.decoder.index()..]);
            if self.decoder.is_error() {
                logging::debug!(self.log, "corrupt inbound stream, disconnecting");
                self.disconnect()?;
                return self.note_err(Error::Io(io::ErrorKind::InvalidData), "process_input");
            }
            if !self.decoder.is_complete() {
                break;
            }
            let end = self.decoder.index();
            let msg = self.inbuf.read_slice()[msg_start..end].to_vec();
            self.dispatch_message(&msg);
            msg_start = end;
        }

        if msg_start > 0 {
            self.inbuf.consume(msg_start);
            self.decoder.rebase(msg_start);
            // Keep any partial tail at the physical start of the buffer.
            self.inbuf.compact();
        }
        if self.inbuf.is_empty() {
            self.decoder.reset();
        }
        Ok(InputStatus::Progress)
    }
}
