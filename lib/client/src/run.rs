//! The client event loop.
//!
//! One socket, one poll. Each turn runs the scheduler to learn the next
//! deadline, sleeps on the socket no longer than that (or the caller's
//! budget), then drains writes and reads. Upcalls run on this thread and
//! may express interests, set filters, or end the loop by zeroing the run
//! timeout; what they must not do is call `run` again.

use crate::error::{Error, Result};
use crate::handle::{Handle, SOCK_TOKEN};
use crate::input::InputStatus;
use crate::logging;
use std::io;
use std::time::Duration;

impl Handle {
    /// Replace the run timeout (milliseconds; negative = no deadline) and
    /// return the previous value. An upcall that sets it to zero makes the
    /// loop exit once the current callback unwinds.
    pub fn set_run_timeout(&mut self, timeout_ms: i64) -> i64 {
        let old = self.timeout;
        self.timeout = timeout_ms;
        old
    }

    /// Run the event loop for up to `timeout_ms` milliseconds (negative:
    /// until told to stop). May serve as a simple application's main loop.
    pub fn run(&mut self, timeout_ms: i64) -> Result<()> {
        if self.running != 0 {
            return self.note_err(Error::Busy, "run");
        }
        self.timeout = timeout_ms;
        let mut start = None;
        loop {
            if self.sock.is_none() {
                return self.note_err(Error::NotConnected, "run");
            }
            let microsec = self.process_scheduled_operations();
            let timeout = self.timeout;
            let now = self.sample_clock();
            match start {
                None => start = Some(now),
                Some(start) => {
                    if timeout >= 0 {
                        let elapsed_ms = now.saturating_duration_since(start).as_millis() as i64;
                        if elapsed_ms > timeout {
                            return Ok(());
                        }
                    }
                }
            }

            let mut millis = microsec / 1000;
            if timeout >= 0 && timeout < millis {
                millis = timeout;
            }
            let poll = self.poll.as_mut().expect("connected handle has a poll");
            match poll.poll(&mut self.events, Some(Duration::from_millis(millis.max(0) as u64))) {
                Ok(()) => {}
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return self.note_err(err.into(), "run"),
            }

            let mut readable = false;
            let mut writable = false;
            for event in self.events.iter() {
                if event.token() != SOCK_TOKEN {
                    continue;
                }
                if event.is_readable() || event.is_read_closed() {
                    readable = true;
                }
                if event.is_writable() {
                    writable = true;
                }
            }

            if writable {
                let _ = self.pushout();
            }
            if readable {
                loop {
                    match self.process_input() {
                        Ok(InputStatus::Progress) => continue,
                        Ok(InputStatus::WouldBlock) | Ok(InputStatus::Eof) | Err(_) => break,
                    }
                }
            }

            if self.last_error == Some(Error::Io(io::ErrorKind::NotConnected)) {
                logging::debug!(self.log, "session dropped, disconnecting");
                self.disconnect()?;
            }
            if self.timeout == 0 {
                return Ok(());
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upcall::{Action, UpcallKind, UpcallResult};
    use ccn_wire::coding::{append_closer, append_tag, DTag};
    use ccn_wire::name::encode_name;
    use std::cell::Cell;
    use std::io::Write;
    use std::os::unix::net::{UnixListener, UnixStream as StdUnixStream};
    use std::rc::Rc;
    use std::time::Instant;

    fn socket_pair(tag: &str) -> (Handle, StdUnixStream) {
        let path = std::env::temp_dir().join(format!("ccn-run-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        let mut handle = Handle::new(None);
        handle.connect(Some(path.to_str().unwrap())).unwrap();
        let (peer, _) = listener.accept().unwrap();
        let _ = std::fs::remove_file(&path);
        (handle, peer)
    }

    fn interest_msg(comps: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        append_tag(&mut buf, DTag::Interest);
        buf.extend_from_slice(&encode_name(comps));
        append_closer(&mut buf);
        buf
    }

    #[test]
    fn test_set_run_timeout_returns_previous() {
        let mut handle = Handle::new(None);
        assert_eq!(handle.set_run_timeout(5000), -1);
        assert_eq!(handle.set_run_timeout(0), 5000);
        assert_eq!(handle.set_run_timeout(-1), 0);
    }

    #[test]
    fn test_run_without_connection_fails() {
        let mut handle = Handle::new(None);
        assert_eq!(handle.run(10), Err(Error::NotConnected));
    }

    #[test]
    fn test_run_rejects_reentrance() {
        let (mut handle, mut peer) = socket_pair("busy");
        let name = encode_name(&[b"x".as_ref()]);
        let seen = Rc::new(Cell::new(None));
        let inner = seen.clone();
        let action = Action::new(move |h: &mut Handle, kind, _| {
            if kind == UpcallKind::Interest {
                inner.set(Some(h.run(5)));
                h.set_run_timeout(0);
            }
            UpcallResult::Ok
        });
        handle.set_interest_filter(&name, Some(action)).unwrap();

        peer.write_all(&interest_msg(&[b"x", b"y"])).unwrap();
        handle.run(500).unwrap();

        assert_eq!(seen.get(), Some(Err(Error::Busy)));
    }

    #[test]
    fn test_run_honours_deadline() {
        let (mut handle, _peer) = socket_pair("deadline");
        let begun = Instant::now();
        handle.run(50).unwrap();
        let took = begun.elapsed();
        assert!(took >= Duration::from_millis(45), "returned in {:?}", took);
        assert!(took < Duration::from_secs(2), "took {:?}", took);
    }

    #[test]
    fn test_run_zero_timeout_single_pass() {
        let (mut handle, _peer) = socket_pair("zero");
        let begun = Instant::now();
        handle.run(0).unwrap();
        assert!(begun.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_upcall_zero_timeout_exits_loop() {
        let (mut handle, mut peer) = socket_pair("exit");
        let name = encode_name(&[b"x".as_ref()]);
        let action = Action::new(move |h: &mut Handle, kind, _| {
            if kind == UpcallKind::Interest {
                h.set_run_timeout(0);
            }
            UpcallResult::Ok
        });
        handle.set_interest_filter(&name, Some(action)).unwrap();

        peer.write_all(&interest_msg(&[b"x"])).unwrap();
        // No caller deadline at all; the upcall ends the loop.
        let begun = Instant::now();
        handle.run(-1).unwrap();
        assert!(begun.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_run_exits_on_peer_close() {
        let (mut handle, peer) = socket_pair("close");
        drop(peer);
        assert_eq!(handle.run(2000), Err(Error::NotConnected));
        assert!(handle.get_fd().is_none());
    }
}
