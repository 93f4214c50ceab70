//! The process-local client context: one socket to the forwarder, the I/O
//! buffers, the registries, and the clocks. Everything else in this crate
//! is an `impl Handle` block layered on top of this state.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::interests::ExpressedInterest;
use crate::keystore::KeyStore;
use crate::logging::{self, Logger};
use crate::upcall::ActionRef;
use ccn_wire::coding::SkeletonDecoder;
use indexmap::IndexMap;
use mio::net::UnixStream;
use mio::{Events, Interest, Poll, Token};
use std::env;
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::process;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Well-known socket of the local forwarder daemon.
pub const DEFAULT_LOCAL_SOCKNAME: &str = "/tmp/.ccnd.sock";

pub(crate) const SOCK_TOKEN: Token = Token(0);

pub struct Handle {
    pub(crate) sock: Option<UnixStream>,
    /// Path of the live connection, so a nested one-shot handle can reach
    /// the same daemon.
    pub(crate) sock_path: Option<String>,
    pub(crate) poll: Option<Poll>,
    pub(crate) events: Events,
    pub(crate) inbuf: Buffer,
    pub(crate) outbuf: Buffer,
    pub(crate) decoder: SkeletonDecoder,
    pub(crate) interests: IndexMap<Vec<u8>, Vec<ExpressedInterest>>,
    pub(crate) filters: IndexMap<Vec<u8>, ActionRef>,
    pub(crate) keys: KeyStore,
    /// Clock sample shared by the scheduler and refresh bookkeeping.
    pub(crate) now: Option<Instant>,
    /// Caller-requested run deadline in milliseconds; negative = none.
    pub(crate) timeout: i64,
    /// Microseconds until the next scheduled work.
    pub(crate) refresh_us: i64,
    pub(crate) last_error: Option<Error>,
    pub(crate) tap: Option<File>,
    /// Re-entrance counter; non-zero while the dispatcher or the scheduler
    /// is on the stack.
    pub(crate) running: u32,
    pub(crate) deferred_finals: Vec<ActionRef>,
    pub(crate) log: Logger,
}

impl Handle {
    /// Create a handle. Not yet connected. Absent an explicit logger the
    /// `CCN_DEBUG` environment variable decides between a terminal logger
    /// and silence; `CCN_TAP` opens the outbound message mirror.
    pub fn new<'a, L: Into<Option<&'a Logger>>>(log: L) -> Handle {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => logging::default_logger(),
        };
        let tap = Self::open_tap(&log);

        Handle {
            sock: None,
            sock_path: None,
            poll: None,
            events: Events::with_capacity(32),
            inbuf: Buffer::new(),
            outbuf: Buffer::new(),
            decoder: SkeletonDecoder::new(),
            interests: IndexMap::new(),
            filters: IndexMap::new(),
            keys: KeyStore::new(),
            now: None,
            timeout: -1,
            refresh_us: 0,
            last_error: None,
            tap,
            running: 0,
            deferred_finals: Vec::new(),
            log,
        }
    }

    /// Connect to the local forwarder. `path` None selects the default
    /// socket, with an optional suffix from `CCN_LOCAL_PORT`. Fails with
    /// `InvalidArg` if the handle is already connected.
    pub fn connect(&mut self, path: Option<&str>) -> Result<RawFd> {
        self.last_error = None;
        if self.sock.is_some() {
            return self.note_err(Error::InvalidArg, "connect");
        }
        let path = Self::local_sock_path(path);

        let stream = match StdUnixStream::connect(&path) {
            Ok(stream) => stream,
            Err(err) => {
                logging::debug!(self.log, "connect failed"; "path" => %path, "err" => ?err);
                return self.note_err(err.into(), "connect");
            }
        };
        if let Err(err) = stream.set_nonblocking(true) {
            return self.note_err(err.into(), "connect");
        }
        let mut stream = UnixStream::from_std(stream);

        let poll = match Poll::new() {
            Ok(poll) => poll,
            Err(err) => return self.note_err(err.into(), "connect"),
        };
        let registered = poll.registry().register(
            &mut stream,
            SOCK_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        );
        if let Err(err) = registered {
            return self.note_err(err.into(), "connect");
        }

        let fd = stream.as_raw_fd();
        logging::debug!(self.log, "connected"; "path" => %path, "fd" => fd);
        self.sock = Some(stream);
        self.sock_path = Some(path);
        self.poll = Some(poll);
        Ok(fd)
    }

    /// The connection fd, for callers integrating with an external poll.
    #[inline]
    pub fn get_fd(&self) -> Option<RawFd> {
        self.sock.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Drop the connection and both stream buffers.
    pub fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.sock.take() {
            if let Some(poll) = self.poll.as_ref() {
                let _ = poll.registry().deregister(&mut stream);
            }
            logging::debug!(self.log, "disconnected";
                            "pending_out" => self.outbuf.len(),
                            "pending_in" => self.inbuf.len());
        }
        self.poll = None;
        self.inbuf.clear();
        self.outbuf.clear();
        self.decoder.reset();
        Ok(())
    }

    /// The error recorded by the most recent failing operation.
    #[inline]
    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    /// Record an error against this handle and fail with it.
    pub(crate) fn note_err<T>(&mut self, err: Error, site: &'static str) -> Result<T> {
        logging::debug!(self.log, "error noted"; "site" => site, "err" => ?err);
        self.last_error = Some(err);
        Err(err)
    }

    pub(crate) fn sample_clock(&mut self) -> Instant {
        match self.now {
            Some(now) => now,
            None => {
                let now = Instant::now();
                self.now = Some(now);
                now
            }
        }
    }

    fn local_sock_path(name: Option<&str>) -> String {
        if let Some(name) = name {
            if !name.is_empty() {
                return name.to_string();
            }
        }
        match env::var("CCN_LOCAL_PORT") {
            Ok(port) if !port.is_empty() && port.len() <= 10 => {
                format!("{}.{}", DEFAULT_LOCAL_SOCKNAME, port)
            }
            _ => DEFAULT_LOCAL_SOCKNAME.to_string(),
        }
    }

    fn open_tap(log: &Logger) -> Option<File> {
        let prefix = match env::var("CCN_TAP") {
            Ok(prefix) if !prefix.is_empty() => prefix,
            _ => return None,
        };
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let path = format!(
            "{}-{}-{}-{}",
            prefix,
            process::id(),
            stamp.as_secs(),
            stamp.subsec_micros()
        );
        match OpenOptions::new().append(true).create(true).open(&path) {
            Ok(file) => {
                logging::info!(log, "tap writing outbound messages"; "path" => %path);
                Some(file)
            }
            Err(err) => {
                logging::error!(log, "unable to open tap file"; "path" => %path, "err" => ?err);
                None
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let _ = self.disconnect();
        let interests = std::mem::take(&mut self.interests);
        for (_, mut list) in interests {
            for rec in list.iter_mut() {
                rec.retire_for_destroy();
                if let Some(action) = rec.take_action() {
                    self.release_action(action);
                }
            }
        }
        let filters = std::mem::take(&mut self.filters);
        for (_, action) in filters {
            self.release_action(action);
        }
        self.fire_deferred_finals();
    }
}
