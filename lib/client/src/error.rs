use std::io;

/// Client-side failures. `Io` carries the OS reason; the rest are internal
/// conditions. `Defect` marks can't-happen paths so they surface in logs
/// instead of corrupting state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// Malformed argument: bad name, bad template, double connect.
    InvalidArg,
    /// The event loop is already running on this handle.
    Busy,
    NotConnected,
    /// The bounded output buffer cannot take the message.
    Backpressure,
    /// A blocking `get` expired without an answer.
    TimedOut,
    Defect(&'static str),
    Io(io::ErrorKind),
}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        Error::Io(io_error.kind())
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
