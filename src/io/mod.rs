//! IO handle abstraction consumed by the driver's event loop.
//!
//! The driver never knows whether it's talking to a child process on a pty, a
//! serial device, or a plain file - it only needs a selectable descriptor and
//! byte-level get/put with well-defined transient-vs-fatal conditions. This
//! module defines that contract ([IoHandle]) and its three concrete endpoints.

mod file;
mod process;
mod serial;

pub use file::FileIo;
pub use process::ProcessIo;
pub use serial::{BaudRate, DataBits, Parity, SerialIo, StopBits};

use std::io;
use std::os::unix::io::RawFd;

use crate::error::Result;

/// The outcome of a single byte-level read or write attempt.
#[derive(Debug)]
pub enum IoCondition {
    /// No data available right now; not an error, just "come back later".
    WouldBlock,
    /// The underlying syscall was interrupted (EINTR); retry is appropriate.
    Interrupted,
    /// The stream reached its end.
    Eof,
    /// Anything else: propagates out of the driver.
    Fatal(io::Error),
}

impl From<io::Error> for IoCondition {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => IoCondition::WouldBlock,
            io::ErrorKind::Interrupted => IoCondition::Interrupted,
            _ => IoCondition::Fatal(err),
        }
    }
}

/// A readable/writable endpoint the driver can multiplex over `select(2)`.
///
/// Implementors are expected to be used only after the driver's readiness
/// wait has reported the descriptor as readable; `get_byte` therefore performs
/// a single blocking-sized read of exactly one byte (see §4.3's "one byte per
/// ready descriptor per loop turn" design choice) rather than managing its
/// own non-blocking mode.
pub trait IoHandle {
    /// A descriptor usable with a readiness-wait primitive. Stable across reads,
    /// but may change after [IoHandle::reopen].
    fn select_fd(&self) -> RawFd;

    /// Reads exactly one byte, or fails with a transient/fatal [IoCondition].
    fn get_byte(&mut self) -> std::result::Result<u8, IoCondition>;

    /// Writes `buf` in full, or fails with a transient/fatal [IoCondition].
    fn put_bytes(&mut self, buf: &[u8]) -> std::result::Result<usize, IoCondition>;

    /// Closes and reconstructs the underlying endpoint. The descriptor
    /// returned by `select_fd` may differ afterwards.
    fn reopen(&mut self) -> Result<()>;
}
