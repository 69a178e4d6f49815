//! The error type used throughout [crate].

use thiserror::Error;

/// Result type for driver and CLI operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A pattern failed to compile as a regex on first use.
    #[error("invalid regex '{0}'")]
    BadRegex(String),

    /// An IO operation failed fatally (not a transient would-block/interrupted condition).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A unix syscall (termios, select, ...) failed.
    #[error("system call error: {0}")]
    Nix(#[from] nix::Error),

    /// Spawning or controlling a pty-backed child process failed.
    #[error("pty error: {0}")]
    Pty(#[from] ptyprocess::Error),

    /// The stream reached end of input while an expectation was still waiting.
    #[error("end of stream reached before expectation was met")]
    Eof,

    /// No expectation was satisfied before its deadline, or no expectation
    /// existed to begin with.
    #[error("timed out waiting for an expectation")]
    Timeout,

    /// A channel index given to the CLI doesn't exist.
    #[error("no such channel: {0}")]
    NoSuchChannel(usize),

    /// A baud rate wasn't in the recognised table.
    #[error("unsupported baud rate: {0}")]
    BadBaudRate(u32),

    /// The CLI line didn't parse: unmatched quote, trailing backslash, or
    /// wrong argument count/types for the command.
    #[error("bad arguments: {0}")]
    BadArgs(String),

    /// The CLI line's leading token wasn't a recognised command.
    #[error("unknown command")]
    UnknownCommand,
}
