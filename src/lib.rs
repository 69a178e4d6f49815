//! `parex`: a single-threaded driver that multiplexes several character
//! streams - pty-backed child processes, serial ports, plain files - and
//! matches their output against regexes under per-expectation deadlines.
//!
//! [Driver] owns the event loop and a set of [Channel]s; [Printer]
//! implementations receive byte/match/timeout events as they happen. The
//! `parexsh` binary built on top is a thin line-oriented shell over these
//! three pieces; see [cli::Shell].

pub mod channel;
pub mod cli;
pub mod driver;
mod error;
pub mod expect;
pub mod io;
pub mod printer;

pub use channel::Channel;
pub use cli::Shell;
pub use driver::{ChannelId, Driver};
pub use error::{Error, Result};
pub use expect::ExpectMode;
pub use printer::{InterleavedPrinter, Printer};
