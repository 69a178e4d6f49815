use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::Command;
use std::sync::Once;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use ptyprocess::PtyProcess;

use super::IoCondition;
use crate::error::Result;

static REAPER_INSTALLED: Once = Once::new();

/// Non-blockingly reclaims any terminated children so dead pty processes
/// never pile up as zombies. Installed once, process-wide; must never block
/// the event loop, so it only ever does a `WNOHANG` wait.
extern "C" fn reap_children(_signum: std::os::raw::c_int) {
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}

fn install_reaper() {
    REAPER_INSTALLED.call_once(|| {
        let action = SigAction::new(
            SigHandler::Handler(reap_children),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // Safety: replaces the process-wide SIGCHLD disposition with a
        // handler that only calls the async-signal-safe `waitpid(WNOHANG)`.
        unsafe {
            sigaction(Signal::SIGCHLD, &action).expect("failed to install SIGCHLD handler");
        }
    });
}

/// A pseudo-terminal-backed child process. The master side is handed to the
/// driver as a single read/write descriptor, mirroring `get_raw_handle` in
/// the underlying pty session.
pub struct ProcessIo {
    argv: Vec<String>,
    proc: PtyProcess,
    file: File,
}

impl ProcessIo {
    /// Spawns `argv[0]` with the remaining elements as arguments, session
    /// leader on the pty slave, raw termios, stdio duped to the slave.
    pub fn spawn(argv: Vec<String>) -> Result<Self> {
        install_reaper();

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);

        let proc = PtyProcess::spawn(cmd)?;
        let file = proc.get_raw_handle()?;

        Ok(Self { argv, proc, file })
    }
}

impl super::IoHandle for ProcessIo {
    fn select_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn get_byte(&mut self) -> std::result::Result<u8, IoCondition> {
        let mut buf = [0u8; 1];
        match self.file.read(&mut buf) {
            Ok(0) => Err(IoCondition::Eof),
            Ok(_) => Ok(buf[0]),
            Err(err) => Err(err.into()),
        }
    }

    fn put_bytes(&mut self, buf: &[u8]) -> std::result::Result<usize, IoCondition> {
        self.file.write(buf).map_err(IoCondition::from)
    }

    fn reopen(&mut self) -> Result<()> {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        let proc = PtyProcess::spawn(cmd)?;
        let file = proc.get_raw_handle()?;
        self.proc = proc;
        self.file = file;
        Ok(())
    }
}
