use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use super::IoCondition;
use crate::error::Result;

/// A plain file opened read-write. Used for playback against preloaded
/// fixture files as much as genuine device nodes/FIFOs.
#[derive(Debug)]
pub struct FileIo {
    path: PathBuf,
    file: File,
}

impl FileIo {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self { path, file })
    }
}

impl super::IoHandle for FileIo {
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
        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        Ok(())
    }
}
