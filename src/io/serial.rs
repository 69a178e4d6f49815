use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use nix::sys::termios::{self, BaudRate as NixBaud, ControlFlags, SetArg, SpecialCharacterIndices};

use super::IoCondition;
use crate::error::{Error, Result};

/// Recognised serial baud rates. Anything else is a construction failure, per
/// the table in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B1200,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    pub fn from_bps(bps: u32) -> Result<Self> {
        Ok(match bps {
            1200 => BaudRate::B1200,
            2400 => BaudRate::B2400,
            4800 => BaudRate::B4800,
            9600 => BaudRate::B9600,
            19200 => BaudRate::B19200,
            38400 => BaudRate::B38400,
            57600 => BaudRate::B57600,
            115200 => BaudRate::B115200,
            230400 => BaudRate::B230400,
            other => return Err(Error::BadBaudRate(other)),
        })
    }

    fn to_nix(self) -> NixBaud {
        match self {
            BaudRate::B1200 => NixBaud::B1200,
            BaudRate::B2400 => NixBaud::B2400,
            BaudRate::B4800 => NixBaud::B4800,
            BaudRate::B9600 => NixBaud::B9600,
            BaudRate::B19200 => NixBaud::B19200,
            BaudRate::B38400 => NixBaud::B38400,
            BaudRate::B57600 => NixBaud::B57600,
            BaudRate::B115200 => NixBaud::B115200,
            BaudRate::B230400 => NixBaud::B230400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// A TTY device configured raw, local, with the receiver enabled and no flow
/// control - the same posture `PXSerialIO` puts the line in.
#[derive(Debug)]
pub struct SerialIo {
    dev: PathBuf,
    baud: BaudRate,
    data_bits: DataBits,
    parity: Parity,
    stop_bits: StopBits,
    file: File,
}

impl SerialIo {
    pub fn open(
        dev: impl Into<PathBuf>,
        baud: BaudRate,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self> {
        let dev = dev.into();
        let file = Self::open_configured(&dev, baud, data_bits, parity, stop_bits)?;
        Ok(Self {
            dev,
            baud,
            data_bits,
            parity,
            stop_bits,
            file,
        })
    }

    fn open_configured(
        dev: &PathBuf,
        baud: BaudRate,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<File> {
        let file = OpenOptions::new().read(true).write(true).open(dev)?;
        let fd = file.as_raw_fd();

        let mut tio = termios::tcgetattr(fd)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetospeed(&mut tio, baud.to_nix())?;
        termios::cfsetispeed(&mut tio, baud.to_nix())?;

        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

        tio.control_flags.insert(ControlFlags::CLOCAL | ControlFlags::CREAD);

        match parity {
            Parity::Even => tio.control_flags.insert(ControlFlags::PARENB),
            Parity::Odd => tio
                .control_flags
                .insert(ControlFlags::PARENB | ControlFlags::PARODD),
            Parity::None => tio
                .control_flags
                .remove(ControlFlags::PARENB | ControlFlags::PARODD),
        }

        tio.control_flags.remove(ControlFlags::CSIZE);
        tio.control_flags.insert(match data_bits {
            DataBits::Seven => ControlFlags::CS7,
            DataBits::Eight => ControlFlags::CS8,
        });

        match stop_bits {
            StopBits::Two => tio.control_flags.insert(ControlFlags::CSTOPB),
            StopBits::One => tio.control_flags.remove(ControlFlags::CSTOPB),
        }

        termios::tcsetattr(fd, SetArg::TCSANOW, &tio)?;
        Ok(file)
    }
}

impl super::IoHandle for SerialIo {
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
        self.file = Self::open_configured(
            &self.dev,
            self.baud,
            self.data_bits,
            self.parity,
            self.stop_bits,
        )?;
        Ok(())
    }
}
