//! The event loop: multiplexes every channel's descriptor, drains readable
//! bytes one at a time, and runs the match pass that decides whether a
//! `wait_for_*` call can return.

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use nix::sys::select::{select, FdSet};
use nix::sys::time::{TimeVal, TimeValLike};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::expect::ExpectMode;
use crate::io::IoCondition;
use crate::printer::Printer;

/// An opaque, stable identifier for a channel, assigned at [Driver::add_channel]
/// time and never reused within the same driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

/// Owns every channel and the printer they report to; hosts the single-
/// threaded event loop described in spec §4.3.
pub struct Driver {
    printer: Box<dyn Printer>,
    channels: Vec<(ChannelId, Channel)>,
    next_id: u64,
}

impl Driver {
    pub fn new(printer: Box<dyn Printer>) -> Self {
        Self {
            printer,
            channels: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add_channel(&mut self, channel: Channel) -> ChannelId {
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        self.printer.add_channel(id, channel.name());
        self.channels.push((id, channel));
        id
    }

    pub fn remove_channel(&mut self, id: ChannelId) {
        if let Some(pos) = self.channels.iter().position(|(cid, _)| *cid == id) {
            let (id, channel) = self.channels.remove(pos);
            // The interleaved printer deliberately ignores removal to keep its
            // column layout stable; the call still happens so other printer
            // implementations may react differently.
            self.printer.remove_channel(id, channel.name());
        }
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|(cid, _)| *cid == id).map(|(_, c)| c)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|(cid, _)| *cid == id)
            .map(|(_, c)| c)
    }

    pub fn add_expect(
        &mut self,
        id: ChannelId,
        pattern: impl Into<String>,
        timeout: Duration,
        mode: ExpectMode,
    ) -> Result<()> {
        let channel = self
            .channel_mut(id)
            .ok_or_else(|| Error::BadArgs(format!("no channel with id {:?}", id)))?;
        channel.add_expect(pattern, timeout, mode);
        Ok(())
    }

    pub fn clear_expects(&mut self, id: ChannelId) -> Result<()> {
        let channel = self
            .channel_mut(id)
            .ok_or_else(|| Error::BadArgs(format!("no channel with id {:?}", id)))?;
        channel.clear_expects();
        Ok(())
    }

    pub fn write(&mut self, id: ChannelId, bytes: &[u8]) -> Result<()> {
        let channel = self
            .channel_mut(id)
            .ok_or_else(|| Error::BadArgs(format!("no channel with id {:?}", id)))?;
        channel.write(bytes).map_err(|cond| match cond {
            IoCondition::Fatal(e) => Error::Io(e),
            _ => Error::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "write would block",
            )),
        })?;
        Ok(())
    }

    fn have_expectations(&self) -> bool {
        self.channels.iter().any(|(_, c)| c.has_expectations())
    }

    /// The minimum deadline among every group's head (first) expectation,
    /// across every channel. Only heads are "live": later stages of a serial
    /// chain can't satisfy before earlier ones consume buffer, so they don't
    /// govern how long the wait may block.
    fn next_deadline(&self) -> Option<Instant> {
        self.channels
            .iter()
            .flat_map(|(_, c)| c.groups().iter())
            .filter_map(|g| g.first())
            .map(|e| e.deadline())
            .min()
    }

    /// The (channel, pattern, timeout) of the head expectation with the
    /// earliest deadline - used to report which expectation caused a timeout.
    fn earliest_head(&self) -> Option<(ChannelId, String, Duration)> {
        let mut best: Option<(ChannelId, String, Duration, Instant)> = None;
        for (id, c) in &self.channels {
            for g in c.groups().iter() {
                if let Some(e) = g.first() {
                    let better = match &best {
                        None => true,
                        Some((_, _, _, deadline)) => e.deadline() < *deadline,
                    };
                    if better {
                        best = Some((*id, e.pattern().to_owned(), e.timeout(), e.deadline()));
                    }
                }
            }
        }
        best.map(|(id, pattern, timeout, _)| (id, pattern, timeout))
    }

    /// Runs `expectation_met` over every channel, in channel-list order,
    /// stopping at (and returning) the first that succeeds.
    fn check_all(&mut self) -> Result<Option<ChannelId>> {
        for (id, channel) in self.channels.iter_mut() {
            if channel.expectation_met()? {
                let id = *id;
                self.printer.matched(id, channel.last_match());
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Like [Driver::check_all], but restricted to the given channel ids,
    /// still visited in channel-list order.
    fn check_some(&mut self, touched: &[ChannelId]) -> Result<Option<ChannelId>> {
        for (id, channel) in self.channels.iter_mut() {
            if !touched.contains(id) {
                continue;
            }
            if channel.expectation_met()? {
                let id = *id;
                self.printer.matched(id, channel.last_match());
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn build_fd_set(&self) -> (FdSet, RawFd) {
        let mut fds = FdSet::new();
        let mut highest: RawFd = 0;
        for (_, channel) in &self.channels {
            let fd = channel_fd(channel);
            fds.insert(fd);
            if fd > highest {
                highest = fd;
            }
        }
        (fds, highest)
    }

    /// Blocks until at least one channel's descriptor is readable or
    /// `deadline` passes, retrying transparently across EINTR. Absolute
    /// deadlines (rather than a residual-timeout counter threaded through
    /// each retry) keep this correct no matter how many times the wait is
    /// interrupted.
    fn wait_readiness(&self, deadline: Instant) -> Result<Option<FdSet>> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let left = deadline - now;
            let mut tv = TimeVal::microseconds(left.as_micros() as i64);

            let (mut fds, highest) = self.build_fd_set();
            match select(highest + 1, Some(&mut fds), None, None, Some(&mut tv)) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(fds)),
                Err(nix::Error::Sys(nix::errno::Errno::EINTR)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs the loop of spec §4.3 until exactly one expectation is satisfied.
    /// Returns `Error::Timeout` if there's nothing to wait for, or if the
    /// head-of-deadline expires with no match.
    pub fn wait_for_any(&mut self) -> Result<ChannelId> {
        if !self.have_expectations() {
            return Err(Error::Timeout);
        }

        if let Some(id) = self.check_all()? {
            self.printer.flush();
            return Ok(id);
        }

        loop {
            let deadline = match self.next_deadline() {
                Some(d) => d,
                None => return Err(Error::Timeout),
            };

            match self.wait_readiness(deadline)? {
                None => {
                    if let Some((id, pattern, timeout)) = self.earliest_head() {
                        self.printer.timedout(id, &pattern, timeout);
                    }
                    return Err(Error::Timeout);
                }
                Some(ready) => {
                    let mut touched = Vec::new();
                    for (id, channel) in self.channels.iter_mut() {
                        let fd = channel_fd(channel);
                        if !ready.contains(fd) {
                            continue;
                        }
                        match channel.io_mut().get_byte() {
                            Ok(byte) => {
                                channel.push_byte(byte);
                                self.printer.out(*id, byte);
                                touched.push(*id);
                            }
                            Err(IoCondition::WouldBlock)
                            | Err(IoCondition::Interrupted)
                            | Err(IoCondition::Eof) => {}
                            Err(IoCondition::Fatal(e)) => return Err(Error::Io(e)),
                        }
                    }

                    if let Some(id) = self.check_some(&touched)? {
                        self.printer.flush();
                        return Ok(id);
                    }
                    self.printer.flush();
                }
            }
        }
    }

    /// Repeats [Driver::wait_for_any] until it returns `id`, or no
    /// expectations remain anywhere.
    pub fn wait_for_one(&mut self, id: ChannelId) -> Result<()> {
        while self.have_expectations() {
            if self.wait_for_any()? == id {
                return Ok(());
            }
        }
        Err(Error::Timeout)
    }

    /// Repeats [Driver::wait_for_any] until no channel has any pending
    /// expectation left.
    pub fn wait_for_all(&mut self) -> Result<()> {
        while self.have_expectations() {
            self.wait_for_any()?;
        }
        Ok(())
    }
}

fn channel_fd(channel: &Channel) -> RawFd {
    channel.io().select_fd()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expect::ExpectMode;
    use crate::io::IoCondition;
    use crate::printer::InterleavedPrinter;

    struct NullIo;

    impl crate::io::IoHandle for NullIo {
        fn select_fd(&self) -> RawFd {
            -1
        }
        fn get_byte(&mut self) -> std::result::Result<u8, IoCondition> {
            Err(IoCondition::Eof)
        }
        fn put_bytes(&mut self, buf: &[u8]) -> std::result::Result<usize, IoCondition> {
            Ok(buf.len())
        }
        fn reopen(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn new_driver() -> Driver {
        Driver::new(Box::new(InterleavedPrinter::new(Vec::new(), false)))
    }

    #[test]
    fn next_deadline_is_the_minimum_head_across_channels() {
        let mut driver = new_driver();
        let slow = driver.add_channel(Channel::new("slow", Box::new(NullIo)));
        let fast = driver.add_channel(Channel::new("fast", Box::new(NullIo)));

        driver
            .add_expect(slow, "x", Duration::from_secs(10), ExpectMode::Serial)
            .unwrap();
        driver
            .add_expect(fast, "y", Duration::from_millis(1), ExpectMode::Serial)
            .unwrap();

        let deadline = driver.next_deadline().unwrap();
        assert!(deadline <= driver.channel(fast).unwrap().groups()[0][0].deadline());
        assert!(deadline < driver.channel(slow).unwrap().groups()[0][0].deadline());
    }

    #[test]
    fn next_deadline_ignores_non_head_expectations() {
        let mut driver = new_driver();
        let id = driver.add_channel(Channel::new("chain", Box::new(NullIo)));
        driver
            .add_expect(id, "first", Duration::from_secs(10), ExpectMode::Serial)
            .unwrap();
        // Second stage of the same chain has a tighter timeout, but it's
        // not the head, so it must not shorten the wait.
        driver
            .add_expect(id, "second", Duration::from_millis(1), ExpectMode::Serial)
            .unwrap();

        let deadline = driver.next_deadline().unwrap();
        assert_eq!(deadline, driver.channel(id).unwrap().groups()[0][0].deadline());
    }

    #[test]
    fn no_expectations_means_no_deadline() {
        let mut driver = new_driver();
        driver.add_channel(Channel::new("idle", Box::new(NullIo)));
        assert!(driver.next_deadline().is_none());
        assert!(!driver.have_expectations());
    }

    #[test]
    fn wait_for_one_errors_without_any_expectations() {
        let mut driver = new_driver();
        let id = driver.add_channel(Channel::new("idle", Box::new(NullIo)));
        assert!(matches!(driver.wait_for_one(id), Err(Error::Timeout)));
    }
}
