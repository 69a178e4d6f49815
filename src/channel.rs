//! A channel: one IO handle plus its receive buffer and pending expectations.

use std::collections::VecDeque;

use crate::error::Result;
use crate::expect::{ExpectMode, Expectation, Group};
use crate::io::IoHandle;

/// One endpoint under the driver's supervision: an IO handle, a name for
/// display, an append-only/left-truncated receive buffer, and the ordered
/// groups of expectations that define its alternative/serial chains.
pub struct Channel {
    name: String,
    io: Box<dyn IoHandle>,
    buffer: Vec<u8>,
    groups: VecDeque<Group>,
    last_match: Vec<u8>,
}

impl Channel {
    pub fn new(name: impl Into<String>, io: Box<dyn IoHandle>) -> Self {
        Self {
            name: name.into(),
            io,
            buffer: Vec::new(),
            groups: VecDeque::new(),
            last_match: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_match(&self) -> &[u8] {
        &self.last_match
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn io(&self) -> &dyn IoHandle {
        self.io.as_ref()
    }

    pub(crate) fn io_mut(&mut self) -> &mut dyn IoHandle {
        self.io.as_mut()
    }

    pub(crate) fn groups(&self) -> &VecDeque<Group> {
        &self.groups
    }

    pub fn has_expectations(&self) -> bool {
        self.groups.iter().any(|g| !g.is_empty())
    }

    pub fn write(&mut self, bytes: &[u8]) -> std::result::Result<usize, crate::io::IoCondition> {
        self.io.put_bytes(bytes)
    }

    pub(crate) fn push_byte(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    /// Adds a new expectation. `Parallel` (or an empty channel) starts a new
    /// group; `Serial` appends to the most recently started group.
    pub fn add_expect(
        &mut self,
        pattern: impl Into<String>,
        timeout: std::time::Duration,
        mode: ExpectMode,
    ) {
        let exp = Expectation::new(pattern, timeout);
        if mode == ExpectMode::Parallel || self.groups.is_empty() {
            self.groups.push_back(vec![exp]);
        } else {
            self.groups.back_mut().unwrap().push(exp);
        }
    }

    /// Drops every pending expectation. Idempotent.
    pub fn clear_expects(&mut self) {
        self.groups.clear();
    }

    /// Scans groups in insertion order, expectations within a group in
    /// insertion order, for the first pattern that matches anywhere in the
    /// current buffer. On success: records `last_match`, left-truncates the
    /// buffer through the end of the match, drops the matched expectation,
    /// and - if that leaves its group empty - clears every expectation on the
    /// channel (a completed chain abandons any alternatives). A regex
    /// compile failure aborts the scan immediately and propagates.
    pub(crate) fn expectation_met(&mut self) -> Result<bool> {
        let mut hit = None;
        'groups: for (gi, group) in self.groups.iter_mut().enumerate() {
            for (ei, exp) in group.iter_mut().enumerate() {
                if let Some((start, end)) = exp.try_match(&self.buffer)? {
                    hit = Some((gi, ei, start, end));
                    break 'groups;
                }
            }
        }

        let (gi, ei, start, end) = match hit {
            Some(h) => h,
            None => return Ok(false),
        };

        self.last_match = self.buffer[start..end].to_vec();
        self.buffer.drain(..end);
        self.groups[gi].remove(ei);

        if self.groups.iter().any(|g| g.is_empty()) {
            self.clear_expects();
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::IoCondition;
    use std::os::unix::io::RawFd;

    struct NullIo;

    impl IoHandle for NullIo {
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

    fn push(channel: &mut Channel, bytes: &[u8]) {
        for &b in bytes {
            channel.push_byte(b);
        }
    }

    #[test]
    fn serial_extends_most_recent_group_parallel_starts_new_one() {
        let mut channel = Channel::new("c", Box::new(NullIo));
        channel.add_expect("a", std::time::Duration::from_secs(1), ExpectMode::Parallel);
        channel.add_expect("b", std::time::Duration::from_secs(1), ExpectMode::Serial);
        channel.add_expect("c", std::time::Duration::from_secs(1), ExpectMode::Parallel);

        assert_eq!(channel.groups().len(), 2);
        assert_eq!(channel.groups()[0].len(), 2);
        assert_eq!(channel.groups()[1].len(), 1);
    }

    #[test]
    fn completing_a_group_clears_every_other_group() {
        let mut channel = Channel::new("c", Box::new(NullIo));
        channel.add_expect("foo", std::time::Duration::from_secs(1), ExpectMode::Parallel);
        channel.add_expect("bar", std::time::Duration::from_secs(1), ExpectMode::Parallel);
        push(&mut channel, b"foo");

        assert!(channel.expectation_met().unwrap());
        assert!(!channel.has_expectations());
        assert_eq!(channel.last_match(), b"foo");
    }

    #[test]
    fn serial_chain_must_complete_stage_by_stage() {
        let mut channel = Channel::new("c", Box::new(NullIo));
        channel.add_expect("foo", std::time::Duration::from_secs(1), ExpectMode::Serial);
        channel.add_expect("bar", std::time::Duration::from_secs(1), ExpectMode::Serial);
        push(&mut channel, b"foo");

        assert!(channel.expectation_met().unwrap());
        assert!(channel.has_expectations());
        assert_eq!(channel.groups()[0].len(), 1);

        push(&mut channel, b"bar");
        assert!(channel.expectation_met().unwrap());
        assert!(!channel.has_expectations());
    }

    #[test]
    fn no_match_leaves_buffer_and_expectations_untouched() {
        let mut channel = Channel::new("c", Box::new(NullIo));
        channel.add_expect("zzz", std::time::Duration::from_secs(1), ExpectMode::Serial);
        push(&mut channel, b"hello");

        assert!(!channel.expectation_met().unwrap());
        assert!(channel.has_expectations());
        assert_eq!(channel.buffer(), b"hello");
    }
}
