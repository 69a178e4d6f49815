//! The driver's sink for lifecycle and byte events. The core only ever talks
//! to the [Printer] trait; formatting and buffering live entirely in
//! implementations such as [InterleavedPrinter].

use std::io::Write;
use std::time::Duration;

use chrono::Local;

use crate::driver::ChannelId;

/// Methods the driver calls as channels are added/removed, bytes arrive, and
/// expectations match or time out.
pub trait Printer {
    fn add_channel(&mut self, id: ChannelId, name: &str);
    fn remove_channel(&mut self, id: ChannelId, name: &str);
    fn out(&mut self, id: ChannelId, byte: u8);
    fn matched(&mut self, id: ChannelId, text: &[u8]);
    fn timedout(&mut self, id: ChannelId, pattern: &str, timeout: Duration);
    /// Flushes any output buffered so far. Called after a match and after
    /// every wait iteration, per spec §4.5.
    fn flush(&mut self);
}

struct ChannelBuf {
    id: ChannelId,
    name: String,
    buffer: Vec<u8>,
}

/// Keeps one line buffer per channel, prefixes each completed line with a
/// bold timestamp and the channel name, highlights matches and timeouts with
/// ANSI colour, and only ever writes complete lines. Buffers are raw bytes,
/// not `String` - channel output isn't guaranteed to be valid UTF-8 and
/// shouldn't be mangled into it just to be printed.
pub struct InterleavedPrinter<W: Write> {
    bufs: Vec<ChannelBuf>,
    out: W,
    color: bool,
}

impl<W: Write> InterleavedPrinter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            bufs: Vec::new(),
            out,
            color,
        }
    }

    fn find(&mut self, id: ChannelId) -> Option<&mut ChannelBuf> {
        self.bufs.iter_mut().find(|b| b.id == id)
    }
}

impl<W: Write> Printer for InterleavedPrinter<W> {
    fn add_channel(&mut self, id: ChannelId, name: &str) {
        self.bufs.push(ChannelBuf {
            id,
            name: name.to_owned(),
            buffer: Vec::new(),
        });
    }

    fn remove_channel(&mut self, _id: ChannelId, _name: &str) {
        // Deliberately a no-op: removing a channel's column would shuffle
        // every other channel's output and make the transcript far more
        // confusing to read. See DESIGN.md for the open question this
        // resolves.
    }

    fn out(&mut self, id: ChannelId, byte: u8) {
        if let Some(buf) = self.find(id) {
            buf.buffer.push(byte);
        }
    }

    fn matched(&mut self, id: ChannelId, text: &[u8]) {
        let color = self.color;
        if let Some(buf) = self.find(id) {
            if let Some(pos) = find_subslice(&buf.buffer, text) {
                let hilighted: Vec<u8> = if color {
                    let mut v = b"\x1b[34m".to_vec();
                    v.extend_from_slice(text);
                    v.extend_from_slice(b"\x1b[0m");
                    v
                } else {
                    text.to_vec()
                };
                buf.buffer.splice(pos..pos + text.len(), hilighted);
            }
        }
    }

    fn timedout(&mut self, id: ChannelId, pattern: &str, timeout: Duration) {
        let msg = format!(
            "Timed out after {}s waiting for '{}'",
            timeout.as_secs(),
            pattern
        );
        let color = self.color;
        if let Some(buf) = self.find(id) {
            if color {
                buf.buffer.extend_from_slice(b"\x1b[31m");
                buf.buffer.extend_from_slice(msg.as_bytes());
                buf.buffer.extend_from_slice(b"\x1b[0m");
            } else {
                buf.buffer.extend_from_slice(msg.as_bytes());
            }
            buf.buffer.push(b'\n');
        }
    }

    fn flush(&mut self) {
        for buf in &mut self.bufs {
            while let Some(pos) = buf.buffer.iter().position(|&b| b == b'\n') {
                let stamp = Local::now().format("%T");
                if self.color {
                    let _ = write!(self.out, "\x1b[1m[{}]\x1b[0m {}> ", stamp, buf.name);
                } else {
                    let _ = write!(self.out, "[{}] {}> ", stamp, buf.name);
                }
                let _ = self.out.write_all(&buf.buffer[..=pos]);
                buf.buffer.drain(..=pos);
            }
        }
        let _ = self.out.flush();
    }
}

/// Finds the last occurrence of `needle` in `haystack` - a match is
/// highlighted where it was produced, which is always the most recently
/// appended occurrence of that text.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}
