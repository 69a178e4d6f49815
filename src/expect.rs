//! Expectations and the grouping that implements serial/parallel chains.

use regex::Regex;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// How a freshly added expectation relates to the channel's existing ones.
///
/// See the summary table in the module-level docs of [crate::channel]: `Parallel`
/// always starts a new chain, `Serial` extends the most recently started one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectMode {
    Serial,
    Parallel,
}

/// A single regex/timeout pair awaiting satisfaction.
///
/// `deadline` is fixed at construction (`Instant::now() + timeout`) and never
/// adjusted afterwards; elapsed time is always measured against the clock; we
/// never maintain a decrementing "time left" counter, which is what made the
/// pre-port variant of this driver sensitive to drift across interrupted waits.
#[derive(Debug)]
pub struct Expectation {
    pattern: String,
    timeout: Duration,
    deadline: Instant,
    compiled: Option<Regex>,
}

impl Expectation {
    pub(crate) fn new(pattern: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            timeout,
            deadline: Instant::now() + timeout,
            compiled: None,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Lazily compiles and caches the pattern, then searches `buffer` for the
    /// leftmost non-empty match. Compilation failure is a hard `BadRegex` error,
    /// not a "no match".
    pub(crate) fn try_match<'a>(&mut self, buffer: &'a [u8]) -> Result<Option<(usize, usize)>> {
        if self.compiled.is_none() {
            let text = std::str::from_utf8(self.pattern.as_bytes())
                .map_err(|_| Error::BadRegex(self.pattern.clone()))?;
            let re = regex::RegexBuilder::new(text)
                .multi_line(true)
                .build()
                .map_err(|_| Error::BadRegex(self.pattern.clone()))?;
            self.compiled = Some(re);
        }

        // Regex operates on &str; expectation patterns are assumed textual, but
        // the buffer itself may contain non-UTF-8 bytes (raw files, serial
        // lines). We search the largest valid UTF-8 prefix, which is sufficient
        // for the common case and never panics on arbitrary bytes.
        let text = match std::str::from_utf8(buffer) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&buffer[..e.valid_up_to()]).unwrap(),
        };

        let re = self.compiled.as_ref().unwrap();
        // PCRE_NOTEMPTY: reject a zero-length match and keep scanning forward.
        let found = re.find_iter(text).find(|m| !m.is_empty());
        Ok(found.map(|m| (m.start(), m.end())))
    }
}

/// An ordered, non-empty sequence of expectations: a serial chain.
pub type Group = Vec<Expectation>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_leftmost_occurrence() {
        let mut exp = Expectation::new("wor(l)d", Duration::from_secs(1));
        let (start, end) = exp.try_match(b"hello world, hello world").unwrap().unwrap();
        assert_eq!(&b"hello world, hello world"[start..end], b"world");
        assert_eq!(start, 6);
    }

    #[test]
    fn rejects_empty_matches_and_keeps_scanning() {
        let mut exp = Expectation::new("a*", Duration::from_secs(1));
        // "a*" matches empty at position 0; PCRE_NOTEMPTY means the real
        // answer is the "aa" further along, not a zero-length hit at 0.
        let (start, end) = exp.try_match(b"xxaa").unwrap().unwrap();
        assert_eq!(start, 2);
        assert_eq!(end, 4);
    }

    #[test]
    fn no_match_returns_none() {
        let mut exp = Expectation::new("zzz", Duration::from_secs(1));
        assert!(exp.try_match(b"hello world").unwrap().is_none());
    }

    #[test]
    fn bad_regex_is_an_error() {
        let mut exp = Expectation::new("(unterminated", Duration::from_secs(1));
        assert!(matches!(exp.try_match(b"anything"), Err(Error::BadRegex(_))));
    }

    #[test]
    fn multiline_anchors_match_per_line() {
        let mut exp = Expectation::new("^world$", Duration::from_secs(1));
        let (start, _) = exp.try_match(b"hello\nworld\ngoodbye").unwrap().unwrap();
        assert_eq!(start, 6);
    }
}
