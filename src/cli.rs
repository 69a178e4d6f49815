//! The line-oriented shell described in spec §6: tokeniser plus command
//! dispatch on top of [Driver]. Kept separate from `src/bin/parexsh.rs` so it
//! can be unit-tested without going through stdin/stdout.

use std::time::Duration;

use crate::channel::Channel;
use crate::driver::{ChannelId, Driver};
use crate::error::{Error, Result};
use crate::expect::ExpectMode;
use crate::io::{BaudRate, DataBits, FileIo, Parity, ProcessIo, SerialIo, StopBits};
use crate::printer::Printer;

/// Splits a line into arguments, honouring double-quote grouping and the
/// backslash escapes `\n \r \t \b \a \f \v` (anything else after a backslash
/// is taken literally, e.g. `\"` or `\\`). An unmatched quote or a trailing
/// backslash is a [Error::BadArgs].
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut have_token = false;
    let mut in_quote = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                have_token = true;
                match chars.next() {
                    None => return Err(Error::BadArgs("trailing backslash".into())),
                    Some('n') => current.push('\n'),
                    Some('r') => current.push('\r'),
                    Some('t') => current.push('\t'),
                    Some('b') => current.push('\u{8}'),
                    Some('a') => current.push('\u{7}'),
                    Some('f') => current.push('\u{c}'),
                    Some('v') => current.push('\u{b}'),
                    Some(other) => current.push(other),
                }
            }
            '"' if !in_quote => {
                in_quote = true;
                have_token = true;
            }
            '"' if in_quote => in_quote = false,
            c if c.is_whitespace() && !in_quote => {
                if have_token {
                    tokens.push(std::mem::take(&mut current));
                    have_token = false;
                }
            }
            c => {
                have_token = true;
                current.push(c);
            }
        }
    }

    if in_quote {
        return Err(Error::BadArgs("unmatched quote".into()));
    }
    if have_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parses the three-character `<dpS>` token (e.g. `8N1`) used by `open
/// serial`: one data-bits digit, one parity letter, one stop-bits digit.
fn parse_serial_format(spec: &str) -> Result<(DataBits, Parity, StopBits)> {
    let chars: Vec<char> = spec.chars().collect();
    if chars.len() != 3 {
        return Err(Error::BadArgs(format!("bad serial format '{}'", spec)));
    }
    let data_bits = match chars[0] {
        '7' => DataBits::Seven,
        '8' => DataBits::Eight,
        _ => return Err(Error::BadArgs(format!("bad data bits in '{}'", spec))),
    };
    let parity = match chars[1] {
        'N' => Parity::None,
        'O' => Parity::Odd,
        'E' => Parity::Even,
        _ => return Err(Error::BadArgs(format!("bad parity in '{}'", spec))),
    };
    let stop_bits = match chars[2] {
        '1' => StopBits::One,
        '2' => StopBits::Two,
        _ => return Err(Error::BadArgs(format!("bad stop bits in '{}'", spec))),
    };
    Ok((data_bits, parity, stop_bits))
}

/// What a successful command should print on the line before its `ok`
/// status, if anything (a new channel's index, or `wait <idx>`'s last match).
pub enum Output {
    None,
    Line(String),
}

/// Holds the driver plus the CLI's own compact 0-based channel addressing,
/// which is deliberately kept out of the driver (it only ever deals in
/// opaque [ChannelId]s).
pub struct Shell {
    driver: Driver,
    ids: Vec<ChannelId>,
}

impl Shell {
    pub fn new(printer: Box<dyn Printer>) -> Self {
        Self {
            driver: Driver::new(printer),
            ids: Vec::new(),
        }
    }

    fn resolve(&self, idx_str: &str) -> Result<ChannelId> {
        let idx: usize = idx_str
            .parse()
            .map_err(|_| Error::BadArgs(format!("not a channel index: '{}'", idx_str)))?;
        self.ids.get(idx).copied().ok_or(Error::NoSuchChannel(idx))
    }

    /// Tokenises and executes one command line. `Ok(Output::None)` or
    /// `Ok(Output::Line(_))` both mean "print `ok`" (after any extra line);
    /// `exit` is handled by the caller before reaching here.
    pub fn execute(&mut self, line: &str) -> Result<Output> {
        let argv = tokenize(line)?;
        let cmd = argv.first().map(String::as_str).unwrap_or("");

        match cmd {
            "open" => self.cmd_open(&argv),
            "serexp" => self.cmd_expect(&argv, ExpectMode::Serial),
            "parexp" => self.cmd_expect(&argv, ExpectMode::Parallel),
            "clearexp" => self.cmd_clearexp(&argv),
            "wait" => self.cmd_wait(&argv),
            "write" => self.cmd_write(&argv),
            _ => Err(Error::UnknownCommand),
        }
    }

    fn cmd_open(&mut self, argv: &[String]) -> Result<Output> {
        if argv.len() < 2 {
            return Err(Error::BadArgs("open requires a kind".into()));
        }
        let channel = match argv[1].as_str() {
            "file" if argv.len() == 4 => {
                let io = FileIo::open(&argv[3])?;
                Channel::new(&argv[2], Box::new(io))
            }
            "serial" if argv.len() == 6 => {
                let bps: u32 = argv[4]
                    .parse()
                    .map_err(|_| Error::BadArgs(format!("bad baud rate '{}'", argv[4])))?;
                let (data_bits, parity, stop_bits) = parse_serial_format(&argv[5])?;
                let baud = BaudRate::from_bps(bps)?;
                let io = SerialIo::open(&argv[3], baud, data_bits, parity, stop_bits)?;
                Channel::new(&argv[2], Box::new(io))
            }
            "process" if argv.len() >= 4 => {
                let argv_cmd: Vec<String> = argv[3..].to_vec();
                let io = ProcessIo::spawn(argv_cmd)?;
                Channel::new(&argv[2], Box::new(io))
            }
            _ => return Err(Error::BadArgs("bad open arguments".into())),
        };

        let id = self.driver.add_channel(channel);
        self.ids.push(id);
        Ok(Output::Line((self.ids.len() - 1).to_string()))
    }

    fn cmd_expect(&mut self, argv: &[String], mode: ExpectMode) -> Result<Output> {
        if argv.len() != 4 {
            return Err(Error::BadArgs("expect requires idx, pattern, seconds".into()));
        }
        let id = self.resolve(&argv[1])?;
        let seconds: u64 = argv[3]
            .parse()
            .map_err(|_| Error::BadArgs(format!("bad timeout '{}'", argv[3])))?;
        self.driver
            .add_expect(id, argv[2].clone(), Duration::from_secs(seconds), mode)?;
        Ok(Output::None)
    }

    fn cmd_clearexp(&mut self, argv: &[String]) -> Result<Output> {
        if argv.len() != 2 {
            return Err(Error::BadArgs("clearexp requires idx".into()));
        }
        let id = self.resolve(&argv[1])?;
        self.driver.clear_expects(id)?;
        Ok(Output::None)
    }

    fn cmd_wait(&mut self, argv: &[String]) -> Result<Output> {
        if argv.len() != 2 {
            return Err(Error::BadArgs("wait requires all|any|idx".into()));
        }
        match argv[1].as_str() {
            "all" => {
                self.driver.wait_for_all()?;
                Ok(Output::None)
            }
            "any" => {
                self.driver.wait_for_any()?;
                Ok(Output::None)
            }
            idx_str => {
                let id = self.resolve(idx_str)?;
                self.driver.wait_for_one(id)?;
                let text = self
                    .driver
                    .channel(id)
                    .map(|c| String::from_utf8_lossy(c.last_match()).into_owned())
                    .unwrap_or_default();
                Ok(Output::Line(text))
            }
        }
    }

    fn cmd_write(&mut self, argv: &[String]) -> Result<Output> {
        if argv.len() != 3 {
            return Err(Error::BadArgs("write requires idx and text".into()));
        }
        let id = self.resolve(&argv[1])?;
        self.driver.write(id, argv[2].as_bytes())?;
        Ok(Output::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_plain() {
        assert_eq!(
            tokenize("write 0 hello").unwrap(),
            vec!["write", "0", "hello"]
        );
    }

    #[test]
    fn tokenize_quoted_spaces() {
        assert_eq!(
            tokenize(r#"write 0 "hello world""#).unwrap(),
            vec!["write", "0", "hello world"]
        );
    }

    #[test]
    fn tokenize_escapes() {
        let toks = tokenize(r#"serexp 0 "a\tb" 5"#).unwrap();
        assert_eq!(toks[2], "a\tb");
    }

    #[test]
    fn tokenize_unmatched_quote_errors() {
        assert!(tokenize(r#"write 0 "unterminated"#).is_err());
    }

    #[test]
    fn tokenize_trailing_backslash_errors() {
        assert!(tokenize(r#"write 0 foo\"#).is_err());
    }

    #[test]
    fn parse_serial_format_valid() {
        let (d, p, s) = parse_serial_format("8N1").unwrap();
        assert_eq!(d, DataBits::Eight);
        assert_eq!(p, Parity::None);
        assert_eq!(s, StopBits::One);
    }

    #[test]
    fn parse_serial_format_rejects_bad_parity() {
        assert!(parse_serial_format("8X1").is_err());
    }
}
