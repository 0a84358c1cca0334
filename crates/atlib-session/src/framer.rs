//! Line framer: raw bytes in, terminator-delimited lines out.
//!
//! Bytes arrive in arbitrary chunks from the transport. [`LineFramer`]
//! accumulates them until it sees the configured terminator, then hands out
//! the line with the terminator stripped. Lines longer than the configured
//! limit are dropped whole: the framer reports one
//! [`Error::FramingOverflow`] and discards everything up to the next
//! terminator before it starts a fresh line.

use bytes::{Bytes, BytesMut};

use atlib_core::config::FramingConfig;
use atlib_core::error::{Error, Result};
use atlib_core::types::Terminators;

/// Incremental line splitter.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    terminators: Terminators,
    max_line_len: usize,
    prompt_byte: Option<u8>,
    /// Pair mode: the first terminator byte was seen and is held back until
    /// the next byte shows whether it ends the line.
    held_first: bool,
    /// Overflow recovery: drop bytes until the next terminator.
    discarding: bool,
}

impl LineFramer {
    /// Create a framer from the framing configuration.
    pub fn new(config: &FramingConfig) -> Self {
        LineFramer {
            buf: BytesMut::with_capacity(config.max_line_len),
            terminators: config.terminators,
            max_line_len: config.max_line_len,
            prompt_byte: config.prompt_byte,
            held_first: false,
            discarding: false,
        }
    }

    /// Switch terminators. Any partially received line is dropped.
    pub fn set_terminators(&mut self, terminators: Terminators) {
        self.terminators = terminators;
        self.reset();
    }

    /// The terminators currently in effect.
    pub fn terminators(&self) -> Terminators {
        self.terminators
    }

    /// Drop any partial line and leave overflow recovery.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.held_first = false;
        self.discarding = false;
    }

    /// Feed a chunk of bytes, collecting every completed line or overflow.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Result<Bytes>> {
        data.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    /// Feed a single byte.
    ///
    /// Returns `Some(Ok(line))` when the byte completes a line and
    /// `Some(Err(Error::FramingOverflow))` the moment a line grows past the
    /// limit. Everything else returns `None`.
    pub fn push(&mut self, byte: u8) -> Option<Result<Bytes>> {
        match self.terminators {
            Terminators::Single(end) => {
                if byte == end {
                    return self.finish_line();
                }
                self.accept(byte)
            }
            Terminators::Pair(first, second) => {
                if self.held_first {
                    self.held_first = false;
                    if byte == second {
                        return self.finish_line();
                    }
                    // The held byte was data after all.
                    if let Some(overflow) = self.store(first) {
                        return Some(overflow);
                    }
                }
                if byte == first {
                    self.held_first = true;
                    return None;
                }
                self.accept(byte)
            }
        }
    }

    /// Handle a non-terminator byte, including the prompt escape.
    fn accept(&mut self, byte: u8) -> Option<Result<Bytes>> {
        if !self.discarding && self.buf.is_empty() && self.prompt_byte == Some(byte) {
            self.buf.extend_from_slice(&[byte]);
            return Some(Ok(self.buf.split().freeze()));
        }
        self.store(byte)
    }

    fn store(&mut self, byte: u8) -> Option<Result<Bytes>> {
        if self.discarding {
            return None;
        }
        if self.buf.len() >= self.max_line_len {
            tracing::warn!(
                limit = self.max_line_len,
                "line too long, discarding until next terminator"
            );
            self.buf.clear();
            self.discarding = true;
            return Some(Err(Error::FramingOverflow {
                limit: self.max_line_len,
            }));
        }
        self.buf.extend_from_slice(&[byte]);
        None
    }

    fn finish_line(&mut self) -> Option<Result<Bytes>> {
        if self.discarding {
            self.discarding = false;
            self.buf.clear();
            return None;
        }
        Some(Ok(self.buf.split().freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer(terminators: Terminators) -> LineFramer {
        LineFramer::new(&FramingConfig {
            terminators,
            max_line_len: 16,
            prompt_byte: None,
        })
    }

    fn lines(results: Vec<Result<Bytes>>) -> Vec<Vec<u8>> {
        results
            .into_iter()
            .map(|r| r.expect("unexpected framing error").to_vec())
            .collect()
    }

    #[test]
    fn single_terminator_sequence_yields_one_line() {
        let mut f = framer(Terminators::CRLF);
        let out = lines(f.feed(b"AT+GMR\r\n"));
        assert_eq!(out, vec![b"AT+GMR".to_vec()]);
        assert_eq!(lines(f.feed(b"OK\r\n")), vec![b"OK".to_vec()]);
    }

    #[test]
    fn bytes_without_terminator_stay_buffered() {
        let mut f = framer(Terminators::CRLF);
        assert!(f.feed(b"OK").is_empty());
        assert_eq!(lines(f.feed(b"\r\n")), vec![b"OK".to_vec()]);
    }

    #[test]
    fn line_split_across_chunks() {
        let mut f = framer(Terminators::CRLF);
        assert!(f.feed(b"+CRE").is_empty());
        assert!(f.feed(b"G: 1\r").is_empty());
        let out = lines(f.feed(b"\nOK\r\n"));
        assert_eq!(out, vec![b"+CREG: 1".to_vec(), b"OK".to_vec()]);
    }

    #[test]
    fn byte_at_a_time_matches_chunked() {
        let input = b"first\r\nsecond\r\n";
        let mut a = framer(Terminators::CRLF);
        let mut b = framer(Terminators::CRLF);
        let chunked = lines(a.feed(input));
        let single: Vec<Vec<u8>> = input
            .iter()
            .filter_map(|&byte| b.push(byte))
            .map(|r| r.unwrap().to_vec())
            .collect();
        assert_eq!(chunked, single);
    }

    #[test]
    fn lone_first_terminator_is_data_in_pair_mode() {
        let mut f = framer(Terminators::CRLF);
        let out = lines(f.feed(b"A\rB\r\n"));
        assert_eq!(out, vec![b"A\rB".to_vec()]);
    }

    #[test]
    fn repeated_first_terminator_then_second() {
        let mut f = framer(Terminators::CRLF);
        let out = lines(f.feed(b"OK\r\r\n"));
        assert_eq!(out, vec![b"OK\r".to_vec()]);
    }

    #[test]
    fn single_mode_ends_on_first_byte() {
        let mut f = framer(Terminators::CR);
        let out = lines(f.feed(b"%CONNECT\rOK\r"));
        assert_eq!(out, vec![b"%CONNECT".to_vec(), b"OK".to_vec()]);
    }

    #[test]
    fn single_mode_treats_lf_as_data() {
        let mut f = framer(Terminators::CR);
        let out = lines(f.feed(b"A\r\nB\r"));
        assert_eq!(out, vec![b"A".to_vec(), b"\nB".to_vec()]);
    }

    #[test]
    fn empty_lines_are_emitted() {
        let mut f = framer(Terminators::CRLF);
        let out = lines(f.feed(b"\r\nOK\r\n"));
        assert_eq!(out, vec![Vec::new(), b"OK".to_vec()]);
    }

    #[test]
    fn overflow_reports_once_and_resyncs() {
        let mut f = framer(Terminators::CRLF);
        let out = f.feed(b"0123456789ABCDEFGHIJKLMNOP\r\nOK\r\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(Error::FramingOverflow { limit: 16 })));
        assert_eq!(out[1].as_ref().unwrap().as_ref(), b"OK");
    }

    #[test]
    fn line_exactly_at_limit_is_kept() {
        let mut f = framer(Terminators::CRLF);
        let out = lines(f.feed(b"0123456789ABCDEF\r\n"));
        assert_eq!(out, vec![b"0123456789ABCDEF".to_vec()]);
    }

    #[test]
    fn prompt_byte_ends_line_immediately() {
        let mut f = LineFramer::new(&FramingConfig {
            terminators: Terminators::CRLF,
            max_line_len: 16,
            prompt_byte: Some(b'>'),
        });
        let out = lines(f.feed(b"OK\r\n>"));
        assert_eq!(out, vec![b"OK".to_vec(), b">".to_vec()]);
    }

    #[test]
    fn prompt_byte_inside_line_is_data() {
        let mut f = LineFramer::new(&FramingConfig {
            terminators: Terminators::CRLF,
            max_line_len: 16,
            prompt_byte: Some(b'>'),
        });
        let out = lines(f.feed(b"a>b\r\n"));
        assert_eq!(out, vec![b"a>b".to_vec()]);
    }

    #[test]
    fn set_terminators_drops_partial_line() {
        let mut f = framer(Terminators::CRLF);
        f.feed(b"partial");
        f.set_terminators(Terminators::CR);
        let out = lines(f.feed(b"OK\r"));
        assert_eq!(out, vec![b"OK".to_vec()]);
        assert_eq!(f.terminators(), Terminators::CR);
    }
}
