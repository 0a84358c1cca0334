//! Pending-request tracking.
//!
//! At most one command is in flight per session. [`PendingTracker`] holds
//! it: the command name used to recognize body lines and the reply body
//! accumulated so far. A request is unresolved for as long as the tracker
//! holds it. Resolving attaches the terminal status, hands the whole record
//! out as a [`Resolution`] and leaves the tracker idle, so each request
//! resolves exactly once.

use atlib_core::error::{Error, Result};
use atlib_core::types::{ConfirmationStatus, FailureInfo};

use crate::classify::starts_with_ignore_case;

/// Longest command name kept for body matching.
pub const MAX_COMMAND_NAME: usize = 32;

/// Characters stripped between the command name and the payload of the
/// first body line (`+CWLAP:(...)`, `+CREG: 1`).
const BODY_SEPARATORS: &[char] = &[':', ' ', '=', ','];

/// Derive the command name from outgoing command text.
///
/// Strips leading whitespace, a case-insensitive `AT`, and one family
/// separator (`+`, `%`), then keeps the run of alphanumerics and
/// underscores that follows. `AT+CWJAP="ssid","pw"` yields `CWJAP`; raw
/// payloads that are not AT commands yield an empty name, which never
/// matches a body line.
///
/// ```
/// use atlib_session::pending::command_name;
///
/// assert_eq!(command_name("AT+TEST=1\r\n", &['+']), "TEST");
/// assert_eq!(command_name("at%adv?", &['+', '%']), "adv");
/// assert_eq!(command_name("hello", &['+']), "");
/// ```
pub fn command_name(command: &str, separators: &[char]) -> String {
    let text = command.trim_start();
    if !starts_with_ignore_case(text, "AT") {
        return String::new();
    }
    let text = &text[2..];
    let text = match text.chars().next() {
        Some(c) if separators.contains(&c) => &text[c.len_utf8()..],
        _ => text,
    };
    text.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(MAX_COMMAND_NAME)
        .collect()
}

/// The single in-flight command.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    seq: u64,
    name: String,
    body: String,
    body_lines: usize,
    truncated: bool,
}

impl PendingRequest {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// A resolved request, handed to whoever waits for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Sequence number assigned when the request began.
    pub seq: u64,
    /// Command name the request was tracked under.
    pub name: String,
    /// Terminal status.
    pub status: ConfirmationStatus,
    /// Accumulated reply body.
    pub body: String,
    /// Set when body text was dropped at the capacity limit.
    pub truncated: bool,
    /// Label and code from a failure line.
    pub failure: Option<FailureInfo>,
}

/// Owner of the pending request slot.
#[derive(Debug)]
pub struct PendingTracker {
    current: Option<PendingRequest>,
    next_seq: u64,
    capacity: usize,
}

impl PendingTracker {
    /// Create an idle tracker whose reply bodies hold up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        PendingTracker {
            current: None,
            next_seq: 1,
            capacity,
        }
    }

    /// Start tracking a new request.
    ///
    /// Fails with [`Error::Busy`] while another request is unresolved.
    pub fn begin(&mut self, command: &str, separators: &[char]) -> Result<u64> {
        if self.is_pending() {
            return Err(Error::Busy);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.current = Some(PendingRequest {
            seq,
            name: command_name(command, separators),
            body: String::new(),
            body_lines: 0,
            truncated: false,
        });
        Ok(seq)
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&PendingRequest> {
        self.current.as_ref()
    }

    /// Name of the pending command, if any and if non-empty.
    pub fn pending_name(&self) -> Option<&str> {
        self.current
            .as_ref()
            .map(|req| req.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Append a body line (text after the sentinel).
    ///
    /// On the first body line the command name and the separators after it
    /// are stripped; later lines are appended as they are, each on its own
    /// line. Text beyond the buffer capacity is dropped.
    pub fn append_body(&mut self, text: &str) {
        let capacity = self.capacity;
        let Some(req) = self.current.as_mut() else {
            return;
        };

        let content = if req.body_lines == 0 {
            let rest = if starts_with_ignore_case(text, &req.name) {
                &text[req.name.len()..]
            } else {
                text
            };
            rest.trim_start_matches(BODY_SEPARATORS)
        } else {
            text
        };
        req.body_lines += 1;

        if req.body_lines > 1 {
            push_bounded(&mut req.body, "\n", capacity, &mut req.truncated);
        }
        push_bounded(&mut req.body, content, capacity, &mut req.truncated);
    }

    /// Resolve the pending request.
    ///
    /// Returns `None` if nothing is pending or `status` is not terminal.
    pub fn resolve(
        &mut self,
        status: ConfirmationStatus,
        failure: Option<FailureInfo>,
    ) -> Option<Resolution> {
        if !status.is_terminal() || !self.is_pending() {
            return None;
        }
        let req = self.current.take()?;
        Some(Resolution {
            seq: req.seq,
            name: req.name,
            status,
            body: req.body,
            truncated: req.truncated,
            failure,
        })
    }

    /// Drop the pending request if it still carries `seq`.
    ///
    /// Returns `true` if something was dropped.
    pub fn cancel(&mut self, seq: u64) -> bool {
        match &self.current {
            Some(req) if req.seq == seq => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

fn push_bounded(body: &mut String, text: &str, capacity: usize, truncated: &mut bool) {
    let room = capacity.saturating_sub(body.len());
    if text.len() <= room {
        body.push_str(text);
        return;
    }
    let mut cut = room;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    body.push_str(&text[..cut]);
    if !*truncated {
        tracing::warn!(capacity, "reply body truncated at capacity");
        *truncated = true;
    }
}
