//! Engine configuration.
//!
//! An [`EngineConfig`] is plain data, grouped by the component that reads
//! it. Chip families construct one as a literal; applications usually tweak
//! it through `SessionBuilder` rather than by hand. After a session starts,
//! only the terminators and the timing can change, and only while no
//! request is in flight.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{ConfirmationStatus, Terminators};

/// Default maximum line length accepted by the framer.
pub const DEFAULT_MAX_LINE_LEN: usize = 256;

/// Default capacity of the reply body buffer.
pub const DEFAULT_REPLY_CAPACITY: usize = 1024;

/// Default depth of the bounded event queue.
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 32;

/// Line framing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramingConfig {
    /// Terminator byte(s) ending every received line.
    pub terminators: Terminators,
    /// Longest line, in bytes, before the framer drops it and resyncs.
    pub max_line_len: usize,
    /// Byte that, as the first byte of a line, ends that line on its own
    /// (e.g. the `>` data prompt).
    pub prompt_byte: Option<u8>,
}

impl Default for FramingConfig {
    fn default() -> Self {
        FramingConfig {
            terminators: Terminators::CRLF,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            prompt_byte: None,
        }
    }
}

/// The fixed words a family's firmware uses in its replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    /// Success token, matched as a case-insensitive prefix.
    pub success: String,
    /// Failure tokens, matched as case-insensitive prefixes. The text after
    /// the token carries an optional label and code.
    pub failures: Vec<String>,
    /// Additional confirmation tokens checked before `success` and
    /// `failures`, mapped to the status they resolve to.
    pub extra_confirmations: Vec<(String, ConfirmationStatus)>,
    /// Characters that mark the start of a reply body or event line.
    pub sentinels: Vec<char>,
    /// Characters that may separate `AT` from the command name (`+`, `%`).
    pub command_separators: Vec<char>,
    /// Capacity of the reply body buffer, in bytes.
    pub reply_capacity: usize,
    /// Delimiter substituted for the terminator of lines swallowed by a
    /// body-continuation event.
    pub continuation_delimiter: char,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary {
            success: "OK".into(),
            failures: vec!["ERROR".into()],
            extra_confirmations: Vec::new(),
            sentinels: vec!['+'],
            command_separators: vec!['+'],
            reply_capacity: DEFAULT_REPLY_CAPACITY,
            continuation_delimiter: '\n',
        }
    }
}

/// Command pacing and wait granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Minimum time between a confirmation and the next transmission.
    pub min_command_interval: Duration,
    /// Wait re-check interval; also the IO task's receive slice.
    pub poll_step: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            min_command_interval: Duration::from_millis(10),
            poll_step: Duration::from_millis(10),
        }
    }
}

/// Categories of command latency, each with its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutCategory {
    /// Queries answered from module RAM (`AT`, `AT+GMR`).
    Short,
    /// Ordinary configuration commands.
    Standard,
    /// Commands that wait on the radio (join, scan, connect).
    Long,
}

/// Timeouts per [`TimeoutCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub short: Duration,
    pub standard: Duration,
    pub long: Duration,
}

impl Timeouts {
    /// The timeout for the given category.
    pub fn get(&self, category: TimeoutCategory) -> Duration {
        match category {
            TimeoutCategory::Short => self.short,
            TimeoutCategory::Standard => self.standard,
            TimeoutCategory::Long => self.long,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            short: Duration::from_millis(300),
            standard: Duration::from_secs(1),
            long: Duration::from_secs(20),
        }
    }
}

/// Complete configuration of one session engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub framing: FramingConfig,
    pub vocabulary: Vocabulary,
    pub timing: Timing,
    pub timeouts: Timeouts,
    /// Depth of the bounded queue between the IO task and the event consumer.
    pub event_queue_depth: usize,
}

impl EngineConfig {
    /// Check that every value is usable by the engine.
    pub fn validate(&self) -> Result<()> {
        if self.framing.max_line_len == 0 {
            return Err(Error::InvalidParameter("max_line_len must be non-zero".into()));
        }
        if self.timing.poll_step.is_zero() {
            return Err(Error::InvalidParameter("poll_step must be non-zero".into()));
        }
        if self.vocabulary.success.is_empty() {
            return Err(Error::InvalidParameter("success token must not be empty".into()));
        }
        if self.vocabulary.failures.iter().any(|f| f.is_empty()) {
            return Err(Error::InvalidParameter("failure tokens must not be empty".into()));
        }
        if let Some((token, status)) = self
            .vocabulary
            .extra_confirmations
            .iter()
            .find(|(token, status)| token.is_empty() || !status.is_terminal())
        {
            return Err(Error::InvalidParameter(format!(
                "extra confirmation {token:?} must be non-empty and map to a terminal status, not {status}"
            )));
        }
        if self.vocabulary.sentinels.is_empty() {
            return Err(Error::InvalidParameter("at least one sentinel is required".into()));
        }
        if self.vocabulary.reply_capacity == 0 {
            return Err(Error::InvalidParameter("reply_capacity must be non-zero".into()));
        }
        if self.event_queue_depth == 0 {
            return Err(Error::InvalidParameter("event_queue_depth must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            framing: FramingConfig::default(),
            vocabulary: Vocabulary::default(),
            timing: Timing::default(),
            timeouts: Timeouts::default(),
            event_queue_depth: DEFAULT_EVENT_QUEUE_DEPTH,
        }
    }
}
