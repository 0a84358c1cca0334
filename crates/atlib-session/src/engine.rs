//! Sans-IO session core.
//!
//! [`SessionCore`] is the whole receive path without a runtime: bytes go in
//! through [`SessionCore::feed`], resolved requests and notifications come
//! out as [`CoreOutput`] values. The IO task wraps it around a transport;
//! tests and callers with their own byte pump can drive it directly.
//!
//! Per line, in order:
//!
//! - a body-continuation capture in progress swallows the line verbatim;
//! - blank lines are skipped;
//! - the classifier decides between confirmation, body, event and plain;
//! - confirmations resolve the pending request, body lines extend its reply;
//! - event lines and plain lines are resolved against the event table, and
//!   anything the table does not know is counted and dropped.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use atlib_core::config::EngineConfig;
use atlib_core::error::{Error, Result};
use atlib_core::events::Notification;
use atlib_core::types::Terminators;

use crate::classify::{Classification, Classifier};
use crate::framer::LineFramer;
use crate::matcher::{EventMatch, EventTable};
use crate::pending::{PendingTracker, Resolution};

/// Something the core produced while consuming bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreOutput<E> {
    /// An unsolicited event, ready for the application.
    Event(Notification<E>),
    /// The pending request reached a terminal status.
    Resolved(Resolution),
}

/// Counters kept by the receive path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Completed lines, blank ones included.
    pub lines: u64,
    /// Confirmations that resolved a request.
    pub confirmations: u64,
    /// Confirmations that arrived with nothing pending.
    pub stray_confirmations: u64,
    /// Reply body lines appended to a pending request.
    pub body_lines: u64,
    /// Notifications produced.
    pub events: u64,
    /// Sentinel lines the event table did not recognize.
    pub unknown_events: u64,
    /// Lines discarded by the framer for exceeding the length limit.
    pub overflows: u64,
    /// Plain lines (echo, banners, noise) that matched nothing.
    pub dropped_lines: u64,
    /// Notifications lost because the event queue was full.
    pub events_lost: u64,
}

/// A body-continuation event collecting its trailing lines.
#[derive(Debug)]
struct Capture<E> {
    event: E,
    args: String,
    remaining: usize,
}

/// The receive path of one session.
pub struct SessionCore<E> {
    framer: LineFramer,
    classifier: Classifier,
    table: Arc<EventTable<E>>,
    tracker: PendingTracker,
    separators: Vec<char>,
    continuation_delimiter: char,
    capture: Option<Capture<E>>,
    stats: SessionStats,
}

impl<E: Copy + fmt::Debug> SessionCore<E> {
    /// Build a core from a validated configuration and an event table.
    pub fn new(config: &EngineConfig, table: Arc<EventTable<E>>) -> Self {
        SessionCore {
            framer: LineFramer::new(&config.framing),
            classifier: Classifier::new(&config.vocabulary),
            table,
            tracker: PendingTracker::new(config.vocabulary.reply_capacity),
            separators: config.vocabulary.command_separators.clone(),
            continuation_delimiter: config.vocabulary.continuation_delimiter,
            capture: None,
            stats: SessionStats::default(),
        }
    }

    /// Start tracking `command` as the pending request.
    ///
    /// Returns the request's sequence number, or [`Error::Busy`] if another
    /// request is still unresolved.
    pub fn begin_request(&mut self, command: &str) -> Result<u64> {
        let seq = self.tracker.begin(command, &self.separators)?;
        debug!(seq, name = self.tracker.pending_name().unwrap_or(""), "request pending");
        Ok(seq)
    }

    /// Abandon request `seq` (timed out or never transmitted).
    pub fn cancel(&mut self, seq: u64) -> bool {
        let dropped = self.tracker.cancel(seq);
        if dropped {
            debug!(seq, "pending request abandoned");
        }
        dropped
    }

    pub fn is_pending(&self) -> bool {
        self.tracker.is_pending()
    }

    /// Switch line terminators. Refused while a request is pending.
    pub fn set_terminators(&mut self, terminators: Terminators) -> Result<()> {
        if self.is_pending() {
            return Err(Error::Busy);
        }
        self.framer.set_terminators(terminators);
        self.capture = None;
        Ok(())
    }

    pub fn terminators(&self) -> Terminators {
        self.framer.terminators()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Count a notification that could not be queued.
    pub fn note_event_lost(&mut self) {
        self.stats.events_lost += 1;
    }

    pub fn event_table(&self) -> &EventTable<E> {
        &self.table
    }

    /// Consume received bytes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<CoreOutput<E>> {
        trace!(len = data.len(), bytes = ?String::from_utf8_lossy(data), "rx");
        let mut out = Vec::new();
        for item in self.framer.feed(data) {
            match item {
                Ok(line) => self.handle_line(&line, &mut out),
                Err(Error::FramingOverflow { limit }) => {
                    self.stats.overflows += 1;
                    debug!(limit, "framing overflow");
                }
                Err(e) => debug!(error = %e, "framer error"),
            }
        }
        out
    }

    fn handle_line(&mut self, raw: &Bytes, out: &mut Vec<CoreOutput<E>>) {
        self.stats.lines += 1;
        let line = String::from_utf8_lossy(raw);

        if let Some(capture) = self.capture.as_mut() {
            capture.args.push(self.continuation_delimiter);
            capture.args.push_str(&line);
            capture.remaining -= 1;
            trace!(line = %line, remaining = capture.remaining, "continuation line");
            if capture.remaining == 0 {
                if let Some(done) = self.capture.take() {
                    self.emit(Notification::new(done.event, done.args), out);
                }
            }
            return;
        }

        if line.trim().is_empty() {
            return;
        }
        trace!(line = %line, "line");

        match self.classifier.classify(&line, self.tracker.pending_name()) {
            Classification::Confirmation { status, failure } => {
                match self.tracker.resolve(status, failure) {
                    Some(resolution) => {
                        self.stats.confirmations += 1;
                        debug!(seq = resolution.seq, %status, "request resolved");
                        out.push(CoreOutput::Resolved(resolution));
                    }
                    None => {
                        self.stats.stray_confirmations += 1;
                        debug!(%status, "confirmation with nothing pending");
                    }
                }
            }
            Classification::Body(text) => {
                self.stats.body_lines += 1;
                self.tracker.append_body(text);
            }
            Classification::Event(text) => match self.table.resolve(text) {
                Ok(m) => self.matched(m, out),
                Err(e) => {
                    self.stats.unknown_events += 1;
                    debug!(error = %e, "event dropped");
                }
            },
            Classification::Plain(text) => match self.table.resolve_bare(text) {
                Ok(m) => self.matched(m, out),
                Err(_) => {
                    self.stats.dropped_lines += 1;
                    debug!(line = text, "line dropped");
                }
            },
        }
    }

    fn matched(&mut self, m: EventMatch<'_, E>, out: &mut Vec<CoreOutput<E>>) {
        if m.trailing_lines > 0 {
            trace!(event = ?m.event, lines = m.trailing_lines, "capturing continuation");
            self.capture = Some(Capture {
                event: m.event,
                args: m.args.to_string(),
                remaining: m.trailing_lines,
            });
            return;
        }
        self.emit(Notification::new(m.event, m.args), out);
    }

    fn emit(&mut self, notification: Notification<E>, out: &mut Vec<CoreOutput<E>>) {
        self.stats.events += 1;
        debug!(event = ?notification.event, args = %notification.args, "event");
        out.push(CoreOutput::Event(notification));
    }
}

impl<E> fmt::Debug for SessionCore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCore")
            .field("framer", &self.framer)
            .field("tracker", &self.tracker)
            .field("capturing", &self.capture.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Log a notification the consumer side could not take.
pub(crate) fn warn_queue_full<E: fmt::Debug>(event: &E) {
    warn!(event = ?event, "event queue full, notification dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlib_core::config::Vocabulary;
    use atlib_core::types::{ConfirmationStatus, FailureInfo};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Ev {
        A,
        B,
        Sms,
        Ready,
        Other,
    }

    fn table() -> Arc<EventTable<Ev>> {
        Arc::new(
            EventTable::builder()
                .pattern("+A,1", Ev::A)
                .pattern("+A,2", Ev::B)
                .event_with_lines("CMT", Ev::Sms, 1)
                .bare("ready", Ev::Ready)
                .build()
                .unwrap(),
        )
    }

    fn core() -> SessionCore<Ev> {
        SessionCore::new(&EngineConfig::default(), table())
    }

    fn events(out: &[CoreOutput<Ev>]) -> Vec<(Ev, String)> {
        out.iter()
            .filter_map(|o| match o {
                CoreOutput::Event(n) => Some((n.event, n.args.clone())),
                CoreOutput::Resolved(_) => None,
            })
            .collect()
    }

    fn resolved(out: Vec<CoreOutput<Ev>>) -> Resolution {
        out.into_iter()
            .find_map(|o| match o {
                CoreOutput::Resolved(r) => Some(r),
                CoreOutput::Event(_) => None,
            })
            .expect("no resolution")
    }

    #[test]
    fn echo_body_and_ok_resolve_request() {
        let mut c = core();
        c.begin_request("AT+TEST=1\r\n").unwrap();
        let out = c.feed(b"AT+TEST=1\r\n+test:ok\r\nOK\r\n");
        let r = resolved(out);
        assert_eq!(r.status, ConfirmationStatus::Success);
        assert_eq!(r.body, "ok");
        assert!(!c.is_pending());
        assert_eq!(c.stats().dropped_lines, 1);
        assert_eq!(c.stats().body_lines, 1);
    }

    #[test]
    fn error_resolves_with_failure_detail() {
        let mut c = core();
        c.begin_request("AT+X").unwrap();
        let r = resolved(c.feed(b"ERROR:LABEL,42\r\n"));
        assert_eq!(r.status, ConfirmationStatus::Failure);
        assert_eq!(
            r.failure,
            Some(FailureInfo {
                label: "LABEL".into(),
                code: 42
            })
        );
    }

    #[test]
    fn events_dispatch_with_remainder() {
        let mut c = core();
        let out = c.feed(b"+A,1,x\r\n+A,2,y\r\n");
        assert_eq!(
            events(&out),
            vec![(Ev::A, "x".to_string()), (Ev::B, "y".to_string())]
        );
    }

    #[test]
    fn events_dispatch_while_request_pending() {
        let mut c = core();
        c.begin_request("AT+GMR").unwrap();
        let out = c.feed(b"+A,1,x\r\n");
        assert_eq!(events(&out), vec![(Ev::A, "x".to_string())]);
        assert!(c.is_pending());
    }

    #[test]
    fn unknown_line_while_idle_changes_nothing() {
        let mut c = core();
        let before = c.stats();
        let out = c.feed(b"garbage\r\n+Z:1\r\n");
        assert!(out.is_empty());
        assert!(!c.is_pending());
        let after = c.stats();
        assert_eq!(after.dropped_lines, before.dropped_lines + 1);
        assert_eq!(after.unknown_events, before.unknown_events + 1);
        assert_eq!(after.events, 0);
    }

    #[test]
    fn stray_confirmation_is_counted() {
        let mut c = core();
        assert!(c.feed(b"OK\r\n").is_empty());
        assert_eq!(c.stats().stray_confirmations, 1);
    }

    #[test]
    fn bare_event_resolves() {
        let mut c = core();
        let out = c.feed(b"ready\r\n");
        assert_eq!(events(&out), vec![(Ev::Ready, String::new())]);
    }

    #[test]
    fn continuation_captures_following_line_verbatim() {
        let mut c = core();
        c.begin_request("AT+CSQ").unwrap();
        let out = c.feed(b"+CMT: \"+1555\",,\"24/01/01\"\r\nOK, see you\r\n");
        assert_eq!(
            events(&out),
            vec![(Ev::Sms, "\"+1555\",,\"24/01/01\"\nOK, see you".to_string())]
        );
        // The captured "OK" did not resolve the request.
        assert!(c.is_pending());
    }

    #[test]
    fn continuation_counts_blank_lines() {
        let mut c = core();
        let out = c.feed(b"+CMT: x\r\n\r\n");
        assert_eq!(events(&out), vec![(Ev::Sms, "x\n".to_string())]);
    }

    #[test]
    fn continuation_split_across_feeds() {
        let mut c = core();
        assert!(c.feed(b"+CMT: x\r\n").is_empty());
        let out = c.feed(b"hello\r\n");
        assert_eq!(events(&out), vec![(Ev::Sms, "x\nhello".to_string())]);
    }

    #[test]
    fn overflow_is_counted_and_stream_recovers() {
        let mut config = EngineConfig::default();
        config.framing.max_line_len = 8;
        let mut c = SessionCore::new(&config, table());
        c.begin_request("AT").unwrap();
        let out = c.feed(b"0123456789abcdef\r\nOK\r\n");
        assert_eq!(c.stats().overflows, 1);
        assert_eq!(resolved(out).status, ConfirmationStatus::Success);
    }

    #[test]
    fn set_terminators_refused_while_pending() {
        let mut c = core();
        c.begin_request("AT").unwrap();
        assert!(matches!(c.set_terminators(Terminators::CR), Err(Error::Busy)));
        c.feed(b"OK\r\n");
        c.set_terminators(Terminators::CR).unwrap();
        assert_eq!(c.terminators(), Terminators::CR);
        let out = c.feed(b"+A,1,z\r");
        assert_eq!(events(&out), vec![(Ev::A, "z".to_string())]);
    }

    #[test]
    fn cancel_leaves_late_confirmation_stray() {
        let mut c = core();
        let seq = c.begin_request("AT").unwrap();
        assert!(c.cancel(seq));
        assert!(c.feed(b"OK\r\n").is_empty());
        assert_eq!(c.stats().stray_confirmations, 1);
    }

    #[test]
    fn family_sentinel_and_otherwise() {
        let config = EngineConfig {
            vocabulary: Vocabulary {
                sentinels: vec!['+', '%'],
                ..Vocabulary::default()
            },
            ..EngineConfig::default()
        };
        let table = EventTable::builder()
            .event("CONNECT", Ev::A)
            .otherwise(Ev::Other)
            .build()
            .unwrap();
        let mut c = SessionCore::new(&config, Arc::new(table));
        let out = c.feed(b"%CONNECT,1\r\n+WHATEVER:2\r\n");
        assert_eq!(
            events(&out),
            vec![
                (Ev::A, "1".to_string()),
                (Ev::Other, "WHATEVER:2".to_string())
            ]
        );
    }
}
