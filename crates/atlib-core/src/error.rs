//! Error types for atlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Framing, correlation, event-table and
//! transport failures are all captured here as explicit values; the engine
//! never panics on malformed input.

use crate::types::{ConfirmationStatus, FailureInfo};

/// The error type for all atlib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open, write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected reply, malformed frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A received line exceeded the framer's maximum length.
    ///
    /// The partial line is discarded and the framer resynchronizes on the
    /// next terminator. Never fatal.
    #[error("line exceeded {limit} bytes and was discarded")]
    FramingOverflow {
        /// The configured maximum line length.
        limit: usize,
    },

    /// A command was submitted while another is still awaiting confirmation.
    #[error("busy: a request is already awaiting confirmation")]
    Busy,

    /// No confirmation arrived within the allotted time.
    ///
    /// The engine never retries on its own; re-issuing the command is the
    /// caller's decision.
    #[error("timeout waiting for confirmation")]
    Timeout,

    /// A confirmation arrived, but not the one the caller expected.
    #[error(
        "confirmation mismatch: expected {expected}, got {actual}{}",
        describe_failure(.failure)
    )]
    Mismatch {
        /// The status the caller waited for.
        expected: ConfirmationStatus,
        /// The status the module actually reported.
        actual: ConfirmationStatus,
        /// Label and code parsed from a failure line, if any.
        failure: Option<FailureInfo>,
    },

    /// An unsolicited line matched no entry of the event table.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// `wait()` was called with no request in flight.
    #[error("no request is awaiting confirmation")]
    NotPending,

    /// An invalid parameter was passed (bad configuration, bad table entry).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the module has been established, or the session's
    /// IO task has exited.
    #[error("not connected")]
    NotConnected,

    /// The connection to the module was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_failure(failure: &Option<FailureInfo>) -> String {
    match failure {
        Some(info) if !info.label.is_empty() => format!(" ({}, code {})", info.label, info.code),
        Some(info) if info.code != 0 => format!(" (code {})", info.code),
        _ => String::new(),
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_busy() {
        assert_eq!(
            Error::Busy.to_string(),
            "busy: a request is already awaiting confirmation"
        );
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for confirmation");
    }

    #[test]
    fn error_display_framing_overflow() {
        let e = Error::FramingOverflow { limit: 256 };
        assert_eq!(e.to_string(), "line exceeded 256 bytes and was discarded");
    }

    #[test]
    fn error_display_mismatch_without_failure() {
        let e = Error::Mismatch {
            expected: ConfirmationStatus::ReadyForData,
            actual: ConfirmationStatus::Success,
            failure: None,
        };
        assert_eq!(
            e.to_string(),
            "confirmation mismatch: expected ready-for-data, got success"
        );
    }

    #[test]
    fn error_display_mismatch_with_label_and_code() {
        let e = Error::Mismatch {
            expected: ConfirmationStatus::Success,
            actual: ConfirmationStatus::Failure,
            failure: Some(FailureInfo {
                label: "SIM".into(),
                code: 10,
            }),
        };
        assert_eq!(
            e.to_string(),
            "confirmation mismatch: expected success, got failure (SIM, code 10)"
        );
    }

    #[test]
    fn error_display_mismatch_code_only() {
        let e = Error::Mismatch {
            expected: ConfirmationStatus::Success,
            actual: ConfirmationStatus::Failure,
            failure: Some(FailureInfo {
                label: String::new(),
                code: -3,
            }),
        };
        assert!(e.to_string().ends_with("(code -3)"));
    }

    #[test]
    fn error_display_unknown_event() {
        let e = Error::UnknownEvent("FOO:1".into());
        assert_eq!(e.to_string(), "unknown event: FOO:1");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
