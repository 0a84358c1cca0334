//! Shared value types used by the session engine and the chip families.

use std::fmt;

/// Terminal classification of a command reply.
///
/// A pending request starts out [`Unresolved`](Self::Unresolved) and moves
/// exactly once to one of the terminal variants. It never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationStatus {
    /// No confirmation observed yet.
    Unresolved,
    /// The module accepted the command (`OK`).
    Success,
    /// The module rejected the command (`ERROR`, `+CME ERROR: ...`).
    Failure,
    /// The module is ready to accept a raw data payload (`>` prompt).
    ReadyForData,
    /// A family-specific terminal status not covered above.
    Custom(u8),
}

impl ConfirmationStatus {
    /// Returns `true` for every variant except [`Unresolved`](Self::Unresolved).
    pub fn is_terminal(self) -> bool {
        !matches!(self, ConfirmationStatus::Unresolved)
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationStatus::Unresolved => write!(f, "unresolved"),
            ConfirmationStatus::Success => write!(f, "success"),
            ConfirmationStatus::Failure => write!(f, "failure"),
            ConfirmationStatus::ReadyForData => write!(f, "ready-for-data"),
            ConfirmationStatus::Custom(n) => write!(f, "custom({n})"),
        }
    }
}

/// Detail parsed from a failure confirmation such as `ERROR:SIM,10`.
///
/// Sub-fields that fail to parse fall back to an empty label and code 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureInfo {
    /// Short text label, e.g. `"SIM"`. Empty when absent.
    pub label: String,
    /// Signed error code. Zero when absent or unparsable.
    pub code: i32,
}

/// Line terminator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminators {
    /// A line ends on the first occurrence of this byte.
    Single(u8),
    /// A line ends only when the first byte is immediately followed by the
    /// second. A lone first byte is treated as data.
    Pair(u8, u8),
}

impl Terminators {
    /// `\r\n`, the most common AT-command line ending.
    pub const CRLF: Terminators = Terminators::Pair(b'\r', b'\n');

    /// A lone `\r`.
    pub const CR: Terminators = Terminators::Single(b'\r');

    /// Build from the two-byte form used by driver configuration calls.
    ///
    /// When `two_terminator_mode` is `false`, `second` is ignored.
    pub fn new(first: u8, second: u8, two_terminator_mode: bool) -> Self {
        if two_terminator_mode {
            Terminators::Pair(first, second)
        } else {
            Terminators::Single(first)
        }
    }

    /// Bytes to append when transmitting a command line.
    pub fn as_bytes(self) -> Vec<u8> {
        match self {
            Terminators::Single(a) => vec![a],
            Terminators::Pair(a, b) => vec![a, b],
        }
    }
}

impl Default for Terminators {
    fn default() -> Self {
        Terminators::CRLF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unresolved_is_non_terminal() {
        assert!(!ConfirmationStatus::Unresolved.is_terminal());
        assert!(ConfirmationStatus::Success.is_terminal());
        assert!(ConfirmationStatus::Failure.is_terminal());
        assert!(ConfirmationStatus::ReadyForData.is_terminal());
        assert!(ConfirmationStatus::Custom(3).is_terminal());
    }

    #[test]
    fn status_display() {
        assert_eq!(ConfirmationStatus::ReadyForData.to_string(), "ready-for-data");
        assert_eq!(ConfirmationStatus::Custom(7).to_string(), "custom(7)");
    }

    #[test]
    fn terminators_from_driver_form() {
        assert_eq!(Terminators::new(b'\r', b'\n', true), Terminators::CRLF);
        assert_eq!(Terminators::new(b'\r', b'\n', false), Terminators::CR);
    }

    #[test]
    fn terminator_bytes() {
        assert_eq!(Terminators::CRLF.as_bytes(), b"\r\n".to_vec());
        assert_eq!(Terminators::CR.as_bytes(), b"\r".to_vec());
    }
}
