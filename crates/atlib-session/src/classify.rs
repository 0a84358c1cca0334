//! Response classification.
//!
//! Every completed line is sorted into one of four buckets before anything
//! else happens to it:
//!
//! 1. a confirmation (`OK`, `ERROR...`, or a family's extra tokens such as
//!    the `>` data prompt),
//! 2. a reply body line for the pending command (`+NAME:...` while `AT+NAME`
//!    is in flight),
//! 3. an unsolicited event (any other sentinel-prefixed line),
//! 4. a plain line (command echo, banners, noise).
//!
//! Confirmation tokens are matched as case-insensitive prefixes. Command
//! names are matched case-insensitively too, because several firmwares echo
//! the name in lower case. Event matching proper is left to
//! [`EventTable`](crate::matcher::EventTable), which is case-sensitive.

use atlib_core::config::Vocabulary;
use atlib_core::types::{ConfirmationStatus, FailureInfo};

/// Characters allowed between a failure token and its label/code.
const FAILURE_SEPARATORS: &[char] = &[':', ' '];

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    /// A terminal reply. `failure` is set only for failure tokens.
    Confirmation {
        status: ConfirmationStatus,
        failure: Option<FailureInfo>,
    },
    /// A body line for the pending command. Carries the text after the
    /// sentinel.
    Body(&'a str),
    /// A sentinel line not belonging to the pending command. Carries the
    /// text after the sentinel.
    Event(&'a str),
    /// Neither a confirmation nor sentinel-prefixed.
    Plain(&'a str),
}

/// Sorts lines according to a family's [`Vocabulary`].
#[derive(Debug, Clone)]
pub struct Classifier {
    success: String,
    failures: Vec<String>,
    extras: Vec<(String, ConfirmationStatus)>,
    sentinels: Vec<char>,
}

impl Classifier {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Classifier {
            success: vocabulary.success.clone(),
            failures: vocabulary.failures.clone(),
            extras: vocabulary.extra_confirmations.clone(),
            sentinels: vocabulary.sentinels.clone(),
        }
    }

    /// Classify a line. Surrounding whitespace is ignored.
    ///
    /// `pending` is the name of the command awaiting confirmation, if any.
    pub fn classify<'a>(&self, line: &'a str, pending: Option<&str>) -> Classification<'a> {
        let line = line.trim();

        for (token, status) in &self.extras {
            if starts_with_ignore_case(line, token) {
                return Classification::Confirmation {
                    status: *status,
                    failure: None,
                };
            }
        }

        if starts_with_ignore_case(line, &self.success) {
            return Classification::Confirmation {
                status: ConfirmationStatus::Success,
                failure: None,
            };
        }

        // Longest token first, so `+CME ERROR` is not cut short by a
        // shorter token that happens to be its prefix.
        if let Some(token) = self
            .failures
            .iter()
            .filter(|token| starts_with_ignore_case(line, token))
            .max_by_key(|token| token.len())
        {
            return Classification::Confirmation {
                status: ConfirmationStatus::Failure,
                failure: Some(parse_failure(&line[token.len()..])),
            };
        }

        let Some(first) = line.chars().next() else {
            return Classification::Plain(line);
        };
        if !self.sentinels.contains(&first) {
            return Classification::Plain(line);
        }

        let text = &line[first.len_utf8()..];
        match pending {
            Some(name) if names_command(text, name) => Classification::Body(text),
            _ => Classification::Event(text),
        }
    }
}

/// Parse the text following a failure token into a label and code.
///
/// Accepted shapes, after an optional `:` or space separator:
/// `LABEL,CODE`, `CODE`, `LABEL`, and nothing at all. Anything that does
/// not parse leaves the corresponding field at its default.
pub fn parse_failure(rest: &str) -> FailureInfo {
    let rest = rest.trim_start_matches(FAILURE_SEPARATORS).trim();
    if rest.is_empty() {
        return FailureInfo::default();
    }

    match rest.split_once(',') {
        Some((label, code)) => FailureInfo {
            label: label.trim().to_string(),
            code: code.trim().parse().unwrap_or(0),
        },
        None => match rest.parse::<i32>() {
            Ok(code) => FailureInfo {
                label: String::new(),
                code,
            },
            Err(_) => FailureInfo {
                label: rest.to_string(),
                code: 0,
            },
        },
    }
}

/// Returns `true` if `text` (a line with its sentinel removed) starts with
/// the command `name` as a whole word.
pub fn names_command(text: &str, name: &str) -> bool {
    if name.is_empty() || !starts_with_ignore_case(text, name) {
        return false;
    }
    match text[name.len()..].chars().next() {
        None => true,
        Some(c) => !(c.is_ascii_alphanumeric() || c == '_'),
    }
}

pub(crate) fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
