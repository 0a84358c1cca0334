//! Unsolicited event notifications.
//!
//! The session engine resolves every unsolicited line against the family's
//! event table and queues the result as a [`Notification`]. The application
//! side drains that bounded queue, either into a registered callback or by
//! awaiting notifications directly, so user code never runs on the receive
//! path.

/// An unsolicited event resolved from the event table.
///
/// `E` is the family's event identifier, usually a fieldless enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification<E> {
    /// The event identifier from the matching table entry.
    pub event: E,
    /// The unconsumed remainder of the line: the event's own arguments,
    /// followed by any body-continuation lines joined with the configured
    /// delimiter.
    pub args: String,
}

impl<E> Notification<E> {
    /// Create a notification.
    pub fn new(event: E, args: impl Into<String>) -> Self {
        Notification {
            event,
            args: args.into(),
        }
    }
}
