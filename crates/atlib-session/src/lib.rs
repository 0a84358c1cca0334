//! Generic AT-command session engine.
//!
//! This crate turns a byte stream from a UART-attached module into
//! confirmed requests and typed events. One tokio task owns the transport
//! and runs the receive path; the [`Session`] handle on the application
//! side sends one command at a time, waits for its confirmation, and hands
//! unsolicited events to a callback or an awaiting consumer.
//!
//! # Architecture
//!
//! - [`framer`] — bytes to lines, one or two terminator bytes
//! - [`classify`] — confirmation, reply body, event or plain line
//! - [`matcher`] — the per-family event pattern tree
//! - [`pending`] — the single in-flight request and its reply body
//! - [`engine`] — the sans-IO core composing the four above
//! - [`io`] — IO task types, spawn, and the select loop
//! - [`session`] — the application handle with the confirm waiter
//! - [`builder`] — fluent construction over a serial port or any transport

pub mod builder;
pub mod classify;
pub mod engine;
pub mod framer;
pub mod io;
pub mod matcher;
pub mod pending;
pub mod session;

pub use builder::SessionBuilder;
pub use classify::{Classification, Classifier};
pub use engine::{CoreOutput, SessionCore, SessionStats};
pub use framer::LineFramer;
pub use matcher::{EventMatch, EventSpec, EventTable, EventTableBuilder, LevelBuilder};
pub use pending::{command_name, PendingTracker, Resolution};
pub use session::{EventCallback, Session};
