//! atlib-core: Core types, error definitions, and the transport trait for atlib.
//!
//! This crate defines the chip-agnostic vocabulary shared by the session
//! engine, the transports, and every chip family table. Drivers for a
//! particular radio module depend on these types without pulling in the
//! engine or a serial port implementation.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to a module
//! - [`ConfirmationStatus`] -- terminal reply classification of a command
//! - [`EngineConfig`] -- framing, vocabulary, timing and timeout settings
//! - [`Notification`] -- an unsolicited event resolved from the event table
//! - [`Error`] / [`Result`] -- error handling

pub mod config;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use atlib_core::*`.
pub use config::{EngineConfig, FramingConfig, TimeoutCategory, Timeouts, Timing, Vocabulary};
pub use error::{Error, Result};
pub use events::Notification;
pub use transport::Transport;
pub use types::{ConfirmationStatus, FailureInfo, Terminators};
