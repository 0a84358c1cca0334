//! SessionBuilder -- fluent builder for constructing [`Session`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, framing, pacing and timeouts before the IO task
//! takes ownership of the transport.
//!
//! # Example
//!
//! ```no_run
//! use atlib_session::builder::SessionBuilder;
//! use atlib_session::matcher::EventTable;
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Event { Ready, Received }
//!
//! # async fn example() -> atlib_core::Result<()> {
//! let table = EventTable::builder()
//!     .bare("ready", Event::Ready)
//!     .event("IPD", Event::Received)
//!     .build()?;
//!
//! let session = SessionBuilder::new(table)
//!     .serial_port("/dev/ttyUSB0")
//!     .baud_rate(115_200)
//!     .min_command_interval(Duration::from_millis(20))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use atlib_core::config::{EngineConfig, Timeouts};
use atlib_core::error::{Error, Result};
use atlib_core::transport::Transport;
use atlib_core::types::Terminators;
use atlib_transport::serial::DEFAULT_BAUD_RATE;

use crate::io::spawn_io_task;
use crate::matcher::EventTable;
use crate::session::Session;

/// Fluent builder for [`Session`].
///
/// Starts from [`EngineConfig::default`] (CR LF, `OK`/`ERROR`, `+`
/// sentinel); chip families supply their own configuration through
/// [`config`](Self::config).
pub struct SessionBuilder<E> {
    table: Arc<EventTable<E>>,
    config: EngineConfig,
    serial_port: Option<String>,
    baud_rate: u32,
}

impl<E: Copy + fmt::Debug + Send + Sync + 'static> SessionBuilder<E> {
    /// Create a builder dispatching events through `table`.
    pub fn new(table: EventTable<E>) -> Self {
        Self::with_shared_table(Arc::new(table))
    }

    /// Create a builder around a table shared with other sessions.
    pub fn with_shared_table(table: Arc<EventTable<E>>) -> Self {
        SessionBuilder {
            table,
            config: EngineConfig::default(),
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Replace the whole engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Set the baud rate (default: 115200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    pub fn terminators(mut self, terminators: Terminators) -> Self {
        self.config.framing.terminators = terminators;
        self
    }

    pub fn max_line_len(mut self, len: usize) -> Self {
        self.config.framing.max_line_len = len;
        self
    }

    /// Minimum time between a confirmation and the next transmission.
    pub fn min_command_interval(mut self, interval: Duration) -> Self {
        self.config.timing.min_command_interval = interval;
        self
    }

    /// Wait re-check interval (default: 10ms).
    pub fn poll_step(mut self, step: Duration) -> Self {
        self.config.timing.poll_step = step;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Depth of the bounded event queue (default: 32).
    pub fn event_queue_depth(mut self, depth: usize) -> Self {
        self.config.event_queue_depth = depth;
        self
    }

    /// Build a [`Session`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `atlib-test-harness`) and for transports other
    /// than a local serial port. Must be called within a tokio runtime.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Session<E>> {
        self.config.validate()?;
        if !transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let (io, events) = spawn_io_task(transport, &self.config, Arc::clone(&self.table));
        tracing::debug!(
            terminators = ?self.config.framing.terminators,
            events = self.table.len(),
            "session started"
        );
        Ok(Session::new(
            io,
            events,
            self.table,
            self.config.timing,
            self.config.timeouts,
        ))
    }

    /// Build a [`Session`] over a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<Session<E>> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        self.config.validate()?;

        let transport = atlib_transport::SerialTransport::open(port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}
