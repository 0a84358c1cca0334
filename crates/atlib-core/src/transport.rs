//! Transport trait for module communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a radio
//! module. A host serial port is the usual implementation; the test harness
//! provides a scripted mock.
//!
//! The session engine operates on a `Transport` rather than directly on a
//! serial port, enabling both real hardware control and deterministic unit
//! testing with `MockTransport` from the `atlib-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a module.
///
/// Implementations handle buffering and error recovery at the physical
/// layer. Line framing and reply correlation are the session engine's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the module.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the module into the provided buffer.
    ///
    /// Returns the number of bytes actually read, which may be any chunk
    /// size of at least one byte. Will wait up to `timeout` for data to
    /// arrive; returns [`Error::Timeout`](crate::error::Error::Timeout) if
    /// nothing is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
