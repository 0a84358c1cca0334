//! atlib-test-harness: Test utilities and mock transports for atlib.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! session engine and of drivers built on it, without a module attached.
//! A [`MockHandle`] stays with the test after the transport has been moved
//! into a session, to inject unsolicited bytes and inspect what was sent.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport, SentRecord};
