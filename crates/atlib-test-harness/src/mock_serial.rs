//! Mock transport for deterministic testing of AT-command sessions.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs, like a module that answers each command with a
//! fixed script. Unlike a request/response protocol, an AT module also
//! talks on its own, so the mock has an inbound byte queue that tests fill
//! through a [`MockHandle`] at any time.
//!
//! # Example
//!
//! ```
//! use atlib_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the engine sends this command, the module echoes it and answers.
//! mock.expect(b"AT+GMR\r\n", b"AT+GMR\r\n+GMR:2.4.0\r\nOK\r\n");
//!
//! // Keep a handle for the test; the transport itself goes to the session.
//! let handle = mock.handle();
//! handle.inject(b"+IPD,4:ping\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use atlib_core::error::{Error, Result};
use atlib_core::transport::Transport;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// Bytes queued for reception when the matching request is sent.
    response: Vec<u8>,
}

/// One `send()` call as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub data: Vec<u8>,
    /// Tokio time of the call, so paused-clock tests can measure pacing.
    pub at: Instant,
}

#[derive(Debug)]
struct MockState {
    expectations: VecDeque<Expectation>,
    inbound: VecDeque<u8>,
    /// Largest number of bytes handed out per `receive()`; `None` means
    /// as many as fit.
    chunk_size: Option<usize>,
    connected: bool,
    sent_log: Vec<SentRecord>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    readable: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A mock [`Transport`] for testing without a module attached.
///
/// Expectations are consumed in order. When `send()` is called, the data
/// is logged and matched against the next expectation; its response is
/// appended to the inbound queue. A mismatch is a
/// [`Error::Protocol`] error. With no expectations left, sends are logged
/// and accepted silently, like a module that does not answer.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// Test-side handle to a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState {
                    expectations: VecDeque::new(),
                    inbound: VecDeque::new(),
                    chunk_size: None,
                    connected: true,
                    sent_log: Vec::new(),
                }),
                readable: Notify::new(),
            }),
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.handle().expect(request, response);
    }

    /// Hand out at most `n` bytes per `receive()` call.
    pub fn set_chunk_size(&mut self, n: usize) {
        self.shared.lock().chunk_size = Some(n.max(1));
    }

    /// A handle sharing this transport's state.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Data sent so far, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.handle().sent()
    }

    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }

    /// Set the connected state. While disconnected, `send()` and
    /// `receive()` return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.handle().set_connected(connected);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Add an expected request/response pair.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.shared.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue bytes as if the module had sent them unprompted.
    pub fn inject(&self, data: &[u8]) {
        self.shared.lock().inbound.extend(data);
        self.shared.readable.notify_one();
    }

    /// Data sent so far, one element per `send()` call.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .sent_log
            .iter()
            .map(|r| r.data.clone())
            .collect()
    }

    /// Sent data decoded as text, for readable assertions.
    pub fn sent_strings(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    /// Every `send()` call with its timestamp.
    pub fn sent_records(&self) -> Vec<SentRecord> {
        self.shared.lock().sent_log.clone()
    }

    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }

    /// Bytes injected or scripted but not yet received.
    pub fn pending_inbound(&self) -> usize {
        self.shared.lock().inbound.len()
    }

    pub fn set_connected(&self, connected: bool) {
        self.shared.lock().connected = connected;
        self.shared.readable.notify_one();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        {
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(Error::NotConnected);
            }

            state.sent_log.push(SentRecord {
                data: data.to_vec(),
                at: Instant::now(),
            });

            if let Some(expectation) = state.expectations.pop_front() {
                if data != expectation.request.as_slice() {
                    return Err(Error::Protocol(format!(
                        "unexpected send data: expected {:?}, got {:?}",
                        String::from_utf8_lossy(&expectation.request),
                        String::from_utf8_lossy(data)
                    )));
                }
                state.inbound.extend(expectation.response);
            }
        }
        self.shared.readable.notify_one();
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.shared.lock();
                if !state.connected {
                    return Err(Error::NotConnected);
                }
                if !state.inbound.is_empty() {
                    let limit = state.chunk_size.unwrap_or(usize::MAX);
                    let n = state.inbound.len().min(buf.len()).min(limit);
                    for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            if tokio::time::timeout_at(deadline, self.shared.readable.notified())
                .await
                .is_err()
            {
                return Err(Error::Timeout);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }
}
