//! IO task types and implementation for AT-command sessions.
//!
//! One tokio task owns the transport exclusively. It transmits commands,
//! feeds every received chunk through the [`SessionCore`], delivers the
//! pending request's resolution over a oneshot, and pushes notifications
//! into the bounded event queue. The application side never touches the
//! transport and never runs inside the receive path.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use atlib_core::config::EngineConfig;
use atlib_core::error::{Error, Result};
use atlib_core::events::Notification;
use atlib_core::transport::Transport;
use atlib_core::types::Terminators;

use crate::engine::{warn_queue_full, CoreOutput, SessionCore, SessionStats};
use crate::matcher::EventTable;
use crate::pending::Resolution;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A resolution stamped with the moment the IO task observed it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    pub at: Instant,
}

/// A request sent from the session handle to the IO task.
pub enum Request {
    /// Register `command` as pending and write it to the transport.
    ///
    /// `reply` carries the assigned sequence number once the bytes are out;
    /// `resolved` fires when a confirmation arrives.
    Transmit {
        command: String,
        reply: oneshot::Sender<Result<u64>>,
        resolved: oneshot::Sender<Resolved>,
    },
    /// Abandon request `seq` after its waiter gave up.
    Cancel { seq: u64 },
    /// Switch the framer's terminators.
    Configure {
        terminators: Terminators,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Change the receive slice.
    SetPollStep { poll_step: Duration },
    /// Snapshot the receive-path counters.
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
    /// Graceful shutdown; returns the transport for recovery.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Transmit { command, .. } => {
                f.debug_struct("Transmit").field("command", command).finish()
            }
            Request::Cancel { seq } => f.debug_struct("Cancel").field("seq", seq).finish(),
            Request::Configure { terminators, .. } => f
                .debug_struct("Configure")
                .field("terminators", terminators)
                .finish(),
            Request::SetPollStep { poll_step } => f
                .debug_struct("SetPollStep")
                .field("poll_step", poll_step)
                .finish(),
            Request::Stats { .. } => f.write_str("Stats"),
            Request::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// Handle to the IO task. Stored inside [`Session`](crate::session::Session).
#[derive(Debug)]
pub struct SessionIo {
    /// Command channel into the IO task.
    pub tx: mpsc::Sender<Request>,
    /// Cancellation token for abrupt teardown.
    pub cancel: CancellationToken,
    /// Join handle for the IO task.
    pub task: JoinHandle<()>,
}

impl SessionIo {
    /// Transmit a command and return its sequence number.
    pub async fn transmit(
        &self,
        command: String,
        resolved: oneshot::Sender<Resolved>,
    ) -> Result<u64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Transmit {
                command,
                reply: reply_tx,
                resolved,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Tell the IO task to drop request `seq`. Best effort.
    pub fn cancel_request(&self, seq: u64) {
        if self.tx.try_send(Request::Cancel { seq }).is_err() {
            debug!(seq, "could not deliver cancel to IO task");
        }
    }

    pub async fn configure(&self, terminators: Terminators) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Configure {
                terminators,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)?
    }

    pub async fn set_poll_step(&self, poll_step: Duration) -> Result<()> {
        self.tx
            .send(Request::SetPollStep { poll_step })
            .await
            .map_err(|_| Error::NotConnected)
    }

    pub async fn stats(&self) -> Result<SessionStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Stats { reply: reply_tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }

    /// Shut down the IO task and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(Request::Shutdown { reply: reply_tx }).await;
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Depth of the command channel. The session handle has at most one
/// transmit outstanding, so this only needs room for a few control messages.
const REQUEST_QUEUE_DEPTH: usize = 8;

/// Size of the receive buffer handed to the transport.
const RX_CHUNK: usize = 256;

/// Spawn the IO task. Returns the handle and the receiving end of the
/// event queue.
pub fn spawn_io_task<E>(
    transport: Box<dyn Transport>,
    config: &EngineConfig,
    table: Arc<EventTable<E>>,
) -> (SessionIo, mpsc::Receiver<Notification<E>>)
where
    E: Copy + fmt::Debug + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel::<Request>(REQUEST_QUEUE_DEPTH);
    let (event_tx, event_rx) = mpsc::channel(config.event_queue_depth);
    let cancel = CancellationToken::new();
    let core = SessionCore::new(config, table);

    let task = tokio::spawn(io_loop(
        transport,
        core,
        config.timing.poll_step,
        rx,
        event_tx,
        cancel.clone(),
    ));

    (SessionIo { tx, cancel, task }, event_rx)
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// The waiter of the request currently in flight.
struct Waiter {
    seq: u64,
    resolved: oneshot::Sender<Resolved>,
}

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Requests from the session handle
/// 3. Receiving bytes, one poll step at a time
///
/// A transport error disables the receive arm; requests keep being
/// answered (transmits fail with `ConnectionLost`) until shutdown.
async fn io_loop<E>(
    mut transport: Box<dyn Transport>,
    mut core: SessionCore<E>,
    mut poll_step: Duration,
    mut rx: mpsc::Receiver<Request>,
    event_tx: mpsc::Sender<Notification<E>>,
    cancel: CancellationToken,
) where
    E: Copy + fmt::Debug + Send + Sync + 'static,
{
    let mut waiter: Option<Waiter> = None;
    let mut connected = true;
    let mut buf = [0u8; RX_CHUNK];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("session IO task cancelled");
                break;
            }

            req = rx.recv() => {
                match req {
                    Some(Request::Shutdown { reply }) => {
                        debug!(stats = ?core.stats(), "IO task shutdown requested");
                        let _ = reply.send(transport);
                        return;
                    }
                    Some(Request::Transmit { command, reply, resolved }) => {
                        let result = if connected {
                            transmit(&mut *transport, &mut core, &command).await
                        } else {
                            Err(Error::ConnectionLost)
                        };
                        if let Ok(seq) = result {
                            waiter = Some(Waiter { seq, resolved });
                        }
                        // A dropped reply means the caller's `send()` was
                        // cancelled; nobody will wait for this seq.
                        if let Err(Ok(seq)) = reply.send(result) {
                            debug!(seq, "transmit abandoned by caller, cancelling");
                            core.cancel(seq);
                            waiter = None;
                        }
                    }
                    Some(Request::Cancel { seq }) => {
                        core.cancel(seq);
                        if waiter.as_ref().is_some_and(|w| w.seq == seq) {
                            waiter = None;
                        }
                    }
                    Some(Request::Configure { terminators, reply }) => {
                        let _ = reply.send(core.set_terminators(terminators));
                    }
                    Some(Request::SetPollStep { poll_step: step }) => {
                        poll_step = step;
                    }
                    Some(Request::Stats { reply }) => {
                        let _ = reply.send(core.stats());
                    }
                    None => {
                        debug!("request channel closed, exiting IO task");
                        break;
                    }
                }
            }

            res = transport.receive(&mut buf, poll_step), if connected => {
                match res {
                    Ok(n) => {
                        for output in core.feed(&buf[..n]) {
                            deliver(output, &mut core, &mut waiter, &event_tx);
                        }
                    }
                    Err(Error::Timeout) => {}
                    Err(e) => {
                        error!(error = %e, "transport receive failed, session disconnected");
                        connected = false;
                        // Dropping the waiter wakes `wait()` with NotConnected.
                        waiter = None;
                    }
                }
            }
        }
    }

    debug!(stats = ?core.stats(), "session IO task exiting");
}

/// Register `command` as pending and write it out.
async fn transmit<E: Copy + fmt::Debug>(
    transport: &mut dyn Transport,
    core: &mut SessionCore<E>,
    command: &str,
) -> Result<u64> {
    let seq = core.begin_request(command)?;
    trace!(seq, command, "tx");
    if let Err(e) = transport.send(command.as_bytes()).await {
        error!(seq, error = %e, "transport send failed");
        core.cancel(seq);
        return Err(e);
    }
    Ok(seq)
}

fn deliver<E: Copy + fmt::Debug>(
    output: CoreOutput<E>,
    core: &mut SessionCore<E>,
    waiter: &mut Option<Waiter>,
    event_tx: &mpsc::Sender<Notification<E>>,
) {
    match output {
        CoreOutput::Resolved(resolution) => match waiter.take() {
            Some(w) if w.seq == resolution.seq => {
                let _ = w.resolved.send(Resolved {
                    resolution,
                    at: Instant::now(),
                });
            }
            other => {
                debug!(seq = resolution.seq, "resolution without a matching waiter");
                *waiter = other;
            }
        },
        CoreOutput::Event(notification) => match event_tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                core.note_event_lost();
                warn_queue_full(&n.event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("event queue closed, notification discarded");
            }
        },
    }
}
