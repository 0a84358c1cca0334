//! The application-side session handle.
//!
//! [`Session`] is what drivers hold. It sends one command at a time, waits
//! for its confirmation with a bounded timeout, and hands unsolicited
//! events to a registered callback or to whoever awaits
//! [`Session::next_event`].
//!
//! ```text
//!   Idle ──send()──▶ AwaitingConfirmation ──wait()──▶ Idle
//!                            │                         ▲
//!                            └── Busy on send() ───────┘
//! ```
//!
//! A registered callback runs on its own consumer task, which owns the
//! event queue while the callback is installed. The callback is moved into
//! that task and never sees the session, so it has no way to reach
//! `send()`. Events are delivered in arrival order, idle or not.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use atlib_core::config::{TimeoutCategory, Timeouts, Timing};
use atlib_core::error::{Error, Result};
use atlib_core::events::Notification;
use atlib_core::transport::Transport;
use atlib_core::types::{ConfirmationStatus, Terminators};

use crate::engine::SessionStats;
use crate::io::{Resolved, SessionIo};
use crate::matcher::EventTable;

/// Boxed event callback: event identifier and remaining arguments.
pub type EventCallback<E> = Box<dyn FnMut(E, &str) + Send>;

type EventRx<E> = mpsc::Receiver<Notification<E>>;

/// Where the event queue currently lives.
enum EventQueue<E> {
    /// Held by the session, read through `next_event()`.
    Local(EventRx<E>),
    /// Owned by a consumer task; the task hands the queue back when it stops.
    Consumer(JoinHandle<Option<EventRx<E>>>),
}

/// The request awaiting `wait()`.
#[derive(Debug)]
struct InFlight {
    seq: u64,
    resolved: oneshot::Receiver<Resolved>,
}

/// A live AT-command session over one transport.
///
/// Created by [`SessionBuilder`](crate::builder::SessionBuilder).
pub struct Session<E> {
    io: SessionIo,
    events: Option<EventQueue<E>>,
    /// Set while a callback is registered.
    consumer: Option<CancellationToken>,
    table: Arc<EventTable<E>>,
    in_flight: Option<InFlight>,
    last_resolved: Option<Instant>,
    timing: Timing,
    timeouts: Timeouts,
}

impl<E: Copy + fmt::Debug + Send + Sync + 'static> Session<E> {
    pub(crate) fn new(
        io: SessionIo,
        events: mpsc::Receiver<Notification<E>>,
        table: Arc<EventTable<E>>,
        timing: Timing,
        timeouts: Timeouts,
    ) -> Self {
        Session {
            io,
            events: Some(EventQueue::Local(events)),
            consumer: None,
            table,
            in_flight: None,
            last_resolved: None,
            timing,
            timeouts,
        }
    }

    /// Transmit a command.
    ///
    /// `command` is written as given, terminator included. Fails with
    /// [`Error::Busy`] if the previous command has not been consumed by
    /// [`wait`](Self::wait). If the previous confirmation arrived less than
    /// the minimum command interval ago, transmission is delayed until the
    /// interval has passed.
    pub async fn send(&mut self, command: &str) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(Error::Busy);
        }
        if let Some(at) = self.last_resolved {
            let ready = at + self.timing.min_command_interval;
            if ready > Instant::now() {
                sleep_until(ready).await;
            }
        }

        let (resolved_tx, resolved_rx) = oneshot::channel();
        let seq = self.io.transmit(command.to_string(), resolved_tx).await?;
        debug!(seq, command = command.trim_end(), "sent");
        self.in_flight = Some(InFlight {
            seq,
            resolved: resolved_rx,
        });
        Ok(())
    }

    /// Wait for the confirmation of the command last sent.
    ///
    /// Returns the accumulated reply body if the module answered with
    /// `expected`, [`Error::Mismatch`] if it answered with anything else,
    /// and [`Error::Timeout`] if nothing arrived within `timeout`. Either
    /// way the session is idle afterwards. The wait re-checks once per poll step, so a timeout is
    /// reported no earlier than `timeout` and no later than one poll step
    /// after it.
    pub async fn wait(&mut self, timeout: Duration, expected: ConfirmationStatus) -> Result<String> {
        if !expected.is_terminal() {
            return Err(Error::InvalidParameter(format!(
                "cannot wait for {expected} status"
            )));
        }
        let Some(mut in_flight) = self.in_flight.take() else {
            return Err(Error::NotPending);
        };

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!(seq = in_flight.seq, ?timeout, "confirmation timed out");
                self.io.cancel_request(in_flight.seq);
                return Err(Error::Timeout);
            }
            let slice = self.timing.poll_step.min(deadline - now);

            tokio::select! {
                biased;

                res = &mut in_flight.resolved => {
                    return match res {
                        Ok(resolved) => self.finish(resolved, expected),
                        Err(_) => Err(Error::NotConnected),
                    };
                }

                _ = sleep(slice) => {}
            }
        }
    }

    /// [`wait`](Self::wait) with the timeout of a latency category.
    pub async fn wait_for(
        &mut self,
        category: TimeoutCategory,
        expected: ConfirmationStatus,
    ) -> Result<String> {
        self.wait(self.timeouts.get(category), expected).await
    }

    /// Send a command and wait for it on the standard timeout.
    pub async fn request(&mut self, command: &str, expected: ConfirmationStatus) -> Result<String> {
        self.send(command).await?;
        self.wait_for(TimeoutCategory::Standard, expected).await
    }

    fn finish(&mut self, resolved: Resolved, expected: ConfirmationStatus) -> Result<String> {
        let Resolved { resolution, at } = resolved;
        self.last_resolved = Some(at);
        debug!(seq = resolution.seq, status = %resolution.status, "confirmation");
        if resolution.status == expected {
            Ok(resolution.body)
        } else {
            Err(Error::Mismatch {
                expected,
                actual: resolution.status,
                failure: resolution.failure,
            })
        }
    }

    /// Install the callback that receives unsolicited events, replacing
    /// any previous one.
    ///
    /// The callback runs on a consumer task spawned on the current Tokio
    /// runtime, so events reach it while the session is idle as well as
    /// during `wait()`. Events still queued from a replaced callback go to
    /// the new one.
    pub fn register_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(E, &str) + Send + 'static,
    {
        if let Some(previous) = self.consumer.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume_events(
            self.events.take(),
            Box::new(callback),
            cancel.clone(),
        ));
        self.events = Some(EventQueue::Consumer(task));
        self.consumer = Some(cancel);
    }

    /// Remove the event callback. Events not yet handed to it stay queued
    /// for [`next_event`](Self::next_event).
    pub fn clear_event_callback(&mut self) {
        if let Some(cancel) = self.consumer.take() {
            cancel.cancel();
        }
    }

    /// Whether an event callback is registered.
    pub fn has_event_callback(&self) -> bool {
        self.consumer.is_some()
    }

    /// Await the next unsolicited event.
    ///
    /// Returns `None` while a callback is registered, and once the IO task
    /// has exited and the queue is empty.
    pub async fn next_event(&mut self) -> Option<Notification<E>> {
        if self.consumer.is_some() {
            return None;
        }
        if let Some(EventQueue::Consumer(task)) = self.events.as_mut() {
            let returned = match task.await {
                Ok(events) => events,
                Err(e) => {
                    error!(error = %e, "event consumer task failed, event queue lost");
                    None
                }
            };
            self.events = returned.map(EventQueue::Local);
        }
        match self.events.as_mut() {
            Some(EventQueue::Local(events)) => events.recv().await,
            _ => None,
        }
    }

    /// Change line terminators. `second` is ignored unless
    /// `two_terminator_mode` is set.
    pub async fn configure(&mut self, first: u8, second: u8, two_terminator_mode: bool) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(Error::Busy);
        }
        let terminators = Terminators::new(first, second, two_terminator_mode);
        self.io.configure(terminators).await?;
        debug!(?terminators, "terminators configured");
        Ok(())
    }

    /// Change the minimum command interval and the poll step.
    pub async fn configure_timing(
        &mut self,
        min_command_interval: Duration,
        poll_step: Duration,
    ) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(Error::Busy);
        }
        if poll_step.is_zero() {
            return Err(Error::InvalidParameter("poll_step must be non-zero".into()));
        }
        self.io.set_poll_step(poll_step).await?;
        self.timing = Timing {
            min_command_interval,
            poll_step,
        };
        Ok(())
    }

    /// Replace the per-category timeouts.
    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Whether a sent command still awaits [`wait`](Self::wait).
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn event_table(&self) -> &EventTable<E> {
        &self.table
    }

    /// Counters from the receive path.
    pub async fn stats(&self) -> Result<SessionStats> {
        self.io.stats().await
    }

    /// Stop the IO task and return the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.io.shutdown().await
    }
}

impl<E> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("in_flight", &self.in_flight.as_ref().map(|r| r.seq))
            .field("callback", &self.consumer.is_some())
            .field("timing", &self.timing)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

/// Consumer task body: run `callback` for every event until cancelled or
/// the IO task goes away, then hand the queue back.
async fn consume_events<E>(
    source: Option<EventQueue<E>>,
    mut callback: EventCallback<E>,
    cancel: CancellationToken,
) -> Option<EventRx<E>>
where
    E: Copy + fmt::Debug + Send + Sync + 'static,
{
    // A replaced consumer finishes its current event before handing over.
    let mut events = match source? {
        EventQueue::Local(events) => events,
        EventQueue::Consumer(previous) => previous.await.ok().flatten()?,
    };

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            next = events.recv() => match next {
                Some(notification) => callback(notification.event, &notification.args),
                None => {
                    debug!("event queue closed, consumer exiting");
                    break;
                }
            },
        }
    }
    Some(events)
}
