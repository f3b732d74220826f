//! Sequential transport resolution.
//!
//! Resolution tries each candidate transport in order, one at a time, and
//! commits to the first whose start attempt succeeds. It is an explicit state
//! machine:
//!
//! ```text
//!            success
//! Trying(i) ─────────► Resolved(i)
//!     │
//!     │ failure or cancellation
//!     ▼
//! Trying(i + 1) ─ ... ─► Failed (after the last candidate)
//! ```
//!
//! Cancelling the overall future before any attempt succeeds cancels the
//! active attempt and moves on to the next candidate, exactly as if the
//! active attempt had failed. A later candidate which starts is still
//! committed, even though the overall future stays cancelled.
//!
//! Start attempts and the overall future report back through callbacks, which
//! may fire on any thread. Callbacks never touch the state machine directly:
//! they post an [`Event`] to a queue, and whichever thread finds the queue idle
//! drains it, applying events one at a time. Callbacks fired while the queue is
//! being drained (including callbacks fired synchronously by the drain itself)
//! only enqueue and return.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::candidates::Candidates;
use super::pending::bind;
use super::Shared;
use crate::connection::{ConnectionContext, ConnectionMode, LogLevel};
use crate::error::Error;
use crate::future::CancellableFuture;
use crate::transport::{ClientTransport, DataCallback};

/// Something that happened to a resolution.
#[derive(Debug)]
enum Event {
    /// Resolution was requested.
    Begin,

    /// The start attempt for candidate `index` settled.
    Attempt {
        index: usize,
        result: Result<(), Error>,
    },

    /// The overall resolution future was cancelled.
    Cancelled,

    /// A newer resolution replaced this one.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Trying(usize),
    Resolved(usize),
    Failed,
    Superseded,
}

struct Machine {
    phase: Phase,
    candidates: Option<Candidates>,

    /// The start attempt of the active (or winning) candidate.
    attempt: Option<CancellableFuture<()>>,
}

#[derive(Default)]
struct Events {
    queue: VecDeque<Event>,
    draining: bool,
}

/// A single run of transport resolution, driving one overall future.
pub(super) struct Resolution {
    transport: Arc<Shared>,
    connection: Arc<dyn ConnectionContext>,
    mode: ConnectionMode,
    on_data: DataCallback,
    overall: CancellableFuture<()>,
    events: Mutex<Events>,
    machine: Mutex<Machine>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("mode", &self.mode)
            .field("overall", &self.overall)
            .finish_non_exhaustive()
    }
}

impl Resolution {
    pub(super) fn new(
        transport: Arc<Shared>,
        connection: Arc<dyn ConnectionContext>,
        mode: ConnectionMode,
        on_data: DataCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            connection,
            mode,
            on_data,
            overall: CancellableFuture::new(),
            events: Mutex::new(Events::default()),
            machine: Mutex::new(Machine {
                phase: Phase::Idle,
                candidates: None,
                attempt: None,
            }),
        })
    }

    /// Start resolving, returning the overall future.
    pub(super) fn run(self: &Arc<Self>) -> CancellableFuture<()> {
        self.post(Event::Begin);

        let cancelled = self.clone();
        self.overall
            .on_cancelled(move || cancelled.post(Event::Cancelled));

        self.overall.clone()
    }

    /// Has the caller given up on this resolution?
    pub(super) fn is_cancelled(&self) -> bool {
        self.overall.is_cancelled()
    }

    /// Stop trying candidates. The active attempt is cancelled.
    pub(super) fn supersede(self: &Arc<Self>) {
        self.post(Event::Superseded);
    }

    fn post(self: &Arc<Self>, event: Event) {
        {
            let mut events = self.events.lock();
            events.queue.push_back(event);
            if events.draining {
                return;
            }
            events.draining = true;
        }

        let mut machine = self.machine.lock();
        loop {
            let event = {
                let mut events = self.events.lock();
                match events.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        events.draining = false;
                        return;
                    }
                }
            };

            self.step(&mut machine, event);
        }
    }

    fn step(self: &Arc<Self>, machine: &mut Machine, event: Event) {
        trace!(phase = ?machine.phase, ?event, "resolution event");

        match (machine.phase, event) {
            (Phase::Idle, Event::Begin) => self.begin_attempts(machine),
            (Phase::Idle, Event::Superseded) => machine.phase = Phase::Superseded,
            (Phase::Trying(active), Event::Attempt { index, result }) if index == active => {
                match result {
                    Ok(()) => self.commit(machine, index),
                    Err(error) => self.fallback(machine, index, error),
                }
            }
            (Phase::Trying(active), Event::Cancelled) => self.cancel_active(machine, active),
            (Phase::Trying(active), Event::Superseded) => {
                debug!(index = active, "resolution superseded");
                machine.phase = Phase::Superseded;
                if let Some(attempt) = machine.attempt.take() {
                    attempt.cancel();
                }
            }
            (Phase::Resolved(winner), Event::Attempt { index, result: Err(error) })
                if index != winner =>
            {
                debug!(index, %error, "start attempt failed after a transport was resolved");
                self.overall.fail(Error::Stale(Box::new(error)));
            }
            (Phase::Resolved(index), Event::Cancelled) => {
                debug!(index, "resolution cancelled, forwarding to resolved transport");
                if let Some(attempt) = &machine.attempt {
                    attempt.cancel();
                }
            }
            (phase, Event::Attempt { index, result: Ok(()) })
                if phase != Phase::Resolved(index) =>
            {
                self.discard(machine, index)
            }
            (phase, event) => {
                trace!(?phase, ?event, "ignoring resolution event");
            }
        }
    }

    fn candidate(machine: &Machine, index: usize) -> Option<Arc<dyn ClientTransport>> {
        machine
            .candidates
            .as_ref()
            .and_then(|candidates| candidates.get(index))
            .cloned()
    }

    fn begin_attempts(self: &Arc<Self>, machine: &mut Machine) {
        let candidates = self.transport.candidates(self.connection.as_ref());
        if candidates.is_empty() {
            debug!("no candidate transports");
            self.fail(machine, Error::NoCandidates);
            return;
        }

        machine.candidates = Some(candidates);
        self.attempt(machine, 0);
    }

    fn attempt(self: &Arc<Self>, machine: &mut Machine, index: usize) {
        let Some(transport) = Self::candidate(machine, index) else {
            self.fail(machine, Error::NoCandidates);
            return;
        };

        machine.phase = Phase::Trying(index);
        trace!(index, kind = %transport.kind(), "starting transport");

        let attempt = transport.start(&self.connection, self.mode, self.on_data.clone());
        machine.attempt = Some(attempt.clone());

        let completed = self.clone();
        let failed = self.clone();
        let cancelled = self.clone();
        attempt
            .on_completion(move |_| {
                completed.post(Event::Attempt {
                    index,
                    result: Ok(()),
                })
            })
            .on_error(move |error| {
                failed.post(Event::Attempt {
                    index,
                    result: Err(error.clone()),
                })
            })
            .on_cancelled(move || {
                cancelled.post(Event::Attempt {
                    index,
                    result: Err(Error::Cancelled),
                })
            });
    }

    /// The overall future was cancelled while candidate `active` was starting.
    fn cancel_active(self: &Arc<Self>, machine: &mut Machine, active: usize) {
        // Its success may still be queued behind the cancellation.
        if machine
            .attempt
            .as_ref()
            .is_some_and(CancellableFuture::is_completed)
        {
            trace!(index = active, "active attempt succeeded before cancellation");
            self.commit(machine, active);
            return;
        }

        let abandoned = machine.attempt.take();
        self.fallback(machine, active, Error::Cancelled);

        if let Some(attempt) = abandoned {
            attempt.cancel();
        }
    }

    fn commit(&self, machine: &mut Machine, index: usize) {
        let Some(transport) = Self::candidate(machine, index) else {
            return;
        };
        machine.phase = Phase::Resolved(index);

        // Queued sends must reach the winner before anything sent through
        // the resolved transport.
        let winner = self
            .transport
            .resolved
            .get_or_init(|| {
                self.transport.pending.flush(&transport);
                transport.clone()
            })
            .clone();
        self.release();

        if !Arc::ptr_eq(&winner, &transport) {
            debug!(
                kind = %transport.kind(),
                winner = %winner.kind(),
                "another resolution committed first"
            );
            transport.abort(&self.connection);
            if !self.overall.is_cancelled() {
                bind(
                    &self.overall,
                    winner.start(&self.connection, self.mode, self.on_data.clone()),
                );
            }
            return;
        }

        self.connection.log(
            &format!("transport resolved into {}", transport.kind()),
            LogLevel::Information,
        );
        debug!(index, kind = %transport.kind(), name = transport.name(), "transport resolved");

        self.overall.complete(());
    }

    /// An attempt which is no longer wanted started anyway.
    fn discard(&self, machine: &mut Machine, index: usize) {
        let Some(transport) = Self::candidate(machine, index) else {
            return;
        };

        debug!(index, kind = %transport.kind(), "aborting abandoned transport");
        transport.abort(&self.connection);
    }

    fn fallback(self: &Arc<Self>, machine: &mut Machine, index: usize, error: Error) {
        let Some(candidates) = machine.candidates.clone() else {
            self.fail(machine, error);
            return;
        };

        let Some(transport) = candidates.get(index) else {
            self.fail(machine, error);
            return;
        };

        self.connection.log(
            &format!(
                "failed to connect using transport {}: {}",
                transport.name(),
                error
            ),
            LogLevel::Information,
        );

        let kind = candidates.kind(index).unwrap_or_else(|| transport.kind());
        let error = Error::start(kind, error);
        let next = index + 1;
        if next < candidates.len() {
            debug!(index, %kind, "falling back to next transport");
            self.attempt(machine, next);
        } else {
            debug!(index, %kind, "no transports left to try");
            self.fail(machine, Error::NoTransportAvailable(Box::new(error)));
        }
    }

    fn fail(&self, machine: &mut Machine, error: Error) {
        machine.phase = Phase::Failed;
        machine.attempt = None;

        self.transport.pending.close();
        self.release();
        self.overall.fail(error);
    }

    /// Let the next call to `start` begin a new resolution.
    fn release(&self) {
        let mut active = self.transport.active.lock();
        if active
            .as_ref()
            .is_some_and(|current| std::ptr::eq(current.as_ptr(), self))
        {
            *active = None;
        }
    }
}
