//! A scriptable transport, suitable for testing transport-dependent code.
//!
//! [`MockTransport`] records every call made to it, and can be told to start
//! successfully, fail to start, or leave its start future pending so that the
//! test decides when (and how) the attempt settles.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::{ClientTransport, DataCallback, TransportKind};
use crate::connection::{ConnectionContext, ConnectionMode};
use crate::error::Error;
use crate::future::CancellableFuture;

/// The error a failing mock transport reports when it is started.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0} mock transport refused to start")]
pub struct MockTransportError(pub TransportKind);

/// How a [`MockTransport`] responds to `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStart {
    /// Start completes immediately.
    Succeed,

    /// Start fails immediately with a [`MockTransportError`].
    Fail,

    /// Start stays pending until settled through [`MockTransport::attempts`].
    Pending,
}

/// A call received by a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `start` was called.
    Start(ConnectionMode),

    /// `send` was called with this payload.
    Send(String),

    /// `abort` was called.
    Abort,
}

/// A shared record of calls across several mock transports, in the order
/// they were received.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<(TransportKind, MockCall)>>>);

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<(TransportKind, MockCall)> {
        self.0.lock().clone()
    }

    /// The kinds of transport started, in order.
    pub fn starts(&self) -> Vec<TransportKind> {
        self.0
            .lock()
            .iter()
            .filter(|(_, call)| matches!(call, MockCall::Start(_)))
            .map(|(kind, _)| *kind)
            .collect()
    }

    fn record(&self, kind: TransportKind, call: MockCall) {
        self.0.lock().push((kind, call));
    }
}

struct MockState {
    start: Mutex<MockStart>,
    keep_alive: AtomicBool,
    calls: Mutex<Vec<MockCall>>,
    attempts: Mutex<Vec<CancellableFuture<()>>>,
    on_data: Mutex<Option<DataCallback>>,
    journal: Mutex<Option<Journal>>,
}

/// A transport which does no I/O, and does what it is told.
#[derive(Clone)]
pub struct MockTransport {
    kind: TransportKind,
    state: Arc<MockState>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("kind", &self.kind)
            .field("start", &*self.state.start.lock())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Create a new mock transport with the given start behavior.
    pub fn new(kind: TransportKind, start: MockStart) -> Self {
        Self {
            kind,
            state: Arc::new(MockState {
                start: Mutex::new(start),
                keep_alive: AtomicBool::new(matches!(kind, TransportKind::FullDuplex)),
                calls: Mutex::new(Vec::new()),
                attempts: Mutex::new(Vec::new()),
                on_data: Mutex::new(None),
                journal: Mutex::new(None),
            }),
        }
    }

    /// Transport which starts successfully.
    pub fn succeeding(kind: TransportKind) -> Self {
        Self::new(kind, MockStart::Succeed)
    }

    /// Transport which fails to start.
    pub fn failing(kind: TransportKind) -> Self {
        Self::new(kind, MockStart::Fail)
    }

    /// Transport whose start attempts stay pending.
    pub fn pending(kind: TransportKind) -> Self {
        Self::new(kind, MockStart::Pending)
    }

    /// Record calls to this transport in a shared journal as well.
    pub fn with_journal(self, journal: &Journal) -> Self {
        *self.state.journal.lock() = Some(journal.clone());
        self
    }

    /// Set whether this transport claims keep-alive support.
    pub fn with_keep_alive(self, keep_alive: bool) -> Self {
        self.state.keep_alive.store(keep_alive, Ordering::SeqCst);
        self
    }

    /// Change how subsequent start attempts behave.
    pub fn set_start(&self, start: MockStart) {
        *self.state.start.lock() = start;
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().clone()
    }

    /// Number of times `start` was called.
    pub fn starts(&self) -> usize {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|call| matches!(call, MockCall::Start(_)))
            .count()
    }

    /// The futures returned by `start`, in order.
    pub fn attempts(&self) -> Vec<CancellableFuture<()>> {
        self.state.attempts.lock().clone()
    }

    /// The most recent future returned by `start`.
    pub fn last_attempt(&self) -> Option<CancellableFuture<()>> {
        self.state.attempts.lock().last().cloned()
    }

    /// Deliver a message as if it arrived from the server.
    ///
    /// Returns `false` if the transport was never started.
    pub fn receive(&self, message: &str) -> bool {
        let on_data = self.state.on_data.lock().clone();
        match on_data {
            Some(on_data) => {
                on_data(message);
                true
            }
            None => false,
        }
    }

    fn record(&self, call: MockCall) {
        if let Some(journal) = self.state.journal.lock().as_ref() {
            journal.record(self.kind, call.clone());
        }
        self.state.calls.lock().push(call);
    }
}

impl ClientTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn supports_keep_alive(&self) -> bool {
        self.state.keep_alive.load(Ordering::SeqCst)
    }

    fn start(
        &self,
        _connection: &Arc<dyn ConnectionContext>,
        mode: ConnectionMode,
        on_data: DataCallback,
    ) -> CancellableFuture<()> {
        self.record(MockCall::Start(mode));
        *self.state.on_data.lock() = Some(on_data);

        let attempt = CancellableFuture::new();
        self.state.attempts.lock().push(attempt.clone());

        let start = *self.state.start.lock();
        match start {
            MockStart::Succeed => {
                attempt.complete(());
            }
            MockStart::Fail => {
                attempt.fail(Error::transport(MockTransportError(self.kind)));
            }
            MockStart::Pending => {}
        }

        attempt
    }

    fn send(
        &self,
        _connection: &Arc<dyn ConnectionContext>,
        data: &str,
        _on_data: DataCallback,
    ) -> CancellableFuture<()> {
        self.record(MockCall::Send(data.to_owned()));
        CancellableFuture::completed(())
    }

    fn abort(&self, _connection: &Arc<dyn ConnectionContext>) -> CancellableFuture<()> {
        self.record(MockCall::Abort);
        CancellableFuture::completed(())
    }
}
