//! A transport which picks the best available transport at runtime.
//!
//! [`AutoTransport`] holds a set of candidate transports. When started, it
//! tries them one at a time in order of preference (full-duplex, then
//! server-push, then polling), skipping full-duplex transports when the
//! server's negotiation response forbids them. The first transport to start
//! successfully is *resolved*: from then on, the `AutoTransport` forwards
//! every call to it, for the rest of its lifetime.
//!
//! ```ignore
//! # use std::sync::Arc;
//! # use autotransport::transport::mock::MockTransport;
//! use autotransport::{AutoTransport, ClientTransport, ConnectionContext, ConnectionMode};
//! use autotransport::{NegotiationInfo, TransportKind};
//!
//! let transport = AutoTransport::builder()
//!     .with_transport(MockTransport::failing(TransportKind::FullDuplex))
//!     .with_transport(MockTransport::succeeding(TransportKind::ServerPush))
//!     .build();
//!
//! let connection: Arc<dyn ConnectionContext> = Arc::new(NegotiationInfo::new(true));
//! let started = transport.start(&connection, ConnectionMode::Hub, Arc::new(|_: &str| {}));
//!
//! assert!(started.is_completed());
//! assert_eq!(transport.resolved_kind(), Some(TransportKind::ServerPush));
//! ```
//!
//! Before resolution, [`send`](ClientTransport::send) follows the configured
//! [`UnresolvedSend`] policy, and [`abort`](ClientTransport::abort) fails with
//! [`Error::NotConnected`].

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

mod builder;
mod candidates;
mod pending;
mod resolver;

pub use self::builder::Builder;
use self::candidates::Candidates;
use self::pending::PendingSends;
use self::resolver::Resolution;
use crate::connection::{ConnectionContext, ConnectionMode};
use crate::error::Error;
use crate::future::CancellableFuture;
use crate::transport::{ClientTransport, DataCallback, TransportKind};

/// What to do with a send made before a transport is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnresolvedSend {
    /// Fail immediately with [`Error::NotConnected`].
    #[default]
    Reject,

    /// Hold the send until a transport is resolved, then forward it.
    ///
    /// Queued sends fail with [`Error::NotConnected`] if resolution fails.
    Queue,
}

/// Configuration for an [`AutoTransport`].
#[derive(Debug, Clone)]
pub struct Config {
    /// What to do with sends made before a transport is resolved.
    pub unresolved_send: UnresolvedSend,

    /// The name reported before a transport is resolved.
    pub placeholder_name: &'static str,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unresolved_send: UnresolvedSend::default(),
            placeholder_name: "AutoTransport",
        }
    }
}

pub(crate) struct Shared {
    config: Config,
    registered: Vec<Arc<dyn ClientTransport>>,
    candidates: OnceLock<Candidates>,
    resolved: OnceLock<Arc<dyn ClientTransport>>,

    /// The resolution in flight, if any.
    active: Mutex<Option<Weak<Resolution>>>,
    pending: PendingSends,
}

impl Shared {
    /// The candidate list, built from the first connection to ask for it.
    fn candidates(&self, connection: &dyn ConnectionContext) -> Candidates {
        self.candidates
            .get_or_init(|| {
                Candidates::build(&self.registered, connection.negotiation().as_ref())
            })
            .clone()
    }
}

/// A transport which resolves into the first of its candidates to start successfully.
#[derive(Clone)]
pub struct AutoTransport {
    shared: Arc<Shared>,
}

impl fmt::Debug for AutoTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoTransport")
            .field("candidates", &self.shared.candidates.get())
            .field("resolved", &self.resolved_kind())
            .field("pending", &self.shared.pending)
            .finish()
    }
}

impl AutoTransport {
    /// Create a builder for an `AutoTransport`.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Create an `AutoTransport` from a set of transports, with the default configuration.
    pub fn new<I>(transports: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ClientTransport>>,
    {
        Self::from_parts(Config::default(), transports.into_iter().collect())
    }

    fn from_parts(config: Config, registered: Vec<Arc<dyn ClientTransport>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                registered,
                candidates: OnceLock::new(),
                resolved: OnceLock::new(),
                active: Mutex::new(None),
                pending: PendingSends::default(),
            }),
        }
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Has a transport been resolved?
    pub fn is_resolved(&self) -> bool {
        self.shared.resolved.get().is_some()
    }

    /// The kind of the resolved transport, if any.
    pub fn resolved_kind(&self) -> Option<TransportKind> {
        self.shared.resolved.get().map(|transport| transport.kind())
    }

    /// The kinds of transport which will be (or were) tried, in order.
    ///
    /// `None` until the candidate list has been built by the first call to `start`.
    pub fn candidates(&self) -> Option<Vec<TransportKind>> {
        self.shared.candidates.get().map(Candidates::kinds)
    }

    fn resolved(&self) -> Option<&Arc<dyn ClientTransport>> {
        self.shared.resolved.get()
    }
}

impl ClientTransport for AutoTransport {
    fn kind(&self) -> TransportKind {
        self.resolved_kind().unwrap_or(TransportKind::Automatic)
    }

    fn name(&self) -> &str {
        match self.resolved() {
            Some(transport) => transport.name(),
            None => self.shared.config.placeholder_name,
        }
    }

    fn supports_keep_alive(&self) -> bool {
        self.resolved()
            .is_some_and(|transport| transport.supports_keep_alive())
    }

    fn start(
        &self,
        connection: &Arc<dyn ConnectionContext>,
        mode: ConnectionMode,
        on_data: DataCallback,
    ) -> CancellableFuture<()> {
        if let Some(transport) = self.resolved() {
            trace!(kind = %transport.kind(), "starting resolved transport");
            return transport.start(connection, mode, on_data);
        }

        let (resolution, superseded) = {
            let mut active = self.shared.active.lock();
            if let Some(transport) = self.resolved() {
                drop(active);
                return transport.start(connection, mode, on_data);
            }

            // A cancelled resolution may still be working through its
            // candidates, but it no longer blocks a fresh start.
            let current = active.as_ref().and_then(Weak::upgrade);
            if current
                .as_ref()
                .is_some_and(|current| !current.is_cancelled())
            {
                return CancellableFuture::failed(Error::ResolutionInProgress);
            }

            let resolution =
                Resolution::new(self.shared.clone(), connection.clone(), mode, on_data);
            *active = Some(Arc::downgrade(&resolution));
            (resolution, current)
        };

        if let Some(previous) = superseded {
            debug!("superseding cancelled resolution");
            previous.supersede();
        }

        self.shared.pending.reopen();
        resolution.run()
    }

    fn send(
        &self,
        connection: &Arc<dyn ConnectionContext>,
        data: &str,
        on_data: DataCallback,
    ) -> CancellableFuture<()> {
        if let Some(transport) = self.resolved() {
            return transport.send(connection, data, on_data);
        }

        match self.shared.config.unresolved_send {
            UnresolvedSend::Reject => {
                trace!("send before a transport was resolved");
                CancellableFuture::failed(Error::NotConnected)
            }
            UnresolvedSend::Queue => self.shared.pending.push(connection, data, on_data),
        }
    }

    fn abort(&self, connection: &Arc<dyn ConnectionContext>) -> CancellableFuture<()> {
        match self.resolved() {
            Some(transport) => transport.abort(connection),
            None => CancellableFuture::failed(Error::NotConnected),
        }
    }
}
