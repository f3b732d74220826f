//! Realtime transports.
//!
//! A transport is one mechanism for exchanging realtime messages with a server:
//! a full-duplex socket, a server-push event stream, or repeated-request
//! polling. Transports implement [`ClientTransport`], which is deliberately
//! small: start, send, abort, and a little bit of self description.
//!
//! This crate does not provide any concrete transports. The
//! [`AutoTransport`](crate::AutoTransport) composes them.

use std::fmt;
use std::sync::Arc;

use crate::connection::{ConnectionContext, ConnectionMode};
use crate::future::CancellableFuture;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

/// Callback invoked by the active transport whenever data arrives.
pub type DataCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// The mechanism a transport uses to talk to the server.
///
/// Kinds are ordered by preference: full-duplex transports are tried first,
/// polling last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportKind {
    /// A bidirectional socket, e.g. WebSockets.
    FullDuplex,

    /// A unidirectional server-push stream, e.g. server-sent events.
    ServerPush,

    /// Repeated requests, e.g. long polling.
    Polling,

    /// A transport which picks one of the others at runtime.
    Automatic,
}

impl TransportKind {
    /// A short, stable name for this kind of transport.
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::FullDuplex => "full-duplex",
            TransportKind::ServerPush => "server-push",
            TransportKind::Polling => "polling",
            TransportKind::Automatic => "automatic",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A realtime transport, as used by a client connection.
///
/// Every operation returns a [`CancellableFuture`]. Implementations should
/// honor cancellation of the futures they return by winding down the
/// associated I/O, but cancellation is only ever a request.
pub trait ClientTransport: Send + Sync + 'static {
    /// The mechanism this transport uses.
    fn kind(&self) -> TransportKind;

    /// Human readable name of this transport.
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Does this transport keep a persistent connection which benefits from keep-alive?
    fn supports_keep_alive(&self) -> bool;

    /// Start the transport.
    ///
    /// The returned future completes once the transport is connected, and
    /// `on_data` is invoked for every message received afterwards.
    fn start(
        &self,
        connection: &Arc<dyn ConnectionContext>,
        mode: ConnectionMode,
        on_data: DataCallback,
    ) -> CancellableFuture<()>;

    /// Send a message to the server.
    fn send(
        &self,
        connection: &Arc<dyn ConnectionContext>,
        data: &str,
        on_data: DataCallback,
    ) -> CancellableFuture<()>;

    /// Abort the connection.
    fn abort(&self, connection: &Arc<dyn ConnectionContext>) -> CancellableFuture<()>;
}

impl<T> ClientTransport for Arc<T>
where
    T: ClientTransport + ?Sized,
{
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn supports_keep_alive(&self) -> bool {
        (**self).supports_keep_alive()
    }

    fn start(
        &self,
        connection: &Arc<dyn ConnectionContext>,
        mode: ConnectionMode,
        on_data: DataCallback,
    ) -> CancellableFuture<()> {
        (**self).start(connection, mode, on_data)
    }

    fn send(
        &self,
        connection: &Arc<dyn ConnectionContext>,
        data: &str,
        on_data: DataCallback,
    ) -> CancellableFuture<()> {
        (**self).send(connection, data, on_data)
    }

    fn abort(&self, connection: &Arc<dyn ConnectionContext>) -> CancellableFuture<()> {
        (**self).abort(connection)
    }
}
