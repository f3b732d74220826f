//! Autotransport
//!
//! Automatic realtime transport selection for clients.
//!
//! A realtime client can usually talk to its server over several
//! interchangeable mechanisms: a full-duplex socket, a server-push event
//! stream, or repeated-request polling. [`AutoTransport`] tries the
//! mechanisms it was given in priority order, commits permanently to the
//! first one which starts successfully, and then behaves exactly like that
//! transport.
//!
//! Every operation returns a [`CancellableFuture`], a single-assignment,
//! callback-driven future whose cancellation is forwarded to whatever inner
//! operation it is currently bound to.
//!
//! This crate does no I/O of its own. Concrete transports implement
//! [`ClientTransport`] and are handed to the [`AutoTransport`] builder.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub mod auto;
pub mod connection;
pub mod error;
pub mod future;
pub mod transport;

pub use self::auto::{AutoTransport, UnresolvedSend};
pub use self::connection::{ConnectionContext, ConnectionMode, LogLevel, NegotiationInfo};
pub use self::error::Error;
pub use self::future::{Cancel, CancellableFuture, Outcome};
pub use self::transport::{ClientTransport, DataCallback, TransportKind};

/// A boxed error which can be sent across threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) struct DebugLiteral<T: fmt::Display>(T);

impl<T: fmt::Display> fmt::Debug for DebugLiteral<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
