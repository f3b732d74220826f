//! Errors surfaced through transport futures.
//!
//! Every failure in this crate travels through the error channel of a
//! [`CancellableFuture`](crate::future::CancellableFuture). Errors are
//! cloneable so that each registered callback can observe the same value.

use std::sync::Arc;

use thiserror::Error;

use crate::transport::TransportKind;
use crate::BoxError;

/// A shared, cloneable error raised by a concrete transport.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Transport error type.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Error raised by a concrete transport implementation.
    #[error("transport: {0}")]
    Transport(#[source] SharedError),

    /// A single candidate failed to start. Resolution falls back to the next candidate.
    #[error("{kind} transport failed to start")]
    Start {
        /// The kind of transport which failed.
        kind: TransportKind,

        /// The error reported by the attempt.
        #[source]
        source: Box<Error>,
    },

    /// Every candidate transport failed to start.
    ///
    /// The source is the error reported by the last candidate.
    #[error("no transport available")]
    NoTransportAvailable(#[source] Box<Error>),

    /// There were no candidate transports to try.
    #[error("no candidate transports")]
    NoCandidates,

    /// An attempt reported an error after a transport was already resolved.
    #[error("stale transport attempt")]
    Stale(#[source] Box<Error>),

    /// The operation requires a resolved transport.
    #[error("not connected")]
    NotConnected,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A transport is already being resolved for this connection.
    #[error("transport resolution already in progress")]
    ResolutionInProgress,
}

impl Error {
    /// Wrap an arbitrary transport error.
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Transport(Arc::from(error.into()))
    }

    /// Wrap an attempt error as the start failure of a candidate.
    pub(crate) fn start(kind: TransportKind, source: Error) -> Self {
        Error::Start {
            kind,
            source: Box::new(source),
        }
    }

    /// Is this the error produced by cancellation?
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Follow start failure, exhaustion and stale wrappers down to the error
    /// the transport originally reported.
    pub fn root(&self) -> &Error {
        match self {
            Error::Start { source, .. }
            | Error::NoTransportAvailable(source)
            | Error::Stale(source) => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: std::error::Error, Clone, Send, Sync, Into<BoxError>);

    #[test]
    fn root_unwraps_nested_errors() {
        let error = Error::NoTransportAvailable(Box::new(Error::start(
            TransportKind::Polling,
            Error::transport("refused"),
        )));

        assert!(matches!(error.root(), Error::Transport(_)));
        assert_eq!(error.root().to_string(), "transport: refused");
    }

    #[test]
    fn start_error_display() {
        let error = Error::start(TransportKind::FullDuplex, Error::Cancelled);
        assert_eq!(error.to_string(), "full-duplex transport failed to start");
        assert!(error.root().is_cancelled());
    }
}
