//! The connection a transport works on behalf of.
//!
//! A [`ConnectionContext`] is owned by the caller. Transports only borrow it to
//! read the negotiation result and to report progress through its log sink.

use std::fmt;
use std::time::Duration;

/// Severity of a message sent to a connection's log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Failures which end the connection.
    Critical,

    /// Lifecycle events, such as which transport was chosen.
    Information,

    /// Everything else.
    Verbose,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Critical => f.write_str("critical"),
            LogLevel::Information => f.write_str("information"),
            LogLevel::Verbose => f.write_str("verbose"),
        }
    }
}

/// The kind of connection a transport is started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionMode {
    /// A hub connection, which multiplexes method invocations.
    #[default]
    Hub,

    /// A persistent connection, which carries raw messages.
    Persistent,
}

/// The server's answer to connection negotiation.
///
/// Obtained before transport resolution and consulted once, when the list of
/// candidate transports is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationInfo {
    /// Identifier assigned to this connection by the server.
    pub connection_id: String,

    /// Opaque token to present on every subsequent request.
    pub connection_token: String,

    /// Protocol version the server speaks.
    pub protocol_version: String,

    /// How long the server waits before considering a silent connection dead.
    pub keep_alive_timeout: Option<Duration>,

    /// Whether the server permits full-duplex transports.
    pub try_full_duplex: bool,
}

impl NegotiationInfo {
    /// Negotiation info which only records whether full-duplex transports are permitted.
    pub fn new(try_full_duplex: bool) -> Self {
        Self {
            connection_id: String::new(),
            connection_token: String::new(),
            protocol_version: String::new(),
            keep_alive_timeout: None,
            try_full_duplex,
        }
    }

    /// Does this negotiation permit full-duplex transports?
    pub fn permits_full_duplex(&self) -> bool {
        self.try_full_duplex
    }
}

/// A connection, as seen by a transport.
pub trait ConnectionContext: Send + Sync {
    /// The negotiation result, if negotiation has happened.
    fn negotiation(&self) -> Option<NegotiationInfo>;

    /// Log sink for transport progress.
    ///
    /// The default implementation forwards to `tracing`.
    fn log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Critical => tracing::error!("{message}"),
            LogLevel::Information => tracing::info!("{message}"),
            LogLevel::Verbose => tracing::trace!("{message}"),
        }
    }
}

impl ConnectionContext for Option<NegotiationInfo> {
    fn negotiation(&self) -> Option<NegotiationInfo> {
        self.clone()
    }
}

impl ConnectionContext for NegotiationInfo {
    fn negotiation(&self) -> Option<NegotiationInfo> {
        Some(self.clone())
    }
}
