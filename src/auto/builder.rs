//! Builder for [`AutoTransport`].

use std::fmt;
use std::sync::Arc;

use super::{AutoTransport, Config, UnresolvedSend};
use crate::transport::{ClientTransport, TransportKind};

/// A builder for an [`AutoTransport`].
///
/// Transports can be registered in any order: candidates are always tried by
/// preference of their [`TransportKind`], and in registration order within a
/// kind.
pub struct Builder {
    transports: Vec<Arc<dyn ClientTransport>>,
    config: Config,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field(
                "transports",
                &self
                    .transports
                    .iter()
                    .map(|transport| transport.kind())
                    .collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Create a new, empty builder
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
            config: Config::default(),
        }
    }

    /// Register a candidate transport.
    pub fn with_transport<T>(mut self, transport: T) -> Self
    where
        T: ClientTransport,
    {
        self.transports.push(Arc::new(transport));
        self
    }

    /// Register a candidate transport which is already shared.
    pub fn with_shared_transport(mut self, transport: Arc<dyn ClientTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Register a full-duplex transport.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the transport is of a different kind.
    pub fn with_full_duplex<T>(self, transport: T) -> Self
    where
        T: ClientTransport,
    {
        debug_assert_eq!(transport.kind(), TransportKind::FullDuplex);
        self.with_transport(transport)
    }

    /// Register a server-push transport.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the transport is of a different kind.
    pub fn with_server_push<T>(self, transport: T) -> Self
    where
        T: ClientTransport,
    {
        debug_assert_eq!(transport.kind(), TransportKind::ServerPush);
        self.with_transport(transport)
    }

    /// Register a polling transport.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the transport is of a different kind.
    pub fn with_polling<T>(self, transport: T) -> Self
    where
        T: ClientTransport,
    {
        debug_assert_eq!(transport.kind(), TransportKind::Polling);
        self.with_transport(transport)
    }

    /// Set the policy for sends made before a transport is resolved.
    pub fn with_unresolved_send(mut self, policy: UnresolvedSend) -> Self {
        self.config.unresolved_send = policy;
        self
    }

    /// Set the name reported before a transport is resolved.
    pub fn with_placeholder_name(mut self, name: &'static str) -> Self {
        self.config.placeholder_name = name;
        self
    }

    /// Use the provided configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the `AutoTransport`.
    pub fn build(self) -> AutoTransport {
        AutoTransport::from_parts(self.config, self.transports)
    }
}

#[cfg(test)]
mod tests {
    use crate::transport::mock::MockTransport;

    use super::*;

    #[test]
    fn builder_collects_transports_and_config() {
        let transport = Builder::new()
            .with_polling(MockTransport::succeeding(TransportKind::Polling))
            .with_full_duplex(MockTransport::succeeding(TransportKind::FullDuplex))
            .with_server_push(MockTransport::succeeding(TransportKind::ServerPush))
            .with_unresolved_send(UnresolvedSend::Queue)
            .with_placeholder_name("auto")
            .build();

        assert_eq!(transport.config().unresolved_send, UnresolvedSend::Queue);
        assert_eq!(transport.name(), "auto");
        assert_eq!(transport.shared.registered.len(), 3);
    }

    #[test]
    fn builder_debug_lists_kinds() {
        let builder =
            Builder::new().with_transport(MockTransport::succeeding(TransportKind::ServerPush));
        assert!(format!("{builder:?}").contains("ServerPush"));
    }
}
