//! The ordered list of transports to try.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::connection::NegotiationInfo;
use crate::transport::{ClientTransport, TransportKind};

/// Candidate transports, in the order they should be attempted.
///
/// Kinds are recorded when the list is built: a nested composite reports a
/// different kind once it has resolved.
#[derive(Clone)]
pub(crate) struct Candidates {
    transports: Arc<[Arc<dyn ClientTransport>]>,
    kinds: Arc<[TransportKind]>,
}

impl Candidates {
    /// Order the registered transports by preference, dropping full-duplex
    /// transports when negotiation forbids them.
    ///
    /// Absent negotiation info permits everything.
    pub(crate) fn build(
        registered: &[Arc<dyn ClientTransport>],
        negotiation: Option<&NegotiationInfo>,
    ) -> Self {
        let full_duplex = negotiation.map_or(true, NegotiationInfo::permits_full_duplex);

        let mut candidates: Vec<_> = registered
            .iter()
            .map(|transport| (transport.kind(), transport.clone()))
            .filter(|(kind, _)| full_duplex || *kind != TransportKind::FullDuplex)
            .collect();

        // Stable, so registration order breaks ties within a kind.
        candidates.sort_by_key(|(kind, _)| *kind);

        let (kinds, transports): (Vec<_>, Vec<_>) = candidates.into_iter().unzip();
        let candidates = Self {
            transports: transports.into(),
            kinds: kinds.into(),
        };
        debug!(candidates = ?candidates, full_duplex, "built transport candidates");
        candidates
    }

    pub(crate) fn len(&self) -> usize {
        self.transports.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Arc<dyn ClientTransport>> {
        self.transports.get(index)
    }

    /// The kind candidate `index` had when the list was built.
    pub(crate) fn kind(&self, index: usize) -> Option<TransportKind> {
        self.kinds.get(index).copied()
    }

    pub(crate) fn kinds(&self) -> Vec<TransportKind> {
        self.kinds.to_vec()
    }
}

impl fmt::Debug for Candidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::auto::AutoTransport;
    use crate::connection::{ConnectionContext, ConnectionMode};
    use crate::transport::mock::MockTransport;

    use super::*;

    fn registered(kinds: &[TransportKind]) -> Vec<Arc<dyn ClientTransport>> {
        kinds
            .iter()
            .map(|kind| Arc::new(MockTransport::succeeding(*kind)) as Arc<dyn ClientTransport>)
            .collect()
    }

    #[test]
    fn ordered_by_preference() {
        let registered = registered(&[
            TransportKind::Polling,
            TransportKind::ServerPush,
            TransportKind::FullDuplex,
        ]);

        let candidates = Candidates::build(&registered, None);
        assert_eq!(
            candidates.kinds(),
            vec![
                TransportKind::FullDuplex,
                TransportKind::ServerPush,
                TransportKind::Polling
            ]
        );
    }

    #[test]
    fn negotiation_excludes_full_duplex() {
        let registered = registered(&[
            TransportKind::FullDuplex,
            TransportKind::ServerPush,
            TransportKind::Polling,
        ]);

        let candidates = Candidates::build(&registered, Some(&NegotiationInfo::new(false)));
        assert_eq!(
            candidates.kinds(),
            vec![TransportKind::ServerPush, TransportKind::Polling]
        );

        let candidates = Candidates::build(&registered, Some(&NegotiationInfo::new(true)));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn only_full_duplex_forbidden_is_empty() {
        let registered = registered(&[TransportKind::FullDuplex]);
        let candidates = Candidates::build(&registered, Some(&NegotiationInfo::new(false)));

        assert!(candidates.is_empty());
        assert!(candidates.get(0).is_none());
    }

    #[test]
    fn kinds_recorded_at_build() {
        let nested = AutoTransport::builder()
            .with_transport(MockTransport::succeeding(TransportKind::ServerPush))
            .build();
        let registered: Vec<Arc<dyn ClientTransport>> = vec![
            Arc::new(nested.clone()),
            Arc::new(MockTransport::failing(TransportKind::FullDuplex)),
        ];

        let candidates = Candidates::build(&registered, None);
        assert_eq!(
            candidates.kinds(),
            vec![TransportKind::FullDuplex, TransportKind::Automatic]
        );

        let connection: Arc<dyn ConnectionContext> = Arc::new(NegotiationInfo::new(true));
        nested.start(&connection, ConnectionMode::Hub, Arc::new(|_: &str| {}));
        assert_eq!(nested.kind(), TransportKind::ServerPush);

        assert_eq!(candidates.kind(1), Some(TransportKind::Automatic));
        assert_eq!(
            candidates.kinds(),
            vec![TransportKind::FullDuplex, TransportKind::Automatic]
        );
    }

    #[test]
    fn debug_lists_kinds() {
        let registered = registered(&[TransportKind::ServerPush]);
        let candidates = Candidates::build(&registered, None);
        assert_eq!(format!("{candidates:?}"), "[ServerPush]");
    }
}
