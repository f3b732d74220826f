use std::sync::{Arc, OnceLock};

use autotransport::transport::mock::{MockCall, MockStart, MockTransport};
use autotransport::{
    AutoTransport, ClientTransport, ConnectionContext, ConnectionMode, DataCallback, Error,
    LogLevel, NegotiationInfo, Outcome, TransportKind, UnresolvedSend,
};

/// Sends a message through the transport as soon as it reports resolution.
#[derive(Default)]
struct SendOnResolve {
    transport: OnceLock<AutoTransport>,
}

impl ConnectionContext for SendOnResolve {
    fn negotiation(&self) -> Option<NegotiationInfo> {
        None
    }

    fn log(&self, message: &str, _level: LogLevel) {
        if !message.starts_with("transport resolved") {
            return;
        }

        if let Some(transport) = self.transport.get() {
            transport.send(&connection(), "late", ignore());
        }
    }
}

fn connection() -> Arc<dyn ConnectionContext> {
    Arc::new(NegotiationInfo::new(true))
}

fn ignore() -> DataCallback {
    Arc::new(|_: &str| {})
}

fn not_connected<T: Clone + Send + 'static>(future: &autotransport::CancellableFuture<T>) -> bool {
    matches!(future.outcome(), Outcome::Failed(Error::NotConnected))
}

#[test]
fn placeholder_identity_before_resolution() {
    let _ = tracing_subscriber::fmt::try_init();

    let full_duplex = MockTransport::pending(TransportKind::FullDuplex);
    let transport = AutoTransport::builder()
        .with_full_duplex(full_duplex.clone())
        .build();

    assert_eq!(transport.kind(), TransportKind::Automatic);
    assert_eq!(transport.name(), "AutoTransport");
    assert!(!transport.supports_keep_alive());

    assert!(not_connected(&transport.abort(&connection())));
    assert!(not_connected(&transport.send(&connection(), "early", ignore())));
    assert!(full_duplex.calls().is_empty());

    // Still a placeholder while resolution is in flight.
    let started = transport.start(&connection(), ConnectionMode::Hub, ignore());
    assert!(!started.is_done());
    assert_eq!(transport.name(), "AutoTransport");
    assert!(!transport.supports_keep_alive());
}

#[test]
fn identity_follows_resolved_transport() {
    let transport = AutoTransport::builder()
        .with_full_duplex(MockTransport::succeeding(TransportKind::FullDuplex))
        .build();
    transport.start(&connection(), ConnectionMode::Hub, ignore());

    assert_eq!(transport.kind(), TransportKind::FullDuplex);
    assert_eq!(transport.name(), "full-duplex");
    assert!(transport.supports_keep_alive());

    let transport = AutoTransport::builder()
        .with_full_duplex(MockTransport::failing(TransportKind::FullDuplex))
        .with_polling(MockTransport::succeeding(TransportKind::Polling))
        .build();
    transport.start(&connection(), ConnectionMode::Hub, ignore());

    assert_eq!(transport.name(), "polling");
    assert!(!transport.supports_keep_alive());
}

#[test]
fn calls_after_resolution_reach_resolved_transport() {
    let server_push = MockTransport::succeeding(TransportKind::ServerPush);
    let transport = AutoTransport::builder()
        .with_full_duplex(MockTransport::failing(TransportKind::FullDuplex))
        .with_server_push(server_push.clone())
        .build();

    transport.start(&connection(), ConnectionMode::Persistent, ignore());
    assert!(transport.send(&connection(), "hello", ignore()).is_completed());
    assert!(transport.abort(&connection()).is_completed());

    assert_eq!(
        server_push.calls(),
        vec![
            MockCall::Start(ConnectionMode::Persistent),
            MockCall::Send("hello".into()),
            MockCall::Abort
        ]
    );
}

#[test]
fn queued_sends_flush_in_order_on_resolution() {
    let polling = MockTransport::pending(TransportKind::Polling);
    let transport = AutoTransport::builder()
        .with_polling(polling.clone())
        .with_unresolved_send(UnresolvedSend::Queue)
        .build();

    let started = transport.start(&connection(), ConnectionMode::Hub, ignore());
    let first = transport.send(&connection(), "first", ignore());
    let second = transport.send(&connection(), "second", ignore());
    assert!(!first.is_done());

    polling.last_attempt().unwrap().complete(());

    assert!(started.is_completed());
    assert!(first.is_completed());
    assert!(second.is_completed());
    assert_eq!(
        polling.calls(),
        vec![
            MockCall::Start(ConnectionMode::Hub),
            MockCall::Send("first".into()),
            MockCall::Send("second".into())
        ]
    );
}

#[test]
fn send_during_resolution_follows_queued_sends() {
    let polling = MockTransport::pending(TransportKind::Polling);
    let transport = AutoTransport::builder()
        .with_polling(polling.clone())
        .with_unresolved_send(UnresolvedSend::Queue)
        .build();

    let hooked = Arc::new(SendOnResolve::default());
    assert!(hooked.transport.set(transport.clone()).is_ok());
    let connection: Arc<dyn ConnectionContext> = hooked.clone();

    transport.start(&connection, ConnectionMode::Hub, ignore());
    let early = transport.send(&connection, "early", ignore());

    polling.last_attempt().unwrap().complete(());

    assert!(early.is_completed());
    assert_eq!(
        polling.calls(),
        vec![
            MockCall::Start(ConnectionMode::Hub),
            MockCall::Send("early".into()),
            MockCall::Send("late".into())
        ]
    );
}

#[test]
fn failed_resolution_can_be_retried() {
    let polling = MockTransport::failing(TransportKind::Polling);
    let transport = AutoTransport::builder()
        .with_polling(polling.clone())
        .with_unresolved_send(UnresolvedSend::Queue)
        .build();

    let started = transport.start(&connection(), ConnectionMode::Hub, ignore());
    assert!(matches!(
        started.outcome(),
        Outcome::Failed(Error::NoTransportAvailable(_))
    ));
    assert!(not_connected(&transport.send(&connection(), "lost", ignore())));

    polling.set_start(MockStart::Succeed);
    let restarted = transport.start(&connection(), ConnectionMode::Hub, ignore());

    assert!(restarted.is_completed());
    assert_eq!(transport.resolved_kind(), Some(TransportKind::Polling));
    assert_eq!(polling.starts(), 2);
}

#[test]
fn concurrent_queued_sends_are_each_delivered_once() {
    let polling = MockTransport::pending(TransportKind::Polling);
    let transport = AutoTransport::builder()
        .with_polling(polling.clone())
        .with_unresolved_send(UnresolvedSend::Queue)
        .build();
    transport.start(&connection(), ConnectionMode::Hub, ignore());
    let attempt = polling.last_attempt().unwrap();

    let sends = std::thread::scope(|scope| {
        let senders: Vec<_> = (0..4)
            .map(|thread| {
                let transport = &transport;
                scope.spawn(move || {
                    (0..25)
                        .map(|n| transport.send(&connection(), &format!("{thread}:{n}"), ignore()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        attempt.complete(());

        senders
            .into_iter()
            .flat_map(|sender| sender.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert!(sends.iter().all(|send| send.is_completed()));

    let delivered: Vec<(usize, usize)> = polling
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            MockCall::Send(data) => {
                let (thread, n) = data.split_once(':')?;
                Some((thread.parse::<usize>().ok()?, n.parse::<usize>().ok()?))
            }
            _ => None,
        })
        .collect();
    assert_eq!(delivered.len(), 100);

    // Each thread's sends arrive in the order that thread made them.
    for thread in 0..4 {
        let sequence: Vec<usize> = delivered
            .iter()
            .filter(|(sender, _)| *sender == thread)
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(sequence, (0..25).collect::<Vec<_>>(), "thread {thread}");
    }
}

#[test]
fn composite_nests_inside_composite() {
    let server_push = MockTransport::succeeding(TransportKind::ServerPush);
    let inner = AutoTransport::builder()
        .with_server_push(server_push.clone())
        .build();

    let outer = AutoTransport::builder()
        .with_full_duplex(MockTransport::failing(TransportKind::FullDuplex))
        .with_transport(inner.clone())
        .build();

    let started = outer.start(&connection(), ConnectionMode::Hub, ignore());

    assert!(started.is_completed());
    assert!(inner.is_resolved());
    assert_eq!(outer.kind(), TransportKind::ServerPush);
    assert_eq!(outer.name(), "server-push");

    outer.send(&connection(), "through", ignore());
    assert_eq!(
        server_push.calls().last(),
        Some(&MockCall::Send("through".into()))
    );
}
