//! Sends made before a transport is resolved, held until there is somewhere to send them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::connection::ConnectionContext;
use crate::error::Error;
use crate::future::CancellableFuture;
use crate::transport::{ClientTransport, DataCallback};

struct QueuedSend {
    connection: Arc<dyn ConnectionContext>,
    data: String,
    on_data: DataCallback,
    future: CancellableFuture<()>,
}

impl QueuedSend {
    fn forward(self, transport: &dyn ClientTransport) {
        if self.future.is_cancelled() {
            trace!("dropping cancelled queued send");
            return;
        }

        let sent = transport.send(&self.connection, &self.data, self.on_data);
        bind(&self.future, sent);
    }
}

/// Settle `outer` from `inner`, and forward cancellation of `outer` to `inner`.
pub(crate) fn bind(outer: &CancellableFuture<()>, inner: CancellableFuture<()>) {
    outer.attach_inner(inner.clone());

    let completed = outer.clone();
    let failed = outer.clone();
    let cancelled = outer.clone();
    inner
        .on_completion(move |_| {
            completed.complete(());
        })
        .on_error(move |error| {
            failed.fail(error.clone());
        })
        .on_cancelled(move || {
            cancelled.cancel();
        });
}

enum Queue {
    /// Waiting for a transport.
    Open(VecDeque<QueuedSend>),

    /// A transport was resolved, and everything queued has been handed to it.
    Flushed(Arc<dyn ClientTransport>),

    /// Resolution failed. Sends are rejected until resolution starts again.
    Closed,
}

/// Sends queued while a transport is being resolved.
pub(crate) struct PendingSends {
    queue: Mutex<Queue>,
}

impl fmt::Debug for PendingSends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.queue.lock() {
            Queue::Open(queue) => format!("open({})", queue.len()),
            Queue::Flushed(transport) => format!("flushed({})", transport.kind()),
            Queue::Closed => "closed".to_owned(),
        };
        f.debug_tuple("PendingSends")
            .field(&crate::DebugLiteral(state))
            .finish()
    }
}

impl Default for PendingSends {
    fn default() -> Self {
        Self {
            queue: Mutex::new(Queue::Open(VecDeque::new())),
        }
    }
}

impl PendingSends {
    /// Queue a send, or hand it straight to the transport if one was resolved
    /// since the caller last looked.
    pub(crate) fn push(
        &self,
        connection: &Arc<dyn ConnectionContext>,
        data: &str,
        on_data: DataCallback,
    ) -> CancellableFuture<()> {
        let mut queue = self.queue.lock();
        match &mut *queue {
            Queue::Open(sends) => {
                let future = CancellableFuture::new();
                sends.push_back(QueuedSend {
                    connection: connection.clone(),
                    data: data.to_owned(),
                    on_data,
                    future: future.clone(),
                });
                trace!(queued = sends.len(), "queued send until a transport is resolved");
                future
            }
            Queue::Flushed(transport) => {
                let transport = transport.clone();
                drop(queue);
                transport.send(connection, data, on_data)
            }
            Queue::Closed => CancellableFuture::failed(Error::NotConnected),
        }
    }

    /// Accept sends again after a failed resolution.
    pub(crate) fn reopen(&self) {
        let mut queue = self.queue.lock();
        if matches!(*queue, Queue::Closed) {
            *queue = Queue::Open(VecDeque::new());
        }
    }

    /// Forward every queued send to the resolved transport, in the order they
    /// were queued.
    ///
    /// Sends pushed while the flush is running are queued behind the others
    /// and forwarded by this flush. Once the queue is empty, later sends go
    /// straight to the transport.
    pub(crate) fn flush(&self, transport: &Arc<dyn ClientTransport>) {
        let mut forwarded = 0usize;
        loop {
            let send = {
                let mut queue = self.queue.lock();
                let next = match &mut *queue {
                    Queue::Open(sends) => sends.pop_front(),
                    Queue::Flushed(_) | Queue::Closed => None,
                };

                match next {
                    Some(send) => send,
                    None => {
                        *queue = Queue::Flushed(transport.clone());
                        break;
                    }
                }
            };

            forwarded += 1;
            send.forward(transport.as_ref());
        }

        if forwarded > 0 {
            debug!(count = forwarded, kind = %transport.kind(), "flushed queued sends");
        }
    }

    /// Fail every queued send, and reject new ones.
    pub(crate) fn close(&self) {
        let closed = std::mem::replace(&mut *self.queue.lock(), Queue::Closed);
        let sends = match closed {
            Queue::Open(sends) => sends,
            Queue::Flushed(_) | Queue::Closed => VecDeque::new(),
        };

        for send in sends {
            send.future.fail(Error::NotConnected);
        }
    }
}
