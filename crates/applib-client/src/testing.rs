//! In-memory transport for unit tests.

use crate::connection::{Connector, TransportError, TransportLink};
use futures_util::future::{self, BoxFuture};
use futures_util::{sink, stream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub(crate) struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands the far end of every accepted connection to the test.
pub(crate) struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    attempts: Counter,
    refusals: Arc<AtomicUsize>,
}

impl MockConnector {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            attempts: Counter::default(),
            refusals: Arc::new(AtomicUsize::new(0)),
        };
        (connector, rx)
    }

    pub(crate) fn attempts(&self) -> Counter {
        self.attempts.clone()
    }

    pub(crate) fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }
}

impl Connector for MockConnector {
    fn connect(&mut self) -> BoxFuture<'static, Result<TransportLink, TransportError>> {
        self.attempts.bump();
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Box::pin(future::ready(Err(TransportError::Closed)));
        }

        let (to_peer, from_client) = mpsc::unbounded_channel::<String>();
        let (to_client, from_peer) = mpsc::unbounded_channel::<String>();
        let _ = self.peers.send(MockPeer {
            from_client,
            to_client,
        });

        let sink = sink::unfold(to_peer, |tx, text: String| async move {
            tx.send(text).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        });
        let stream = stream::unfold(from_peer, |mut rx| async move {
            rx.recv().await.map(|text| (Ok(text), rx))
        });

        Box::pin(future::ready(Ok(TransportLink {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })))
    }
}

/// Server side of a mock connection. Dropping it closes the connection.
pub(crate) struct MockPeer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl MockPeer {
    pub(crate) async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub(crate) fn push(&self, text: &str) {
        let _ = self.to_client.send(text.to_string());
    }
}
