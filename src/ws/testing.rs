//! In-memory [`Connector`] for exercising the connection driver without sockets.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::{Sink, SinkExt as _, StreamExt as _, future, stream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use super::error::WsError;
use super::transport::{Connector, Frame, Link};

/// What the next connection attempt does.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
    Hang,
    /// Open a link whose writes and close never complete
    Stall,
}

/// Server side of an accepted fake link.
pub(crate) struct Peer {
    inbound: UnboundedSender<Result<Frame, WsError>>,
    outbound: UnboundedReceiver<Frame>,
}

impl Peer {
    pub(crate) fn send(&self, frame: Frame) {
        self.inbound
            .unbounded_send(Ok(frame))
            .expect("client side of the link should be alive");
    }

    pub(crate) fn send_text(&self, text: &str) {
        self.send(Frame::Text(text.to_owned()));
    }

    pub(crate) fn fail(&self, reason: &str) {
        self.inbound
            .unbounded_send(Err(WsError::Transport(reason.to_owned())))
            .expect("client side of the link should be alive");
    }

    pub(crate) async fn recv(&mut self) -> Option<Frame> {
        self.outbound.next().await
    }
}

/// Sink of a peer that stopped reading.
struct StalledSink;

impl Sink<Frame> for StalledSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Frame) -> Result<(), WsError> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Pending
    }
}

struct Inner {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<Instant>>,
    peers: mpsc::UnboundedSender<Peer>,
}

#[derive(Clone)]
pub(crate) struct FakeConnector {
    inner: Arc<Inner>,
}

impl FakeConnector {
    /// Every attempt is accepted unless scripted otherwise; accepted peers arrive on the receiver.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Peer>) {
        Self::scripted([])
    }

    pub(crate) fn scripted<I: IntoIterator<Item = Outcome>>(
        outcomes: I,
    ) -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(Inner {
                script: Mutex::new(outcomes.into_iter().collect()),
                attempts: Mutex::new(Vec::new()),
                peers,
            }),
        };
        (connector, peers_rx)
    }

    /// Instants at which each connection attempt started.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.inner.attempts.lock().expect("attempts lock").clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &Url) -> Result<Link, WsError> {
        self.inner
            .attempts
            .lock()
            .expect("attempts lock")
            .push(Instant::now());
        let outcome = self
            .inner
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Outcome::Accept);

        match outcome {
            Outcome::Refuse => Err(WsError::Transport("connection refused".to_owned())),
            Outcome::Hang => future::pending().await,
            Outcome::Stall => Ok(Link::new(StalledSink, stream::pending())),
            Outcome::Accept => {
                let (inbound_tx, inbound_rx) = unbounded();
                let (outbound_tx, outbound_rx) = unbounded();
                _ = self.inner.peers.send(Peer {
                    inbound: inbound_tx,
                    outbound: outbound_rx,
                });

                let sink = outbound_tx.sink_map_err(|e| WsError::Transport(e.to_string()));
                Ok(Link::new(sink, inbound_rx))
            }
        }
    }
}
