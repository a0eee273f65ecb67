#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::future::BoxFuture;
use futures::{FutureExt as _, SinkExt as _, Stream, StreamExt as _};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Sleep, sleep, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::error::{DecodeError, WsError};
use super::state::{ConnectionState, Effect, Event, Machine, Status};
use super::traits::MessageParser;
use super::transport::{Connector, Frame, Link, TungsteniteConnector};
use crate::Result;
use crate::error::Error;

/// A decoded inbound frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming<M> {
    /// A text frame decoded by the connection's [`MessageParser`]
    Message(M),
    /// A binary frame, delivered as received
    Binary(Vec<u8>),
}

/// Whether an outbound frame was handed to the transport.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The connection was open and the frame was queued for transmission
    Queued,
    /// The connection was not open; the frame was discarded
    Dropped,
}

impl Delivery {
    #[must_use]
    pub const fn is_queued(self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Upper bound on the closing handshake during disposal.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type Dispatch<M> = std::result::Result<Incoming<M>, DecodeError>;

/// Outbound frame tagged with the session it was offered to.
#[derive(Debug)]
struct Outbound {
    session: u64,
    frame: Frame,
}

/// Manages WebSocket connection lifecycle and reconnection.
///
/// A background task owns the socket and a [`Machine`]; this handle only talks to it through
/// channels, so it is cheap to clone and never blocks:
/// - Establishing and maintaining a single connection
/// - Automatic reconnection after a fixed delay, indefinitely, until disposed
/// - Broadcasting decoded messages to multiple subscribers
///
/// Dropping every clone of the handle disposes the connection.
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new("ws://localhost:8000/ws/device", Config::default(), JsonParser::default())?;
///
/// let mut messages = Box::pin(connection.subscribe());
/// while let Some(message) = messages.next().await {
///     println!("Received: {:?}", message);
/// }
/// ```
pub struct ConnectionManager<M>
where
    M: DeserializeOwned + Debug + Clone + Send + Sync + 'static,
{
    /// Watch channel receiver for status changes
    status_rx: watch::Receiver<Status>,
    /// Most recently decoded message
    last_message_rx: watch::Receiver<Option<M>>,
    /// Sender channel for outgoing frames
    sender_tx: mpsc::UnboundedSender<Outbound>,
    /// Broadcast sender for incoming messages
    broadcast_tx: broadcast::Sender<Dispatch<M>>,
    /// Disposal signal shared with the driver task
    shutdown: CancellationToken,
}

impl<M> Clone for ConnectionManager<M>
where
    M: DeserializeOwned + Debug + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            status_rx: self.status_rx.clone(),
            last_message_rx: self.last_message_rx.clone(),
            sender_tx: self.sender_tx.clone(),
            broadcast_tx: self.broadcast_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<M> ConnectionManager<M>
where
    M: DeserializeOwned + Debug + Clone + Send + Sync + 'static,
{
    /// Create a new connection manager over `tokio-tungstenite` and start the connection loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<P: MessageParser<M>>(endpoint: &str, config: Config, parser: P) -> Result<Self> {
        Self::with_connector(endpoint, config, parser, TungsteniteConnector)
    }

    /// Create a new connection manager that opens links through `connector`.
    pub fn with_connector<P, C>(
        endpoint: &str,
        config: Config,
        parser: P,
        connector: C,
    ) -> Result<Self>
    where
        P: MessageParser<M>,
        C: Connector,
    {
        let url = Url::parse(endpoint)?;
        if config.broadcast_capacity == 0 {
            return Err(Error::validation("broadcast capacity must be positive"));
        }

        let machine = Machine::new(config.reconnect.clone());
        let (sender_tx, outbound_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity);
        let (status_tx, status_rx) = watch::channel(machine.status());
        let (last_message_tx, last_message_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();

        let driver = Driver {
            url,
            connector: Arc::new(connector),
            parser,
            machine,
            status_tx,
            last_message_tx,
            broadcast_tx: broadcast_tx.clone(),
            outbound_rx,
            shutdown: shutdown.clone(),
            link: None,
            connecting: None,
            retry: None,
        };
        tokio::spawn(driver.run());

        Ok(Self {
            status_rx,
            last_message_rx,
            sender_tx,
            broadcast_tx,
            shutdown,
        })
    }

    /// Send a raw text frame.
    ///
    /// Dropped with a warning unless the connection is currently open; frames are never
    /// buffered for a later connection.
    pub fn send_text<S: Into<String>>(&self, text: S) -> Delivery {
        self.offer(Frame::Text(text.into()))
    }

    /// Send `request` serialized as a JSON text frame.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<Delivery> {
        let json = serde_json::to_string(request)?;
        Ok(self.offer(Frame::Text(json)))
    }

    /// Send a raw binary frame.
    pub fn send_binary<B: Into<Vec<u8>>>(&self, bytes: B) -> Delivery {
        self.offer(Frame::Binary(bytes.into()))
    }

    fn offer(&self, frame: Frame) -> Delivery {
        let state = self.state();
        let ConnectionState::Connected { session, .. } = state else {
            return Self::dropped(state);
        };

        // The driver is gone even though the last published state is still open
        if self.sender_tx.send(Outbound { session, frame }).is_err() {
            return Self::dropped(state);
        }
        Delivery::Queued
    }

    fn dropped(state: ConnectionState) -> Delivery {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            ?state,
            error = %WsError::NotConnected,
            "Dropping outbound frame"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = &state;
        Delivery::Dropped
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    /// Get the current state together with the last transport error.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    /// The most recently decoded message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<M> {
        self.last_message_rx.borrow().clone()
    }

    /// Subscribe to incoming messages.
    ///
    /// Each call returns a new independent stream yielding one item per inbound frame.
    /// Frames that fail to decode are yielded as [`WsError::Decode`] errors and the stream
    /// continues; a subscriber that falls behind receives a [`WsError::Lagged`] error.
    /// The stream ends once the connection is disposed, after yielding anything already
    /// received, even while other handles are still alive.
    pub fn subscribe(&self) -> impl Stream<Item = Result<Incoming<M>>> + use<M> {
        let mut rx = self.broadcast_tx.subscribe();
        let shutdown = self.shutdown.clone();

        stream! {
            loop {
                let received = tokio::select! {
                    biased;

                    received = rx.recv() => received,
                    () = shutdown.cancelled() => break,
                };

                match received {
                    Ok(Ok(message)) => yield Ok(message),
                    Ok(Err(e)) => yield Err(Error::from(e)),
                    Err(RecvError::Lagged(count)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Subscription lagged, missed {count} messages");
                        yield Err(Error::from(WsError::Lagged { count }));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Tear the connection down.
    ///
    /// Cancels any pending reconnection, abandons an in-flight connect and closes an open
    /// socket. Idempotent; use [`closed`](Self::closed) to wait for completion.
    pub fn dispose(&self) {
        self.shutdown.cancel();
    }

    /// Wait until the connection has been disposed.
    pub async fn closed(&self) {
        let mut status_rx = self.status_rx.clone();
        _ = status_rx.wait_for(|status| status.state.is_terminal()).await;
    }
}

/// Background task owning the socket and the state machine.
struct Driver<M, P, C> {
    url: Url,
    connector: Arc<C>,
    parser: P,
    machine: Machine,
    status_tx: watch::Sender<Status>,
    last_message_tx: watch::Sender<Option<M>>,
    broadcast_tx: broadcast::Sender<Dispatch<M>>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    shutdown: CancellationToken,
    link: Option<Link>,
    connecting: Option<BoxFuture<'static, std::result::Result<Link, WsError>>>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl<M, P, C> Driver<M, P, C>
where
    M: DeserializeOwned + Debug + Clone + Send + Sync + 'static,
    P: MessageParser<M>,
    C: Connector,
{
    /// Main connection loop with automatic reconnection.
    async fn run(mut self) {
        self.step(Event::Start).await;

        while !self.machine.state().is_terminal() {
            let event = tokio::select! {
                biased;

                () = self.shutdown.cancelled() => Event::Dispose,

                result = connecting(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(link) => {
                            self.link = Some(link);
                            Event::Opened
                        }
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(url = %self.url, error = %e, "Unable to connect");
                            Event::Errored(Arc::new(e))
                        }
                    }
                }

                () = elapsed(&mut self.retry) => {
                    self.retry = None;
                    Event::RetryElapsed
                }

                frame = next_frame(&mut self.link) => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        self.dispatch_text(&text);
                        continue;
                    }
                    Some(Ok(Frame::Binary(bytes))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(len = bytes.len(), "Received WebSocket binary message");
                        _ = self.broadcast_tx.send(Ok(Incoming::Binary(bytes)));
                        continue;
                    }
                    Some(Ok(Frame::Close)) | None => {
                        self.link = None;
                        self.step(Event::Errored(Arc::new(WsError::ConnectionClosed))).await;
                        Event::Closed
                    }
                    Some(Err(e)) => {
                        self.link = None;
                        self.step(Event::Errored(Arc::new(e))).await;
                        Event::Closed
                    }
                },

                outbound = self.outbound_rx.recv() => match outbound {
                    Some(outbound) => {
                        self.transmit(outbound).await;
                        continue;
                    }
                    // Every handle is gone
                    None => Event::Dispose,
                },
            };

            self.step(event).await;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.url, "WebSocket connection disposed");
    }

    async fn step(&mut self, event: Event) {
        #[cfg(feature = "tracing")]
        tracing::trace!(?event, state = ?self.machine.state(), "Handling connection event");

        let effects = self.machine.handle(event);
        self.apply(effects).await;
        self.publish();
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Open => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(url = %self.url, "Connecting to WebSocket");
                    let connector = Arc::clone(&self.connector);
                    let url = self.url.clone();
                    self.connecting = Some(async move { connector.connect(&url).await }.boxed());
                }
                Effect::ScheduleRetry(delay) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(?delay, "WebSocket disconnected, scheduling reconnect");
                    self.retry = Some(Box::pin(sleep(delay)));
                }
                Effect::CancelRetry => self.retry = None,
                Effect::CloseTransport => {
                    self.connecting = None;
                    if let Some(mut link) = self.link.take() {
                        // A peer that stopped reading must not hold up disposal
                        let closed = timeout(CLOSE_TIMEOUT, link.sink.close()).await;
                        #[cfg(feature = "tracing")]
                        match &closed {
                            Ok(Err(e)) => tracing::debug!(error = %e, "Error closing WebSocket"),
                            Err(_) => tracing::debug!(
                                ?CLOSE_TIMEOUT,
                                "WebSocket close did not complete, dropping socket"
                            ),
                            Ok(Ok(())) => {}
                        }
                        #[cfg(not(feature = "tracing"))]
                        let _ = &closed;
                    }
                }
            }
        }
    }

    fn publish(&self) {
        let next = self.machine.status();
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                #[cfg(feature = "tracing")]
                tracing::debug!(state = ?next.state, "WebSocket state changed");
                *current = next;
                true
            }
        });
    }

    fn dispatch_text(&self, text: &str) {
        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received WebSocket text message");

        match self.parser.parse(text) {
            Ok(message) => {
                self.last_message_tx.send_replace(Some(message.clone()));
                _ = self.broadcast_tx.send(Ok(Incoming::Message(message)));
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %e, "Failed to parse WebSocket message");
                _ = self.broadcast_tx.send(Err(e));
            }
        }
    }

    async fn transmit(&mut self, outbound: Outbound) {
        let ConnectionState::Connected { session, .. } = self.machine.state() else {
            #[cfg(feature = "tracing")]
            tracing::debug!("Dropping frame queued before disconnect");
            return;
        };
        if outbound.session != session {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                queued = outbound.session,
                current = session,
                "Dropping frame queued for a previous connection"
            );
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let sent = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Abandoning outbound frame, connection disposed");
                return;
            }
            sent = link.sink.send(outbound.frame) => sent,
        };
        if let Err(e) = sent {
            self.link = None;
            self.step(Event::Errored(Arc::new(e))).await;
            self.step(Event::Closed).await;
        }
    }
}

async fn connecting(
    pending: &mut Option<BoxFuture<'static, std::result::Result<Link, WsError>>>,
) -> std::result::Result<Link, WsError> {
    match pending {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(link: &mut Option<Link>) -> Option<std::result::Result<Frame, WsError>> {
    match link {
        Some(link) => link.stream.next().await,
        None => std::future::pending().await,
    }
}
