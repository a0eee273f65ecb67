use std::sync::Arc;

use futures::Stream;
use futures::StreamExt as _;
use tokio::sync::watch;

use super::endpoint::Endpoint;
use super::reply::Reply;
use super::transcript::TranscriptGate;
use super::types::request::TranscribedText;
use super::types::response::InboundEvent;
use crate::Result;
use crate::ws::config::Config;
use crate::ws::transport::{Connector, TungsteniteConnector};
use crate::ws::{ConnectionManager, ConnectionState, Delivery, Incoming, JsonParser, Status};

/// Client for a virtual-assistant backend session.
///
/// Owns one self-healing WebSocket connection: it connects on creation, reconnects three
/// seconds after every failure or close, and keeps doing so until [`dispose`](Self::dispose)
/// is called or every clone is dropped.
///
/// # Examples
///
/// ```rust, no_run
/// use assistant_link::assistant::{Client, Endpoint, Reply};
/// use assistant_link::ws::config::Config;
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let endpoint = Endpoint::new("ws://localhost:8000/ws/device", "english")?;
///     let client = Client::new(endpoint, Config::default())?;
///
///     let mut replies = Box::pin(client.replies());
///     client.send_transcript("what's the weather like?")?;
///
///     while let Some(reply) = replies.next().await {
///         if let Reply::Final(text) = reply? {
///             println!("Assistant: {text}");
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Endpoint::default(), Config::default())
            .expect("Assistant client with default endpoint should succeed")
    }
}

struct ClientInner {
    /// Backend endpoint and session language
    endpoint: Endpoint,
    /// Connection manager for the WebSocket
    connection: ConnectionManager<InboundEvent>,
    /// Last transcript handed to the backend
    transcripts: TranscriptGate,
}

impl Client {
    /// Create a client and start connecting to `endpoint`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(endpoint: Endpoint, config: Config) -> Result<Self> {
        Self::with_connector(endpoint, config, TungsteniteConnector)
    }

    /// Create a client whose links are opened by `connector`.
    pub fn with_connector<C: Connector>(
        endpoint: Endpoint,
        config: Config,
        connector: C,
    ) -> Result<Self> {
        let connection = ConnectionManager::with_connector(
            endpoint.url().as_str(),
            config,
            JsonParser,
            connector,
        )?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint,
                connection,
                transcripts: TranscriptGate::new(),
            }),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Send finalized text wrapped as `{"transcibed_text": value}`.
    ///
    /// Returns [`Delivery::Dropped`] (and logs a warning) when not connected; nothing is
    /// queued for later. Identical values are sent every time.
    pub fn send_text(&self, value: &str) -> Result<Delivery> {
        self.inner.connection.send(&TranscribedText::new(value))
    }

    /// Send `transcript` unless it is empty or equal to the previously offered transcript.
    ///
    /// Returns `None` when the transcript was suppressed. A transcript counts as offered
    /// even if the connection was down at the time.
    pub fn send_transcript(&self, transcript: &str) -> Result<Option<Delivery>> {
        if !self.inner.transcripts.admit(transcript) {
            return Ok(None);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(%transcript, "Sending transcript");

        self.send_text(transcript).map(Some)
    }

    /// Forget the last offered transcript so the next one is sent even if unchanged.
    pub fn reset_transcript(&self) {
        self.inner.transcripts.reset();
    }

    /// Send a raw audio chunk as a binary frame.
    pub fn send_audio<B: Into<Vec<u8>>>(&self, chunk: B) -> Delivery {
        self.inner.connection.send_binary(chunk)
    }

    /// Stream of decoded backend events.
    ///
    /// Frames that fail to decode surface as errors without ending the stream; binary
    /// frames are skipped (see [`connection`](Self::connection) for raw access).
    pub fn events(&self) -> impl Stream<Item = Result<InboundEvent>> + use<> {
        self.inner
            .connection
            .subscribe()
            .filter_map(|incoming| async move {
                match incoming {
                    Ok(Incoming::Message(event)) => Some(Ok(event)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
    }

    /// Stream of assistant replies, skipping events that are not part of one.
    pub fn replies(&self) -> impl Stream<Item = Result<Reply>> + use<> {
        self.events().filter_map(|event| async move {
            match event.map(|event| event.reply()) {
                Ok(Reply::Ignored) => None,
                other => Some(other),
            }
        })
    }

    /// The most recently decoded backend event.
    #[must_use]
    pub fn last_event(&self) -> Option<InboundEvent> {
        self.inner.connection.last_message()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Get the current state together with the last transport error.
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.connection.status()
    }

    /// Subscribe to connection status changes.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<Status> {
        self.inner.connection.status_receiver()
    }

    /// The underlying connection, for raw frame access.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager<InboundEvent> {
        &self.inner.connection
    }

    /// Tear the session down. Idempotent.
    pub fn dispose(&self) {
        self.inner.connection.dispose();
    }

    /// Wait until the session has been torn down.
    pub async fn closed(&self) {
        self.inner.connection.closed().await;
    }
}
