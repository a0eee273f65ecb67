//! Transport capability injected into the connection manager.
//!
//! A [`Connector`] opens a [`Link`]: a sink of outbound [`Frame`]s paired with a stream of
//! inbound ones. The production implementation is [`TungsteniteConnector`]; tests substitute
//! in-memory channels.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::future;
use futures::{Sink, SinkExt as _, Stream, StreamExt as _};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::error::WsError;

/// A single WebSocket data frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame
    Text(String),
    /// Raw binary frame
    Binary(Vec<u8>),
    /// The peer started the closing handshake
    Close,
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Close => Message::Close(None),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = WsError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, WsError>> + Send>>;

/// An open, exclusively owned transport connection.
pub struct Link {
    pub(crate) sink: FrameSink,
    pub(crate) stream: FrameStream,
}

impl Link {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Frame, Error = WsError> + Send + 'static,
        St: Stream<Item = Result<Frame, WsError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens transport links to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new link to `url`, completing once the opening handshake succeeds.
    async fn connect(&self, url: &Url) -> Result<Link, WsError>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Link, WsError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(WsError::Connection)?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(WsError::Connection)
            .with(|frame: Frame| future::ready(Ok::<_, WsError>(Message::from(frame))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes.to_vec()))),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                // Control frames are answered by tungstenite itself
                Ok(_) => None,
                Err(e) => Some(Err(WsError::Connection(e))),
            })
        });

        Ok(Link::new(sink, stream))
    }
}
