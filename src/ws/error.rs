#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Transport failure reported by a non-tungstenite [`Connector`](super::transport::Connector)
    Transport(String),
    /// WebSocket connection was closed after being open
    ConnectionClosed,
    /// Inbound frame could not be decoded and was dropped
    Decode(DecodeError),
    /// A frame was offered while the connection was not open
    NotConnected,
    /// Subscription stream lagged and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Transport(reason) => write!(f, "WebSocket transport error: {reason}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::Decode(e) => write!(f, "{e}"),
            Self::NotConnected => write!(f, "WebSocket is not connected"),
            Self::Lagged { count } => write!(f, "Subscription lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// An inbound text frame that could not be parsed.
///
/// Cloneable so it can be fanned out to every subscriber alongside decoded messages.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// The raw frame as received
    pub frame: String,
    /// Parser error message
    pub reason: String,
}

impl DecodeError {
    pub fn new<F: Into<String>, R: fmt::Display>(frame: F, reason: R) -> Self {
        Self {
            frame: frame.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to parse WebSocket message: {}", self.reason)
    }
}

impl StdError for DecodeError {}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<DecodeError> for crate::error::Error {
    fn from(e: DecodeError) -> Self {
        WsError::Decode(e).into()
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
