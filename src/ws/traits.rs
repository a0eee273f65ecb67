//! Core traits for generic WebSocket infrastructure.

use serde::de::DeserializeOwned;

use super::error::DecodeError;

/// Message parser trait for converting an inbound text frame into a message.
///
/// Invoked exactly once per received text frame. A parse failure drops the frame; the
/// connection itself is unaffected.
///
/// # Example
///
/// ```ignore
/// pub struct EventParser;
///
/// impl MessageParser<MyEvent> for EventParser {
///     fn parse(&self, frame: &str) -> Result<MyEvent, DecodeError> {
///         serde_json::from_str(frame).map_err(|e| DecodeError::new(frame, e))
///     }
/// }
/// ```
pub trait MessageParser<M: DeserializeOwned>: Send + Sync + 'static {
    /// Parse a single text frame.
    fn parse(&self, frame: &str) -> Result<M, DecodeError>;
}

/// Parses every text frame as one JSON document of type `M`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl<M: DeserializeOwned> MessageParser<M> for JsonParser {
    fn parse(&self, frame: &str) -> Result<M, DecodeError> {
        serde_json::from_str(frame).map_err(|e| DecodeError::new(frame, e))
    }
}
