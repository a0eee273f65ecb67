use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

use crate::assistant::reply::Reply;

/// Event pushed by the assistant backend.
///
/// Every field is optional. Fields this crate does not know about are kept in `extra`, so
/// re-serializing an event yields the object that was received.
#[non_exhaustive]
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
pub struct InboundEvent {
    /// `true` when the event echoes the user's own speech back
    pub is_transcription: Option<bool>,
    /// `true` when the event carries assistant text
    pub is_text: Option<bool>,
    /// `true` on the last event of a response
    pub is_end: Option<bool>,
    /// `true` when `msg` is structured data rather than prose
    pub is_json: Option<bool>,
    /// Event payload
    pub msg: Option<Msg>,
    /// Unrecognized fields, preserved as received
    #[serde(flatten)]
    #[builder(default)]
    pub extra: Map<String, Value>,
}

impl InboundEvent {
    /// Interpret this event as part of an assistant reply.
    ///
    /// Only events explicitly marked `is_transcription: false` and `is_text: true` are
    /// replies. Among those, a final event with text wins, then structured data, then
    /// partial text.
    #[must_use]
    pub fn reply(&self) -> Reply {
        if self.is_transcription != Some(false) || self.is_text != Some(true) {
            return Reply::Ignored;
        }

        let text = self.msg.as_ref().and_then(Msg::as_text).filter(|t| !t.is_empty());

        match (self.is_end, self.is_json, text) {
            (Some(true), _, Some(text)) => Reply::Final(text.to_owned()),
            (_, Some(true), _) => Reply::Structured(
                self.msg
                    .as_ref()
                    .map_or(Value::Null, |msg| msg.clone().into_value()),
            ),
            (_, _, Some(text)) => Reply::Partial(text.to_owned()),
            _ => Reply::Ignored,
        }
    }
}

/// Payload of an [`InboundEvent`]: usually text, sometimes a list of structured items.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Msg {
    Text(String),
    Items(Vec<Value>),
    Other(Value),
}

impl Msg {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Text(text) => Value::String(text),
            Self::Items(items) => Value::Array(items),
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for Msg {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Msg {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
