use bon::Builder;
use serde::Serialize;

/// Envelope carrying a finalized speech transcript to the backend.
///
/// Serialized as `{"transcibed_text": "..."}`. The field name is misspelled on the wire and
/// must stay that way for the backend to accept it.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Builder)]
pub struct TranscribedText {
    /// The transcript text
    #[serde(rename = "transcibed_text")]
    #[builder(into)]
    pub transcribed_text: String,
}

impl TranscribedText {
    #[must_use]
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            transcribed_text: text.into(),
        }
    }
}
