use serde_json::Value;

/// How an inbound event contributes to the assistant's reply.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The complete reply text; replaces anything accumulated so far
    Final(String),
    /// A fragment of a reply that is still streaming
    Partial(String),
    /// Structured data to present alongside the reply (e.g. product cards)
    Structured(Value),
    /// Not part of a reply
    Ignored,
}

/// Accumulates streamed reply fragments into the text shown to the user.
#[derive(Debug, Clone, Default)]
pub struct ReplyBuffer {
    text: String,
    complete: bool,
}

impl ReplyBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `reply` into the buffer. Returns `true` if the visible text changed.
    ///
    /// Partial fragments are joined with a single space. A final reply replaces the text and
    /// closes the reply; the next fragment starts a new one.
    pub fn apply(&mut self, reply: &Reply) -> bool {
        match reply {
            Reply::Final(text) => {
                let changed = self.text != *text;
                text.clone_into(&mut self.text);
                self.complete = true;
                changed
            }
            Reply::Partial(fragment) => {
                if self.complete {
                    self.text.clear();
                    self.complete = false;
                }
                if !self.text.is_empty() {
                    self.text.push(' ');
                }
                self.text.push_str(fragment);
                true
            }
            Reply::Structured(_) | Reply::Ignored => false,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the last applied reply was final.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.complete = false;
    }
}
