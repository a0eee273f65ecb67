use std::fmt;

use url::Url;

use crate::Result;
use crate::error::Error;

/// Device endpoint of a locally running assistant backend.
pub const DEFAULT_BASE: &str = "ws://localhost:8000/ws/device";
/// Language the backend transcribes and answers in unless told otherwise.
pub const DEFAULT_LANGUAGE: &str = "english";

/// Where the assistant backend listens, and which language the session uses.
///
/// The language travels as the `language` query parameter; it is the only per-session
/// setting the backend accepts.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    language: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_LANGUAGE).expect("default endpoint should be valid")
    }
}

impl Endpoint {
    /// Create an endpoint from a `ws://` or `wss://` base URL and a language.
    pub fn new(base: &str, language: &str) -> Result<Self> {
        let base = Url::parse(base)?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported endpoint scheme `{}`, expected ws or wss",
                base.scheme()
            )));
        }
        if language.trim().is_empty() {
            return Err(Error::validation("language must not be empty"));
        }

        Ok(Self {
            base,
            language: language.trim().to_owned(),
        })
    }

    /// Same base, different language.
    pub fn with_language(self, language: &str) -> Result<Self> {
        Self::new(self.base.as_str(), language)
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// The full connection URL, with `language` replacing any value already in the base.
    #[must_use]
    pub fn url(&self) -> Url {
        let mut url = self.base.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "language")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("language", &self.language);
        url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}
