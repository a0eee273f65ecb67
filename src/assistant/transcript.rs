use std::sync::{Mutex, PoisonError};

/// Suppresses repeated sends of an unchanged transcript.
///
/// Speech recognition re-reports the same finalized transcript on every update; only a
/// non-empty transcript that differs from the last admitted one gets through. The
/// connection manager itself never de-duplicates.
#[derive(Debug, Default)]
pub struct TranscriptGate {
    last: Mutex<Option<String>>,
}

impl TranscriptGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and remembers `transcript` if it should be sent.
    pub fn admit(&self, transcript: &str) -> bool {
        if transcript.is_empty() {
            return false;
        }

        // We can recover from poisoned lock because Option<String> has no inconsistent intermediate state.
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(transcript) {
            return false;
        }
        *last = Some(transcript.to_owned());
        true
    }

    /// Forget the last admitted transcript, e.g. when a new listening session starts.
    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
