use serde::Serialize;

use crate::capture::Fingerprint;

/// Remembers the fingerprint of the last frame that entered the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FrameDedupCache {
    last: Option<Fingerprint>,
}

impl FrameDedupCache {
    pub fn current(&self) -> Option<&Fingerprint> {
        self.last.as_ref()
    }

    pub fn is_current(&self, fingerprint: &Fingerprint) -> bool {
        self.last.as_ref() == Some(fingerprint)
    }

    /// A frame is skipped only when it is the remembered one and the session
    /// already holds an outcome for it.
    pub fn should_process(&self, fingerprint: &Fingerprint, has_outcome: bool) -> bool {
        !(self.is_current(fingerprint) && has_outcome)
    }

    pub fn record(&mut self, fingerprint: Fingerprint) {
        self.last = Some(fingerprint);
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}
