//! ==============================================================================
//! change.rs - fingerprint gate for the fast poll
//! ==============================================================================
//!
//! latest.txt is re-read every second but only rewritten every few seconds.
//! re-merging an identical payload would re-glow the card and re-move the
//! marker, so the fast path stops here when nothing changed.
//!
//! ==============================================================================

use sha2::{Digest, Sha256};

#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex sha-256 of the raw payload bytes.
    pub fn fingerprint(raw: &str) -> String {
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    /// Records `raw` as the last seen payload and reports whether it differs
    /// from the one before it. The first call always reports a change.
    pub fn has_changed(&mut self, raw: &str) -> bool {
        let digest = Self::fingerprint(raw);
        let changed = self.last.as_deref() != Some(digest.as_str());
        self.last = Some(digest);
        changed
    }

    pub fn last_fingerprint(&self) -> Option<&str> {
        self.last.as_deref()
    }
}
