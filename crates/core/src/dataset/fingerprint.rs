//! Content fingerprint of the raw registry file.

use sha2::{Digest, Sha256};

/// Incremental SHA-256 over the raw file bytes, fed as the parser reads.
#[derive(Debug, Default, Clone)]
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Hex-encoded digest.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
