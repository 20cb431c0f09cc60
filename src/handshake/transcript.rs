//! Running handshake transcript for the TLS 1.2 Finished computation.
//!
//! The PRF hash is only known once the ServerHello arrives, so both SHA-256
//! and SHA-384 states are fed from the first message. Intermediate hashes are
//! obtained by cloning the state.

use sha2::{Digest, Sha256, Sha384};

use crate::crypto::HashAlgorithm;

/// Largest digest the transcript produces.
pub const MAX_TRANSCRIPT_HASH_LEN: usize = 48;

pub struct TranscriptHash {
    sha256: Sha256,
    sha384: Sha384,
}

impl TranscriptHash {
    pub fn new() -> Self {
        Self {
            sha256: Sha256::new(),
            sha384: Sha384::new(),
        }
    }

    /// Feed handshake message bytes (header included) into the transcript.
    pub fn update(&mut self, message: &[u8]) {
        self.sha256.update(message);
        self.sha384.update(message);
    }

    /// Write the current transcript hash for `hash` into `out` without
    /// consuming the state. Returns the digest length.
    pub fn current_hash(&self, hash: HashAlgorithm, out: &mut [u8; MAX_TRANSCRIPT_HASH_LEN]) -> usize {
        match hash {
            HashAlgorithm::Sha256 => {
                let digest = self.sha256.clone().finalize();
                out[..32].copy_from_slice(&digest);
                32
            }
            HashAlgorithm::Sha384 => {
                let digest = self.sha384.clone().finalize();
                out[..48].copy_from_slice(&digest);
                48
            }
        }
    }

    pub fn reset(&mut self) {
        self.sha256 = Sha256::new();
        self.sha384 = Sha384::new();
    }
}

impl Default for TranscriptHash {
    fn default() -> Self {
        Self::new()
    }
}
