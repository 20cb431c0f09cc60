//! Cryptographic building blocks for TLS 1.2 record protection and key derivation.
//!
//! Everything here is a thin layer over RustCrypto primitives. Record ciphers
//! are selected at runtime by the negotiated suite, so the families are
//! dispatched through enums ([`RecordCipher`], [`RecordMac`]) rather than
//! generic parameters.

pub mod cipher;
pub mod ecdsa_p256;
pub mod mac;
pub mod prf;

pub use cipher::{CipherAlgorithm, RecordCipher};
pub use mac::{MacAlgorithm, RecordMac};

/// Hash used by the PRF, the transcript and HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    pub const fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }
}

/// Constant-time byte comparison. Lengths are not secret.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
