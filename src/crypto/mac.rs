//! HMAC for the TLS 1.2 PRF and for CBC record authentication (RFC 5246 section 6.2.3.1).

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use zeroize::Zeroize;

use crate::crypto::HashAlgorithm;
use crate::error::Error;

/// Keyed HMAC state for one of the supported hashes.
#[derive(Clone)]
pub(crate) enum HmacState {
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
}

impl HmacState {
    pub(crate) fn new(hash: HashAlgorithm, key: &[u8]) -> Result<Self, Error> {
        match hash {
            HashAlgorithm::Sha256 => Hmac::<Sha256>::new_from_slice(key)
                .map(HmacState::Sha256)
                .map_err(|_| Error::Crypto),
            HashAlgorithm::Sha384 => Hmac::<Sha384>::new_from_slice(key)
                .map(HmacState::Sha384)
                .map_err(|_| Error::Crypto),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            HmacState::Sha256(m) => m.update(data),
            HmacState::Sha384(m) => m.update(data),
        }
    }

    /// Finalize into `out`, which must hold at least the hash length.
    pub(crate) fn finalize_into(self, out: &mut [u8]) -> usize {
        match self {
            HmacState::Sha256(m) => {
                let tag = m.finalize().into_bytes();
                out[..32].copy_from_slice(&tag);
                32
            }
            HmacState::Sha384(m) => {
                let tag = m.finalize().into_bytes();
                out[..48].copy_from_slice(&tag);
                48
            }
        }
    }
}

/// Record MAC algorithm of a ciphersuite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacAlgorithm {
    /// AEAD suites authenticate inside the cipher.
    Null,
    HmacSha256,
    HmacSha384,
}

impl MacAlgorithm {
    pub const fn key_len(self) -> usize {
        self.output_len()
    }

    pub const fn output_len(self) -> usize {
        match self {
            MacAlgorithm::Null => 0,
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha384 => 48,
        }
    }

    pub const fn hash(self) -> Option<HashAlgorithm> {
        match self {
            MacAlgorithm::Null => None,
            MacAlgorithm::HmacSha256 => Some(HashAlgorithm::Sha256),
            MacAlgorithm::HmacSha384 => Some(HashAlgorithm::Sha384),
        }
    }
}

/// Largest MAC output.
pub const MAX_MAC_LEN: usize = 48;

/// Accumulating record MAC.
///
/// `begin` keys the HMAC and absorbs the pseudo-header
/// `seq_num || type || version || length`; `update` absorbs fragment bytes;
/// `calculate` finalizes and returns the tag length.
pub struct RecordMac {
    state: Option<HmacState>,
}

impl RecordMac {
    pub const fn new() -> Self {
        Self { state: None }
    }

    pub fn begin(
        &mut self,
        algorithm: MacAlgorithm,
        key: &[u8],
        seq: u64,
        content_type: u8,
        version: u16,
        length: u16,
    ) -> Result<(), Error> {
        let hash = algorithm.hash().ok_or(Error::InvalidState)?;
        let mut state = HmacState::new(hash, key)?;
        state.update(&seq.to_be_bytes());
        state.update(&[content_type]);
        state.update(&version.to_be_bytes());
        state.update(&length.to_be_bytes());
        self.state = Some(state);
        Ok(())
    }

    pub fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.state.as_mut().ok_or(Error::InvalidState)?.update(data);
        Ok(())
    }

    /// Finalize into `out` and return the tag length. The working tag is
    /// scrubbed before returning.
    pub fn calculate(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        let state = self.state.take().ok_or(Error::InvalidState)?;
        let mut tag = [0u8; MAX_MAC_LEN];
        let len = state.finalize_into(&mut tag);
        if out.len() < len {
            tag.zeroize();
            return Err(Error::BufferTooSmall { needed: len });
        }
        out[..len].copy_from_slice(&tag[..len]);
        tag.zeroize();
        Ok(len)
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl Default for RecordMac {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_mac_matches_direct_hmac() {
        let key = [0x0bu8; 32];
        let mut mac = RecordMac::new();
        mac.begin(MacAlgorithm::HmacSha256, &key, 7, 23, 0x0303, 5).unwrap();
        mac.update(b"hel").unwrap();
        mac.update(b"lo").unwrap();
        let mut out = [0u8; MAX_MAC_LEN];
        assert_eq!(mac.calculate(&mut out).unwrap(), 32);

        let mut direct = Hmac::<Sha256>::new_from_slice(&key).unwrap();
        direct.update(&[0, 0, 0, 0, 0, 0, 0, 7, 23, 3, 3, 0, 5]);
        direct.update(b"hello");
        assert_eq!(&out[..32], direct.finalize().into_bytes().as_slice());
    }

    #[test]
    fn sha384_tag_length() {
        let mut mac = RecordMac::new();
        mac.begin(MacAlgorithm::HmacSha384, &[1u8; 48], 0, 22, 0x0303, 0).unwrap();
        let mut out = [0u8; MAX_MAC_LEN];
        assert_eq!(mac.calculate(&mut out).unwrap(), 48);
    }

    #[test]
    fn calculate_consumes_state() {
        let mut mac = RecordMac::new();
        mac.begin(MacAlgorithm::HmacSha256, &[1u8; 32], 0, 22, 0x0303, 0).unwrap();
        let mut out = [0u8; MAX_MAC_LEN];
        mac.calculate(&mut out).unwrap();
        assert!(!mac.is_active());
        assert_eq!(mac.calculate(&mut out), Err(Error::InvalidState));
        assert_eq!(mac.update(b"x"), Err(Error::InvalidState));
    }

    #[test]
    fn null_mac_cannot_begin() {
        let mut mac = RecordMac::new();
        assert_eq!(
            mac.begin(MacAlgorithm::Null, &[], 0, 23, 0x0303, 0),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn short_output_is_rejected() {
        let mut mac = RecordMac::new();
        mac.begin(MacAlgorithm::HmacSha256, &[1u8; 32], 0, 23, 0x0303, 0).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(mac.calculate(&mut out), Err(Error::BufferTooSmall { needed: 32 }));
    }
}
