//! TLS record layer codec (RFC 5246 section 6.2).

pub mod protection;

pub use protection::{CbcOpened, RecordProtection};

use crate::config::MAX_CIPHERTEXT_LEN;
use crate::crypto::CipherAlgorithm;
use crate::error::Error;

/// Record header size.
pub const RECORD_HEADER_LEN: usize = 5;

/// Protocol versions on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ProtocolVersion {
    Tls10 = 0x0301,
    Tls11 = 0x0302,
    Tls12 = 0x0303,
    Tls13 = 0x0304,
}

impl ProtocolVersion {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0301 => Some(Self::Tls10),
            0x0302 => Some(Self::Tls11),
            0x0303 => Some(Self::Tls12),
            0x0304 => Some(Self::Tls13),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    /// Raw version; TLS 1.0 ClientHellos may carry 0x0301 here.
    pub version: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, Error> {
        encode_record_header(self.content_type, self.version, self.length, out)
    }
}

pub fn encode_record_header(
    content_type: ContentType,
    version: u16,
    length: u16,
    out: &mut [u8],
) -> Result<usize, Error> {
    if out.len() < RECORD_HEADER_LEN {
        return Err(Error::BufferTooSmall { needed: RECORD_HEADER_LEN });
    }
    out[0] = content_type as u8;
    out[1..3].copy_from_slice(&version.to_be_bytes());
    out[3..5].copy_from_slice(&length.to_be_bytes());
    Ok(RECORD_HEADER_LEN)
}

/// Decode a record header. The fragment itself is not inspected.
pub fn decode_record_header(data: &[u8]) -> Result<RecordHeader, Error> {
    if data.len() < RECORD_HEADER_LEN {
        return Err(Error::BufferTooSmall { needed: RECORD_HEADER_LEN });
    }
    let content_type = ContentType::from_u8(data[0]).ok_or(Error::Decode)?;
    if data[1] != 3 {
        return Err(Error::Decode);
    }
    let version = u16::from_be_bytes([data[1], data[2]]);
    let length = u16::from_be_bytes([data[3], data[4]]);
    if length as usize > MAX_CIPHERTEXT_LEN {
        return Err(Error::Decode);
    }
    Ok(RecordHeader { content_type, version, length })
}

/// Explicit per-record IV carried in front of the fragment.
///
/// CBC sends a full block from TLS 1.1 on; TLS 1.2 AES-GCM and AES-CCM
/// carry the 8-byte nonce_explicit. ChaCha20-Poly1305, TLS 1.3 and the null
/// cipher carry nothing.
pub fn record_iv_size(cipher: CipherAlgorithm, version: ProtocolVersion) -> usize {
    match cipher {
        CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes256Cbc => {
            if version == ProtocolVersion::Tls10 {
                0
            } else {
                crate::crypto::cipher::AES_BLOCK_LEN
            }
        }
        CipherAlgorithm::Aes128Gcm
        | CipherAlgorithm::Aes256Gcm
        | CipherAlgorithm::Aes128Ccm
        | CipherAlgorithm::Aes128Ccm12
        | CipherAlgorithm::Aes128Ccm8 => {
            if version < ProtocolVersion::Tls13 {
                8
            } else {
                0
            }
        }
        CipherAlgorithm::ChaCha20Poly1305 | CipherAlgorithm::Null => 0,
    }
}

/// `iv XOR padded sequence number` (RFC 7905, RFC 8446 section 5.3).
pub fn build_nonce(iv: &[u8; 12], seq: u64) -> [u8; 12] {
    let mut nonce = *iv;
    for (n, s) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
        *n ^= s;
    }
    nonce
}

/// Length of the first complete record in `data`, if one has fully arrived.
pub fn complete_record_len(data: &[u8]) -> Result<Option<usize>, Error> {
    if data.len() < RECORD_HEADER_LEN {
        return Ok(None);
    }
    let header = decode_record_header(data)?;
    let total = RECORD_HEADER_LEN + header.length as usize;
    Ok((data.len() >= total).then_some(total))
}
