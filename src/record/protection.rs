//! Per-direction record protection for TLS 1.2.
//!
//! AEAD suites seal the fragment with `seq || type || version || length` as
//! additional data. AES-GCM and AES-CCM use a 4-byte salt from the key block
//! and carry the sequence number as the 8-byte explicit nonce; ChaCha20-Poly1305
//! XORs the sequence number into a 12-byte IV (RFC 7905).
//!
//! CBC suites are MAC-then-encrypt. The MAC itself is computed by the caller's
//! [`RecordMac`](crate::crypto::RecordMac) so the session can own the
//! accumulator; this type only pads, encrypts and strips.

use core::ops::Range;

use zeroize::Zeroize;

use super::{build_nonce, encode_record_header, record_iv_size, ContentType, ProtocolVersion, RecordHeader};
use crate::ciphersuite::CiphersuiteInfo;
use crate::crypto::cipher::AES_BLOCK_LEN;
use crate::crypto::mac::MAX_MAC_LEN;
use crate::crypto::{CipherAlgorithm, MacAlgorithm, RecordCipher};
use crate::error::Error;
use crate::key_material::DirectionKeys;
use crate::packet::Packet;

/// Result of stripping a CBC record. Nothing here is trusted until the MAC
/// over `content` matches `mac` and `padding_ok` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CbcOpened {
    pub content: Range<usize>,
    pub mac: Range<usize>,
    pub padding_ok: bool,
    /// Sequence number the MAC must cover.
    pub seq: u64,
}

pub struct RecordProtection {
    cipher: RecordCipher,
    mac: MacAlgorithm,
    mac_key: [u8; MAX_MAC_LEN],
    mac_key_len: usize,
    fixed_iv: [u8; 12],
    fixed_iv_len: usize,
    version: ProtocolVersion,
    seq: u64,
}

impl RecordProtection {
    pub fn new(
        suite: &CiphersuiteInfo,
        keys: &DirectionKeys<'_>,
        version: ProtocolVersion,
    ) -> Result<Self, Error> {
        if keys.mac_key.len() > MAX_MAC_LEN || keys.iv.len() > 12 {
            return Err(Error::InvalidParameters);
        }
        let mut mac_key = [0u8; MAX_MAC_LEN];
        mac_key[..keys.mac_key.len()].copy_from_slice(keys.mac_key);
        let mut fixed_iv = [0u8; 12];
        fixed_iv[..keys.iv.len()].copy_from_slice(keys.iv);
        Ok(Self {
            cipher: RecordCipher::new(suite.cipher, keys.key)?,
            mac: suite.mac,
            mac_key,
            mac_key_len: keys.mac_key.len(),
            fixed_iv,
            fixed_iv_len: keys.iv.len(),
            version,
            seq: 0,
        })
    }

    pub fn cipher(&self) -> CipherAlgorithm {
        self.cipher.algorithm()
    }

    pub fn is_aead(&self) -> bool {
        self.cipher().is_aead()
    }

    pub fn mac_algorithm(&self) -> MacAlgorithm {
        self.mac
    }

    pub fn mac_key(&self) -> &[u8] {
        &self.mac_key[..self.mac_key_len]
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Sequence number of the next record.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Explicit IV bytes in front of each fragment.
    pub fn explicit_iv_len(&self) -> usize {
        record_iv_size(self.cipher(), self.version)
    }

    fn bump(&mut self) -> Result<(), Error> {
        self.seq = self.seq.checked_add(1).ok_or(Error::InvalidState)?;
        Ok(())
    }

    fn nonce(&self, explicit: &[u8]) -> [u8; 12] {
        if self.cipher() == CipherAlgorithm::ChaCha20Poly1305 {
            build_nonce(&self.fixed_iv, self.seq)
        } else {
            let mut nonce = [0u8; 12];
            nonce[..self.fixed_iv_len].copy_from_slice(&self.fixed_iv[..self.fixed_iv_len]);
            nonce[self.fixed_iv_len..].copy_from_slice(explicit);
            nonce
        }
    }

    fn additional_data(&self, content_type: ContentType, length: usize) -> [u8; 13] {
        let mut aad = [0u8; 13];
        aad[..8].copy_from_slice(&self.seq.to_be_bytes());
        aad[8] = content_type as u8;
        aad[9..11].copy_from_slice(&self.version.to_u16().to_be_bytes());
        aad[11..13].copy_from_slice(&(length as u16).to_be_bytes());
        aad
    }

    /// Seal the plaintext payload of `packet` and write its record header.
    pub fn seal_aead(&mut self, content_type: ContentType, packet: &mut Packet) -> Result<(), Error> {
        let explicit_len = self.explicit_iv_len();
        if !self.is_aead() || packet.iv_len() != explicit_len {
            return Err(Error::InvalidState);
        }
        let start = packet.payload_offset();
        let plain_len = packet.len() - start;

        let explicit = self.seq.to_be_bytes();
        let nonce = self.nonce(&explicit[..explicit_len]);
        packet.iv_mut().copy_from_slice(&explicit[..explicit_len]);

        let aad = self.additional_data(content_type, plain_len);
        let sealed = self
            .cipher
            .seal_in_place(&nonce, &aad, &mut packet.storage_mut()[start..], plain_len)?;
        packet.advance(sealed - plain_len)?;

        let fragment_len = explicit_len + sealed;
        encode_record_header(
            content_type,
            self.version.to_u16(),
            fragment_len as u16,
            packet.header_mut(),
        )?;
        tracing::trace!(?content_type, seq = self.seq, fragment_len, "record sealed");
        self.bump()
    }

    /// Authenticate and decrypt `fragment` in place, returning the plaintext range.
    pub fn open_aead(&mut self, header: &RecordHeader, fragment: &mut [u8]) -> Result<Range<usize>, Error> {
        let explicit_len = self.explicit_iv_len();
        let tag_len = self.cipher().tag_len();
        if !self.is_aead() {
            return Err(Error::InvalidState);
        }
        if fragment.len() < explicit_len + tag_len {
            return Err(Error::BadRecordMac);
        }
        let nonce = self.nonce(&fragment[..explicit_len]);
        let ct_len = fragment.len() - explicit_len;
        let aad = self.additional_data(header.content_type, ct_len - tag_len);
        let plain_len = self
            .cipher
            .open_in_place(&nonce, &aad, &mut fragment[explicit_len..], ct_len)
            .map_err(|_| Error::BadRecordMac)?;
        self.bump()?;
        Ok(explicit_len..explicit_len + plain_len)
    }

    /// Append `mac_tag` and padding to the payload, encrypt under the IV in
    /// the packet's IV region, and write the record header.
    pub fn seal_cbc(
        &mut self,
        content_type: ContentType,
        packet: &mut Packet,
        mac_tag: &[u8],
    ) -> Result<(), Error> {
        if !self.cipher().is_cbc() || packet.iv_len() != AES_BLOCK_LEN {
            return Err(Error::InvalidState);
        }
        packet.append(mac_tag)?;
        let start = packet.payload_offset();
        let body_len = packet.len() - start;
        let pad = (AES_BLOCK_LEN - (body_len + 1) % AES_BLOCK_LEN) % AES_BLOCK_LEN;
        let padding = [pad as u8; AES_BLOCK_LEN];
        packet.append(&padding[..pad + 1])?;

        let mut iv = [0u8; AES_BLOCK_LEN];
        iv.copy_from_slice(packet.iv_mut());
        let end = packet.len();
        self.cipher.cbc_encrypt(&iv, &mut packet.storage_mut()[start..end])?;

        let fragment_len = AES_BLOCK_LEN + end - start;
        encode_record_header(
            content_type,
            self.version.to_u16(),
            fragment_len as u16,
            packet.header_mut(),
        )?;
        tracing::trace!(?content_type, seq = self.seq, fragment_len, "record sealed");
        self.bump()
    }

    /// Decrypt a CBC fragment in place and locate its content, MAC and padding.
    ///
    /// A bad padding is reported through [`CbcOpened::padding_ok`] rather than
    /// an early error so the caller still runs the MAC.
    pub fn open_cbc(&mut self, fragment: &mut [u8]) -> Result<CbcOpened, Error> {
        let mac_len = self.mac.output_len();
        if !self.cipher().is_cbc() {
            return Err(Error::InvalidState);
        }
        let iv_len = self.explicit_iv_len();
        if iv_len != AES_BLOCK_LEN
            || fragment.len() < iv_len + AES_BLOCK_LEN
            || (fragment.len() - iv_len) % AES_BLOCK_LEN != 0
        {
            return Err(Error::BadRecordMac);
        }
        let mut iv = [0u8; AES_BLOCK_LEN];
        iv.copy_from_slice(&fragment[..iv_len]);
        self.cipher.cbc_decrypt(&iv, &mut fragment[iv_len..])?;

        let body = &fragment[iv_len..];
        if body.len() < mac_len + 1 {
            return Err(Error::BadRecordMac);
        }
        let pad = body[body.len() - 1] as usize;
        let mut padding_ok = pad + 1 + mac_len <= body.len();
        let checked = core::cmp::min(pad + 1, body.len());
        let mut diff = 0u8;
        for b in &body[body.len() - checked..] {
            diff |= b ^ pad as u8;
        }
        padding_ok &= diff == 0;

        let content_len = if padding_ok {
            body.len() - pad - 1 - mac_len
        } else {
            body.len() - mac_len - 1
        };
        let seq = self.seq;
        self.bump()?;
        Ok(CbcOpened {
            content: iv_len..iv_len + content_len,
            mac: iv_len + content_len..iv_len + content_len + mac_len,
            padding_ok,
            seq,
        })
    }
}

impl Drop for RecordProtection {
    fn drop(&mut self) {
        self.mac_key.zeroize();
        self.fixed_iv.zeroize();
    }
}
