//! Record ciphers: AEAD (AES-GCM, AES-CCM, ChaCha20-Poly1305) and AES-CBC.
//!
//! The AEAD families all implement `aead::AeadInPlace`, so sealing and
//! opening go through one generic helper. CBC chaining is done by hand over
//! the AES block cipher.

use aes::cipher::{BlockDecrypt, BlockEncrypt};
use aes::{Aes128, Aes256, Block};
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use ccm::consts::{U12, U16, U8};
use ccm::Ccm;
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::Error;

type Aes128Ccm = Ccm<Aes128, U16, U12>;
type Aes128Ccm12 = Ccm<Aes128, U12, U12>;
type Aes128Ccm8 = Ccm<Aes128, U8, U12>;

/// AES block size, also the CBC explicit IV length.
pub const AES_BLOCK_LEN: usize = 16;

/// Bulk cipher of a ciphersuite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CipherAlgorithm {
    Null,
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
    /// AES-128-CCM with a 16-byte tag.
    Aes128Ccm,
    /// AES-128-CCM with a 12-byte tag.
    Aes128Ccm12,
    /// AES-128-CCM with an 8-byte tag.
    Aes128Ccm8,
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    pub const fn key_len(self) -> usize {
        match self {
            CipherAlgorithm::Null => 0,
            CipherAlgorithm::Aes128Cbc
            | CipherAlgorithm::Aes128Gcm
            | CipherAlgorithm::Aes128Ccm
            | CipherAlgorithm::Aes128Ccm12
            | CipherAlgorithm::Aes128Ccm8 => 16,
            CipherAlgorithm::Aes256Cbc
            | CipherAlgorithm::Aes256Gcm
            | CipherAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    /// Implicit IV taken from the TLS 1.2 key block.
    pub const fn fixed_iv_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes128Gcm
            | CipherAlgorithm::Aes256Gcm
            | CipherAlgorithm::Aes128Ccm
            | CipherAlgorithm::Aes128Ccm12
            | CipherAlgorithm::Aes128Ccm8 => 4,
            CipherAlgorithm::ChaCha20Poly1305 => 12,
            CipherAlgorithm::Null | CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes256Cbc => 0,
        }
    }

    /// IV length used by TLS 1.3, where the whole nonce comes from the key schedule.
    pub const fn tls13_iv_len(self) -> usize {
        match self {
            CipherAlgorithm::Null | CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes256Cbc => 0,
            _ => 12,
        }
    }

    pub const fn tag_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes128Gcm
            | CipherAlgorithm::Aes256Gcm
            | CipherAlgorithm::Aes128Ccm
            | CipherAlgorithm::ChaCha20Poly1305 => 16,
            CipherAlgorithm::Aes128Ccm12 => 12,
            CipherAlgorithm::Aes128Ccm8 => 8,
            CipherAlgorithm::Null | CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes256Cbc => 0,
        }
    }

    pub const fn is_aead(self) -> bool {
        self.tag_len() > 0
    }

    pub const fn is_cbc(self) -> bool {
        matches!(self, CipherAlgorithm::Aes128Cbc | CipherAlgorithm::Aes256Cbc)
    }
}

/// A keyed record cipher.
pub enum RecordCipher {
    Null,
    Aes128Cbc(Aes128),
    Aes256Cbc(Aes256),
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
    Aes128Ccm(Aes128Ccm),
    Aes128Ccm12(Aes128Ccm12),
    Aes128Ccm8(Aes128Ccm8),
    ChaCha20Poly1305(ChaCha20Poly1305),
}

impl RecordCipher {
    pub fn new(algorithm: CipherAlgorithm, key: &[u8]) -> Result<Self, Error> {
        if key.len() != algorithm.key_len() {
            return Err(Error::InvalidParameters);
        }
        let cipher = match algorithm {
            CipherAlgorithm::Null => RecordCipher::Null,
            CipherAlgorithm::Aes128Cbc => {
                RecordCipher::Aes128Cbc(Aes128::new_from_slice(key).map_err(|_| Error::Crypto)?)
            }
            CipherAlgorithm::Aes256Cbc => {
                RecordCipher::Aes256Cbc(Aes256::new_from_slice(key).map_err(|_| Error::Crypto)?)
            }
            CipherAlgorithm::Aes128Gcm => RecordCipher::Aes128Gcm(keyed(key)?),
            CipherAlgorithm::Aes256Gcm => RecordCipher::Aes256Gcm(keyed(key)?),
            CipherAlgorithm::Aes128Ccm => RecordCipher::Aes128Ccm(keyed(key)?),
            CipherAlgorithm::Aes128Ccm12 => RecordCipher::Aes128Ccm12(keyed(key)?),
            CipherAlgorithm::Aes128Ccm8 => RecordCipher::Aes128Ccm8(keyed(key)?),
            CipherAlgorithm::ChaCha20Poly1305 => RecordCipher::ChaCha20Poly1305(keyed(key)?),
        };
        Ok(cipher)
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        match self {
            RecordCipher::Null => CipherAlgorithm::Null,
            RecordCipher::Aes128Cbc(_) => CipherAlgorithm::Aes128Cbc,
            RecordCipher::Aes256Cbc(_) => CipherAlgorithm::Aes256Cbc,
            RecordCipher::Aes128Gcm(_) => CipherAlgorithm::Aes128Gcm,
            RecordCipher::Aes256Gcm(_) => CipherAlgorithm::Aes256Gcm,
            RecordCipher::Aes128Ccm(_) => CipherAlgorithm::Aes128Ccm,
            RecordCipher::Aes128Ccm12(_) => CipherAlgorithm::Aes128Ccm12,
            RecordCipher::Aes128Ccm8(_) => CipherAlgorithm::Aes128Ccm8,
            RecordCipher::ChaCha20Poly1305(_) => CipherAlgorithm::ChaCha20Poly1305,
        }
    }

    /// AEAD encrypt in place.
    ///
    /// `buf[..payload_len]` holds the plaintext; the tag is appended, so
    /// `buf` must have room for `payload_len + tag_len`. Returns the sealed length.
    pub fn seal_in_place(
        &self,
        nonce: &[u8; 12],
        aad: &[u8],
        buf: &mut [u8],
        payload_len: usize,
    ) -> Result<usize, Error> {
        match self {
            RecordCipher::Aes128Gcm(c) => seal_with(c, nonce, aad, buf, payload_len),
            RecordCipher::Aes256Gcm(c) => seal_with(c, nonce, aad, buf, payload_len),
            RecordCipher::Aes128Ccm(c) => seal_with(c, nonce, aad, buf, payload_len),
            RecordCipher::Aes128Ccm12(c) => seal_with(c, nonce, aad, buf, payload_len),
            RecordCipher::Aes128Ccm8(c) => seal_with(c, nonce, aad, buf, payload_len),
            RecordCipher::ChaCha20Poly1305(c) => seal_with(c, nonce, aad, buf, payload_len),
            _ => Err(Error::InvalidState),
        }
    }

    /// AEAD decrypt in place.
    ///
    /// `buf[..ciphertext_len]` holds ciphertext followed by the tag.
    /// Returns the plaintext length.
    pub fn open_in_place(
        &self,
        nonce: &[u8; 12],
        aad: &[u8],
        buf: &mut [u8],
        ciphertext_len: usize,
    ) -> Result<usize, Error> {
        match self {
            RecordCipher::Aes128Gcm(c) => open_with(c, nonce, aad, buf, ciphertext_len),
            RecordCipher::Aes256Gcm(c) => open_with(c, nonce, aad, buf, ciphertext_len),
            RecordCipher::Aes128Ccm(c) => open_with(c, nonce, aad, buf, ciphertext_len),
            RecordCipher::Aes128Ccm12(c) => open_with(c, nonce, aad, buf, ciphertext_len),
            RecordCipher::Aes128Ccm8(c) => open_with(c, nonce, aad, buf, ciphertext_len),
            RecordCipher::ChaCha20Poly1305(c) => open_with(c, nonce, aad, buf, ciphertext_len),
            _ => Err(Error::InvalidState),
        }
    }

    /// CBC-encrypt whole blocks in place.
    pub fn cbc_encrypt(&self, iv: &[u8; AES_BLOCK_LEN], data: &mut [u8]) -> Result<(), Error> {
        if data.len() % AES_BLOCK_LEN != 0 {
            return Err(Error::InvalidParameters);
        }
        let mut chain = *iv;
        for chunk in data.chunks_exact_mut(AES_BLOCK_LEN) {
            for (b, c) in chunk.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            let block = Block::from_mut_slice(chunk);
            match self {
                RecordCipher::Aes128Cbc(c) => c.encrypt_block(block),
                RecordCipher::Aes256Cbc(c) => c.encrypt_block(block),
                _ => return Err(Error::InvalidState),
            }
            chain.copy_from_slice(chunk);
        }
        Ok(())
    }

    /// CBC-decrypt whole blocks in place.
    pub fn cbc_decrypt(&self, iv: &[u8; AES_BLOCK_LEN], data: &mut [u8]) -> Result<(), Error> {
        if data.len() % AES_BLOCK_LEN != 0 {
            return Err(Error::InvalidParameters);
        }
        let mut chain = *iv;
        let mut saved = [0u8; AES_BLOCK_LEN];
        for chunk in data.chunks_exact_mut(AES_BLOCK_LEN) {
            saved.copy_from_slice(chunk);
            let block = Block::from_mut_slice(chunk);
            match self {
                RecordCipher::Aes128Cbc(c) => c.decrypt_block(block),
                RecordCipher::Aes256Cbc(c) => c.decrypt_block(block),
                _ => return Err(Error::InvalidState),
            }
            for (b, c) in chunk.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            chain = saved;
        }
        Ok(())
    }
}

fn keyed<A: KeyInit>(key: &[u8]) -> Result<A, Error> {
    A::new_from_slice(key).map_err(|_| Error::Crypto)
}

fn seal_with<A: AeadInPlace>(
    cipher: &A,
    nonce: &[u8; 12],
    aad: &[u8],
    buf: &mut [u8],
    payload_len: usize,
) -> Result<usize, Error> {
    let total = payload_len + A::TagSize::USIZE;
    if buf.len() < total {
        return Err(Error::BufferTooSmall { needed: total });
    }
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, &mut buf[..payload_len])
        .map_err(|_| Error::Crypto)?;
    buf[payload_len..total].copy_from_slice(&tag);
    Ok(total)
}

fn open_with<A: AeadInPlace>(
    cipher: &A,
    nonce: &[u8; 12],
    aad: &[u8],
    buf: &mut [u8],
    ciphertext_len: usize,
) -> Result<usize, Error> {
    let tag_len = A::TagSize::USIZE;
    if ciphertext_len < tag_len || buf.len() < ciphertext_len {
        return Err(Error::BadRecordMac);
    }
    let plaintext_len = ciphertext_len - tag_len;
    let (data, rest) = buf.split_at_mut(plaintext_len);
    let tag = GenericArray::from_slice(&rest[..tag_len]);
    cipher
        .decrypt_in_place_detached(GenericArray::from_slice(nonce), aad, data, tag)
        .map_err(|_| Error::BadRecordMac)?;
    Ok(plaintext_len)
}
