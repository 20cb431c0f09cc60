//! Session secrets: randoms, premaster and master secret, key block, selected PSK.
//!
//! Everything here is zeroized on drop and on [`KeyMaterial::reset`].

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ciphersuite::CiphersuiteInfo;
use crate::config::{MAX_PSK_ID_SIZE, MAX_PSK_SIZE};
use crate::crypto::prf::prf;
use crate::crypto::HashAlgorithm;
use crate::error::Error;
use crate::handshake::Role;

/// Largest premaster secret: the RFC 4279 PSK form.
pub const MAX_PREMASTER_LEN: usize = 2 + MAX_PSK_SIZE + 2 + MAX_PSK_SIZE;
pub const MASTER_SECRET_LEN: usize = 48;
/// Two MAC keys, two cipher keys and two IVs at their largest.
pub const MAX_KEY_BLOCK_LEN: usize = 2 * (48 + 32 + 16);
pub const VERIFY_DATA_LEN: usize = 12;
pub const RANDOM_LEN: usize = 32;

/// Keys for one direction of record protection.
pub struct DirectionKeys<'k> {
    pub mac_key: &'k [u8],
    pub key: &'k [u8],
    pub iv: &'k [u8],
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub client_random: [u8; RANDOM_LEN],
    pub server_random: [u8; RANDOM_LEN],
    pre_master: [u8; MAX_PREMASTER_LEN],
    pre_master_len: usize,
    master_secret: [u8; MASTER_SECRET_LEN],
    master_secret_len: usize,
    key_block: [u8; MAX_KEY_BLOCK_LEN],
    key_block_len: usize,
    psk: [u8; MAX_PSK_SIZE],
    psk_len: usize,
    psk_identity: [u8; MAX_PSK_ID_SIZE],
    psk_identity_len: usize,
}

impl KeyMaterial {
    pub const fn new() -> Self {
        Self {
            client_random: [0; RANDOM_LEN],
            server_random: [0; RANDOM_LEN],
            pre_master: [0; MAX_PREMASTER_LEN],
            pre_master_len: 0,
            master_secret: [0; MASTER_SECRET_LEN],
            master_secret_len: 0,
            key_block: [0; MAX_KEY_BLOCK_LEN],
            key_block_len: 0,
            psk: [0; MAX_PSK_SIZE],
            psk_len: 0,
            psk_identity: [0; MAX_PSK_ID_SIZE],
            psk_identity_len: 0,
        }
    }

    pub fn set_pre_master(&mut self, secret: &[u8]) -> Result<(), Error> {
        if secret.len() > MAX_PREMASTER_LEN {
            return Err(Error::BufferTooSmall { needed: secret.len() });
        }
        self.pre_master.zeroize();
        self.pre_master[..secret.len()].copy_from_slice(secret);
        self.pre_master_len = secret.len();
        Ok(())
    }

    /// Writable premaster buffer; commit the length with [`KeyMaterial::commit_pre_master`].
    pub(crate) fn pre_master_mut(&mut self) -> &mut [u8; MAX_PREMASTER_LEN] {
        &mut self.pre_master
    }

    pub(crate) fn commit_pre_master(&mut self, len: usize) {
        self.pre_master_len = len;
    }

    pub fn pre_master(&self) -> &[u8] {
        &self.pre_master[..self.pre_master_len]
    }

    /// Remember the PSK chosen for this handshake.
    pub fn set_psk(&mut self, secret: &[u8], identity: &[u8]) -> Result<(), Error> {
        if secret.len() > MAX_PSK_SIZE || identity.len() > MAX_PSK_ID_SIZE {
            return Err(Error::InvalidParameters);
        }
        self.psk[..secret.len()].copy_from_slice(secret);
        self.psk_len = secret.len();
        self.psk_identity[..identity.len()].copy_from_slice(identity);
        self.psk_identity_len = identity.len();
        Ok(())
    }

    pub fn has_psk(&self) -> bool {
        self.psk_len > 0
    }

    pub fn psk(&self) -> &[u8] {
        &self.psk[..self.psk_len]
    }

    pub fn psk_identity(&self) -> &[u8] {
        &self.psk_identity[..self.psk_identity_len]
    }

    /// `master_secret = PRF(pre_master, "master secret", client_random || server_random)[..48]`.
    ///
    /// The premaster secret is scrubbed once consumed.
    pub fn derive_master_secret(&mut self, hash: HashAlgorithm) -> Result<(), Error> {
        if self.pre_master_len == 0 {
            return Err(Error::InvalidState);
        }
        let mut master = [0u8; MASTER_SECRET_LEN];
        prf(
            hash,
            &self.pre_master[..self.pre_master_len],
            b"master secret",
            &[&self.client_random[..], &self.server_random[..]],
            &mut master,
        )?;
        self.master_secret = master;
        self.master_secret_len = MASTER_SECRET_LEN;
        master.zeroize();
        self.pre_master.zeroize();
        self.pre_master_len = 0;
        Ok(())
    }

    pub fn has_master_secret(&self) -> bool {
        self.master_secret_len == MASTER_SECRET_LEN
    }

    /// Expand the key block for `suite` (RFC 5246 section 6.3).
    pub fn derive_key_block(&mut self, suite: &CiphersuiteInfo) -> Result<(), Error> {
        if !self.has_master_secret() {
            return Err(Error::InvalidState);
        }
        let len = suite.key_block_len();
        if len > MAX_KEY_BLOCK_LEN {
            return Err(Error::BufferTooSmall { needed: len });
        }
        let mut block = [0u8; MAX_KEY_BLOCK_LEN];
        prf(
            suite.prf_hash,
            &self.master_secret,
            b"key expansion",
            &[&self.server_random[..], &self.client_random[..]],
            &mut block[..len],
        )?;
        self.key_block = block;
        self.key_block_len = len;
        block.zeroize();
        Ok(())
    }

    /// Slice the key block for the keys `writer` uses to send.
    pub fn keys(&self, suite: &CiphersuiteInfo, writer: Role) -> Result<DirectionKeys<'_>, Error> {
        if self.key_block_len != suite.key_block_len() || self.key_block_len == 0 {
            return Err(Error::InvalidState);
        }
        let mac = suite.mac.key_len();
        let key = suite.cipher.key_len();
        let iv = suite.cipher.fixed_iv_len();
        let kb = &self.key_block[..self.key_block_len];

        let (client_mac, rest) = kb.split_at(mac);
        let (server_mac, rest) = rest.split_at(mac);
        let (client_key, rest) = rest.split_at(key);
        let (server_key, rest) = rest.split_at(key);
        let (client_iv, rest) = rest.split_at(iv);
        let server_iv = &rest[..iv];

        Ok(match writer {
            Role::Client => DirectionKeys { mac_key: client_mac, key: client_key, iv: client_iv },
            Role::Server => DirectionKeys { mac_key: server_mac, key: server_key, iv: server_iv },
        })
    }

    /// Finished `verify_data = PRF(master_secret, label, Hash(handshake_messages))[..12]`.
    pub fn verify_data(
        &self,
        hash: HashAlgorithm,
        label: &[u8],
        transcript_hash: &[u8],
    ) -> Result<[u8; VERIFY_DATA_LEN], Error> {
        if !self.has_master_secret() {
            return Err(Error::InvalidState);
        }
        let mut out = [0u8; VERIFY_DATA_LEN];
        prf(hash, &self.master_secret, label, &[transcript_hash], &mut out)?;
        Ok(out)
    }

    /// Scrub everything.
    pub fn reset(&mut self) {
        self.zeroize();
    }
}

impl Default for KeyMaterial {
    fn default() -> Self {
        Self::new()
    }
}
