//! Key exchange methods.
//!
//! Each ciphersuite names one [`KeyExchangeMethod`]. The session drives the
//! method through the handshake with a [`KeyExchangeContext`] borrowing the
//! pieces of session state the method may touch.

pub mod ecdhe;
pub mod psk;

use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::error::Error;
use crate::handshake::Role;
use crate::key_material::KeyMaterial;
use crate::psk::PskRegistry;
use crate::record::ProtocolVersion;

pub use ecdhe::{Ecdhe, ECDHE};
pub use psk::{Psk, PSK};

/// Largest public key share (uncompressed P-256 point).
pub const MAX_KEY_SHARE_LEN: usize = 65;

/// Elliptic curve groups (RFC 8422, RFC 8446 section 4.2.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum NamedGroup {
    Secp256r1 = 0x0017,
    X25519 = 0x001d,
}

impl NamedGroup {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0017 => Some(Self::Secp256r1),
            0x001d => Some(Self::X25519),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub const fn public_key_len(self) -> usize {
        match self {
            NamedGroup::Secp256r1 => 65,
            NamedGroup::X25519 => 32,
        }
    }
}

enum EphemeralSecret {
    None,
    X25519(x25519_dalek::StaticSecret),
    Secp256r1(p256::SecretKey),
}

/// Ephemeral ECDH state for one handshake.
pub struct EcdheState {
    group: Option<NamedGroup>,
    secret: EphemeralSecret,
    public: heapless::Vec<u8, MAX_KEY_SHARE_LEN>,
    peer_public: heapless::Vec<u8, MAX_KEY_SHARE_LEN>,
}

impl EcdheState {
    pub const fn new() -> Self {
        Self {
            group: None,
            secret: EphemeralSecret::None,
            public: heapless::Vec::new(),
            peer_public: heapless::Vec::new(),
        }
    }

    /// Fix the group used by this handshake.
    pub fn select_group(&mut self, group: NamedGroup) {
        self.group = Some(group);
    }

    pub fn group(&self) -> Option<NamedGroup> {
        self.group
    }

    pub fn has_secret(&self) -> bool {
        !matches!(self.secret, EphemeralSecret::None)
    }

    /// Generate an ephemeral key pair in `group`.
    pub fn generate(&mut self, group: NamedGroup, rng: &mut dyn CryptoRngCore) -> Result<(), Error> {
        let mut seed = [0u8; 32];
        self.public.clear();
        match group {
            NamedGroup::X25519 => {
                rng.fill_bytes(&mut seed);
                let secret = x25519_dalek::StaticSecret::from(seed);
                let public = x25519_dalek::PublicKey::from(&secret);
                self.public
                    .extend_from_slice(public.as_bytes())
                    .map_err(|_| Error::Crypto)?;
                self.secret = EphemeralSecret::X25519(secret);
            }
            NamedGroup::Secp256r1 => {
                use p256::elliptic_curve::sec1::ToEncodedPoint;
                let secret = loop {
                    rng.fill_bytes(&mut seed);
                    if let Ok(sk) = p256::SecretKey::from_bytes((&seed).into()) {
                        break sk;
                    }
                };
                let point = secret.public_key().to_encoded_point(false);
                self.public
                    .extend_from_slice(point.as_bytes())
                    .map_err(|_| Error::Crypto)?;
                self.secret = EphemeralSecret::Secp256r1(secret);
            }
        }
        seed.zeroize();
        self.group = Some(group);
        tracing::trace!(?group, "ephemeral key generated");
        Ok(())
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Record the peer's share after checking it has the group's length.
    pub fn set_peer_public(&mut self, key: &[u8]) -> Result<(), Error> {
        let group = self.group.ok_or(Error::InvalidState)?;
        if key.len() != group.public_key_len() {
            return Err(Error::Decode);
        }
        if group == NamedGroup::Secp256r1 && key[0] != 0x04 {
            return Err(Error::Decode);
        }
        self.peer_public.clear();
        self.peer_public
            .extend_from_slice(key)
            .map_err(|_| Error::Decode)?;
        Ok(())
    }

    pub fn peer_public_key(&self) -> &[u8] {
        &self.peer_public
    }

    /// ECDH shared secret (the x-coordinate for P-256).
    pub fn shared_secret(&self, out: &mut [u8; 32]) -> Result<(), Error> {
        if self.peer_public.is_empty() {
            return Err(Error::InvalidState);
        }
        match &self.secret {
            EphemeralSecret::None => Err(Error::InvalidState),
            EphemeralSecret::X25519(secret) => {
                let mut peer = [0u8; 32];
                peer.copy_from_slice(&self.peer_public);
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err(Error::HandshakeFailure);
                }
                out.copy_from_slice(shared.as_bytes());
                Ok(())
            }
            EphemeralSecret::Secp256r1(secret) => {
                let peer = p256::PublicKey::from_sec1_bytes(&self.peer_public)
                    .map_err(|_| Error::HandshakeFailure)?;
                let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                out.copy_from_slice(shared.raw_secret_bytes());
                Ok(())
            }
        }
    }

    /// Drop the key pair and peer share.
    pub fn reset(&mut self) {
        self.group = None;
        self.secret = EphemeralSecret::None;
        self.public.clear();
        self.peer_public.clear();
    }
}

impl Default for EcdheState {
    fn default() -> Self {
        Self::new()
    }
}

/// Session state lent to a key exchange method for one call.
pub struct KeyExchangeContext<'c> {
    pub role: Role,
    pub version: ProtocolVersion,
    /// Produce TLS 1.3 wire forms (KeyShareEntry) instead of TLS 1.2 messages.
    pub tls13: bool,
    pub key_material: &'c mut KeyMaterial,
    pub ecdhe: &'c mut EcdheState,
    pub psk_registry: &'c PskRegistry,
    /// Groups we accept, in preference order.
    pub groups: &'c [NamedGroup],
    /// Server: P-256 scalar signing ServerKeyExchange.
    pub signing_key: Option<&'c [u8; 32]>,
    /// Client: P-256 key from the server's leaf certificate.
    pub peer_signing_key: Option<&'c [u8; 65]>,
    pub rng: &'c mut dyn CryptoRngCore,
}

/// One key exchange family.
///
/// Writers fill `out` and return the byte count; a server writer returning
/// zero means no ServerKeyExchange message is sent.
pub trait KeyExchangeMethod: Sync {
    fn name(&self) -> &'static str;

    /// Compute the premaster secret into the key material.
    fn generate_premaster_secret(&self, ctx: &mut KeyExchangeContext<'_>) -> Result<(), Error>;

    /// Server: ServerKeyExchange body, or a KeyShareEntry when `ctx.tls13`.
    fn generate_server_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        out: &mut [u8],
    ) -> Result<usize, Error>;

    /// Client: consume the ServerKeyExchange body.
    fn process_server_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error>;

    /// Client: ClientKeyExchange body.
    fn generate_client_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        out: &mut [u8],
    ) -> Result<usize, Error>;

    /// Server: consume the ClientKeyExchange body.
    fn process_client_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error>;
}

pub(crate) fn check_room(out: &[u8], needed: usize) -> Result<(), Error> {
    if out.len() < needed {
        return Err(Error::BufferTooSmall { needed });
    }
    Ok(())
}
