//! Static ciphersuite descriptors.

use crate::crypto::{CipherAlgorithm, HashAlgorithm, MacAlgorithm};
use crate::key_exchange::{KeyExchangeMethod, ECDHE, PSK};

/// How the server proves its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthenticationMethod {
    /// Possession of the pre-shared key.
    Psk,
    /// ECDSA certificate signing the key exchange.
    Ecdsa,
    /// TLS 1.3: negotiated separately from the suite.
    Negotiated,
}

/// Everything the engine needs to know about one suite.
pub struct CiphersuiteInfo {
    pub id: u16,
    pub name: &'static str,
    pub key_exchange: &'static dyn KeyExchangeMethod,
    pub authentication: AuthenticationMethod,
    pub cipher: CipherAlgorithm,
    pub mac: MacAlgorithm,
    pub prf_hash: HashAlgorithm,
    pub tls13: bool,
}

impl CiphersuiteInfo {
    pub const fn key_len(&self) -> usize {
        self.cipher.key_len()
    }

    pub const fn fixed_iv_len(&self) -> usize {
        self.cipher.fixed_iv_len()
    }

    pub const fn mac_len(&self) -> usize {
        self.mac.output_len()
    }

    /// Bytes of TLS 1.2 key block the suite consumes.
    pub const fn key_block_len(&self) -> usize {
        2 * (self.mac.key_len() + self.cipher.key_len() + self.cipher.fixed_iv_len())
    }

    pub fn is_psk(&self) -> bool {
        self.authentication == AuthenticationMethod::Psk
    }
}

impl core::fmt::Debug for CiphersuiteInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} (0x{:04x})", self.name, self.id)
    }
}

impl PartialEq for CiphersuiteInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

const fn tls12(
    id: u16,
    name: &'static str,
    key_exchange: &'static dyn KeyExchangeMethod,
    authentication: AuthenticationMethod,
    cipher: CipherAlgorithm,
    mac: MacAlgorithm,
    prf_hash: HashAlgorithm,
) -> CiphersuiteInfo {
    CiphersuiteInfo {
        id,
        name,
        key_exchange,
        authentication,
        cipher,
        mac,
        prf_hash,
        tls13: false,
    }
}

const fn tls13(
    id: u16,
    name: &'static str,
    key_exchange: &'static dyn KeyExchangeMethod,
    cipher: CipherAlgorithm,
    prf_hash: HashAlgorithm,
) -> CiphersuiteInfo {
    CiphersuiteInfo {
        id,
        name,
        key_exchange,
        authentication: AuthenticationMethod::Negotiated,
        cipher,
        mac: MacAlgorithm::Null,
        prf_hash,
        tls13: true,
    }
}

use AuthenticationMethod::{Ecdsa, Psk as PskAuth};
use CipherAlgorithm as C;
use HashAlgorithm::{Sha256, Sha384};
use MacAlgorithm::{HmacSha256, HmacSha384, Null};

/// Every suite the engine knows.
pub static CIPHERSUITES: &[CiphersuiteInfo] = &[
    tls12(0xC02B, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", &ECDHE, Ecdsa, C::Aes128Gcm, Null, Sha256),
    tls12(0xC02C, "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", &ECDHE, Ecdsa, C::Aes256Gcm, Null, Sha384),
    tls12(0xC023, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256", &ECDHE, Ecdsa, C::Aes128Cbc, HmacSha256, Sha256),
    tls12(0xC024, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384", &ECDHE, Ecdsa, C::Aes256Cbc, HmacSha384, Sha384),
    tls12(0xCCA9, "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", &ECDHE, Ecdsa, C::ChaCha20Poly1305, Null, Sha256),
    tls12(0xC0AC, "TLS_ECDHE_ECDSA_WITH_AES_128_CCM", &ECDHE, Ecdsa, C::Aes128Ccm, Null, Sha256),
    tls12(0xC0AE, "TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8", &ECDHE, Ecdsa, C::Aes128Ccm8, Null, Sha256),
    tls12(0x00A8, "TLS_PSK_WITH_AES_128_GCM_SHA256", &PSK, PskAuth, C::Aes128Gcm, Null, Sha256),
    tls12(0x00AE, "TLS_PSK_WITH_AES_128_CBC_SHA256", &PSK, PskAuth, C::Aes128Cbc, HmacSha256, Sha256),
    tls12(0xC0A4, "TLS_PSK_WITH_AES_128_CCM", &PSK, PskAuth, C::Aes128Ccm, Null, Sha256),
    tls12(0xC0A8, "TLS_PSK_WITH_AES_128_CCM_8", &PSK, PskAuth, C::Aes128Ccm8, Null, Sha256),
    tls12(0xCCAB, "TLS_PSK_WITH_CHACHA20_POLY1305_SHA256", &PSK, PskAuth, C::ChaCha20Poly1305, Null, Sha256),
    tls13(0x1301, "TLS_AES_128_GCM_SHA256", &ECDHE, C::Aes128Gcm, Sha256),
    tls13(0x1302, "TLS_AES_256_GCM_SHA384", &ECDHE, C::Aes256Gcm, Sha384),
    tls13(0x1303, "TLS_CHACHA20_POLY1305_SHA256", &ECDHE, C::ChaCha20Poly1305, Sha256),
    tls13(0x1304, "TLS_AES_128_CCM_SHA256", &ECDHE, C::Aes128Ccm, Sha256),
    tls13(0x1305, "TLS_AES_128_CCM_8_SHA256", &ECDHE, C::Aes128Ccm8, Sha256),
];

/// Descriptor for an IANA suite id.
pub fn lookup(id: u16) -> Option<&'static CiphersuiteInfo> {
    CIPHERSUITES.iter().find(|s| s.id == id)
}
