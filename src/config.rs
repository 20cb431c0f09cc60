//! Session configuration and compile-time limits.

use crate::key_exchange::NamedGroup;

/// PSK table slots.
pub const MAX_PSK_KEYS: usize = 5;
/// Longest pre-shared secret.
pub const MAX_PSK_SIZE: usize = 64;
/// Longest PSK identity or identity hint.
pub const MAX_PSK_ID_SIZE: usize = 20;
/// Longest SNI host name kept by the server.
pub const MAX_DNS_NAME_LEN: usize = 100;
/// Most remote certificates the store can hold.
pub const MAX_REMOTE_CERTIFICATES: usize = 8;
/// Smallest per-certificate slice the store accepts.
pub const MINIMUM_CERTIFICATE_SIZE: usize = 256;
/// Per-slot bookkeeping prefix in the remote certificate buffer.
pub const CERTIFICATE_CONTROL_BLOCK_LEN: usize = 8;

/// Largest TLSPlaintext fragment.
pub const MAX_FRAGMENT_LEN: usize = 16384;
/// Largest TLSCiphertext fragment (RFC 5246 section 6.2.3).
pub const MAX_CIPHERTEXT_LEN: usize = MAX_FRAGMENT_LEN + 2048;
/// Record reassembly buffer.
pub const RECORD_BUF_SIZE: usize = 5 + MAX_CIPHERTEXT_LEN;
/// Handshake message reassembly buffer.
pub const HANDSHAKE_BUF_SIZE: usize = 8192;
/// Largest packet handed out by [`crate::packet::PacketPool`].
pub const MAX_PACKET_SIZE: usize = RECORD_BUF_SIZE;

/// Suites offered or accepted when the caller does not choose, in preference order.
pub const DEFAULT_CIPHERSUITES: &[u16] = &[
    0xC02B, // ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    0xCCA9, // ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
    0xC02C, // ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
    0xC0AC, // ECDHE_ECDSA_WITH_AES_128_CCM
    0xC0AE, // ECDHE_ECDSA_WITH_AES_128_CCM_8
    0xC023, // ECDHE_ECDSA_WITH_AES_128_CBC_SHA256
    0xC024, // ECDHE_ECDSA_WITH_AES_256_CBC_SHA384
    0x00A8, // PSK_WITH_AES_128_GCM_SHA256
    0xCCAB, // PSK_WITH_CHACHA20_POLY1305_SHA256
    0xC0A4, // PSK_WITH_AES_128_CCM
    0xC0A8, // PSK_WITH_AES_128_CCM_8
    0x00AE, // PSK_WITH_AES_128_CBC_SHA256
];

pub const DEFAULT_GROUPS: &[NamedGroup] = &[NamedGroup::X25519, NamedGroup::Secp256r1];

/// Configuration for one session.
///
/// Clients use `server_name` and `pinned_certs`; servers use
/// `certificate_chain` and `signing_key`. Both use `ciphersuites` and
/// `groups`, in preference order. With an empty `pinned_certs` the client
/// accepts any server certificate carrying a P-256 key.
#[derive(Clone, Copy)]
pub struct SessionConfig<'a> {
    pub ciphersuites: &'a [u16],
    pub groups: &'a [NamedGroup],
    pub server_name: Option<&'a str>,
    pub pinned_certs: &'a [&'a [u8]],
    pub certificate_chain: &'a [&'a [u8]],
    pub signing_key: Option<&'a [u8; 32]>,
}

impl<'a> SessionConfig<'a> {
    pub const fn new() -> Self {
        Self {
            ciphersuites: DEFAULT_CIPHERSUITES,
            groups: DEFAULT_GROUPS,
            server_name: None,
            pinned_certs: &[],
            certificate_chain: &[],
            signing_key: None,
        }
    }

    pub fn with_ciphersuites(mut self, ciphersuites: &'a [u16]) -> Self {
        self.ciphersuites = ciphersuites;
        self
    }

    pub fn with_groups(mut self, groups: &'a [NamedGroup]) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_server_name(mut self, name: &'a str) -> Self {
        self.server_name = Some(name);
        self
    }

    pub fn with_pinned_certs(mut self, certs: &'a [&'a [u8]]) -> Self {
        self.pinned_certs = certs;
        self
    }

    /// Leaf first. The leaf must carry the P-256 key matching `signing_key`.
    pub fn with_certificate(mut self, chain: &'a [&'a [u8]], signing_key: &'a [u8; 32]) -> Self {
        self.certificate_chain = chain;
        self.signing_key = Some(signing_key);
        self
    }
}

impl Default for SessionConfig<'_> {
    fn default() -> Self {
        Self::new()
    }
}
