//! Server side of the handshake.

use rand_core::{CryptoRng, RngCore};

use super::{Outbound, Session};
use crate::ciphersuite::{lookup, CiphersuiteInfo};
use crate::error::Error;
use crate::handshake::extensions::{
    allows_ecdsa_p256_sha256, find_extension, parse_extensions, parse_sni_extension,
    parse_supported_groups, EXT_EC_POINT_FORMATS, EXT_SUPPORTED_GROUPS,
};
use crate::handshake::messages::{
    encode_certificate, encode_message, encode_server_hello, parse_client_hello,
    write_handshake_header, ClientHello, HANDSHAKE_HEADER_LEN,
};
use crate::handshake::{HandshakeState, HandshakeType};
use crate::key_exchange::NamedGroup;
use crate::record::ProtocolVersion;

/// ec_point_formats extension carrying only "uncompressed".
const EC_POINT_FORMATS_UNCOMPRESSED: [u8; 6] = [
    (EXT_EC_POINT_FORMATS >> 8) as u8,
    EXT_EC_POINT_FORMATS as u8,
    0,
    2,
    1,
    0,
];

/// What the client offered beyond its suite list.
struct ClientOffer<'c> {
    /// `None` when the client sent no supported_groups extension.
    groups: Option<&'c [NamedGroup]>,
    ecdsa_p256: bool,
}

impl<'a, R: RngCore + CryptoRng> Session<'a, R> {
    pub(super) fn on_client_hello(&mut self, body: &[u8]) -> Result<(), Error> {
        let hello = parse_client_hello(body)?;
        if hello.version < ProtocolVersion::Tls12.to_u16() {
            tracing::debug!(version = hello.version, "client version too old");
            return Err(Error::ProtocolVersion);
        }
        if !hello.compression_methods.contains(&0) {
            return Err(Error::HandshakeFailure);
        }

        let extensions = parse_extensions(hello.extensions)?;
        match parse_sni_extension(&extensions) {
            Ok(name) => {
                tracing::debug!(len = name.len(), "client sent SNI");
                self.server_name = name;
            }
            Err(Error::ExtensionNotFound) => {}
            Err(e) => return Err(e),
        }
        let client_groups = find_extension(&extensions, EXT_SUPPORTED_GROUPS)
            .map(|ext| parse_supported_groups(ext.data))
            .transpose()?;
        let offer = ClientOffer {
            groups: client_groups.as_deref(),
            ecdsa_p256: allows_ecdsa_p256_sha256(&extensions)?,
        };

        let suite = self.select_suite(&hello, &offer).ok_or_else(|| {
            tracing::debug!("no ciphersuite in common with client");
            Error::HandshakeFailure
        })?;
        if !suite.is_psk() {
            let group = self.common_group(&offer).ok_or(Error::HandshakeFailure)?;
            self.ecdhe.select_group(group);
        }

        self.key_material.client_random = *hello.random;
        self.rng.fill_bytes(&mut self.key_material.server_random);
        self.version = ProtocolVersion::Tls12;
        self.ciphersuite = Some(suite);
        tracing::debug!(suite = suite.name, "ciphersuite negotiated");

        self.queue(Outbound::ServerHello)?;
        if !suite.is_psk() {
            self.queue(Outbound::Certificate)?;
        }
        self.queue(Outbound::ServerKeyExchange)?;
        self.queue(Outbound::ServerHelloDone)?;
        self.set_state(HandshakeState::ServerHelloDoneSent);
        Ok(())
    }

    /// First configured suite the client also offers and this server can
    /// serve with its keys.
    fn select_suite(&self, hello: &ClientHello<'_>, offer: &ClientOffer<'_>) -> Option<&'static CiphersuiteInfo> {
        self.config
            .ciphersuites
            .iter()
            .filter(|&&id| hello.offers_suite(id))
            .filter_map(|&id| lookup(id))
            .find(|suite| !suite.tls13 && self.can_serve(suite, offer))
    }

    fn can_serve(&self, suite: &CiphersuiteInfo, offer: &ClientOffer<'_>) -> bool {
        if suite.is_psk() {
            return self.psk_registry.count() > 0;
        }
        self.config.signing_key.is_some()
            && !self.config.certificate_chain.is_empty()
            && offer.ecdsa_p256
            && self.common_group(offer).is_some()
    }

    fn common_group(&self, offer: &ClientOffer<'_>) -> Option<NamedGroup> {
        self.config
            .groups
            .iter()
            .copied()
            .find(|g| offer.groups.map_or(true, |client| client.contains(g)))
    }

    pub(super) fn write_server_hello(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        let suite = self.suite()?;
        let extensions: &[u8] = if suite.is_psk() {
            &[]
        } else {
            &EC_POINT_FORMATS_UNCOMPRESSED
        };
        encode_server_hello(
            self.version.to_u16(),
            &self.key_material.server_random,
            &[],
            suite.id,
            extensions,
            out,
        )
    }

    pub(super) fn write_certificate(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        encode_certificate(self.config.certificate_chain, out)
    }

    /// Full ServerKeyExchange message, or 0 when the key exchange has
    /// nothing to say (a PSK server without a hint).
    pub(super) fn write_server_key_exchange_message(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if out.len() < HANDSHAKE_HEADER_LEN {
            return Err(Error::BufferTooSmall { needed: HANDSHAKE_HEADER_LEN });
        }
        let (header, body) = out.split_at_mut(HANDSHAKE_HEADER_LEN);
        let n = self.write_server_key_exchange(body)?;
        if n == 0 {
            return Ok(0);
        }
        write_handshake_header(HandshakeType::ServerKeyExchange, n, header)?;
        Ok(HANDSHAKE_HEADER_LEN + n)
    }

    pub(super) fn write_server_hello_done(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        encode_message(HandshakeType::ServerHelloDone, &[], out)
    }

    pub(super) fn on_client_key_exchange(&mut self, body: &[u8]) -> Result<(), Error> {
        let suite = self.suite()?;
        let version = self.version;
        suite
            .key_exchange
            .process_client_key_exchange(&mut self.key_exchange_context(version), body)?;
        self.establish_keys()?;
        self.set_state(HandshakeState::ClientKeyExchangeReceived);
        Ok(())
    }
}
