//! Client side of the handshake.

use rand_core::{CryptoRng, RngCore};

use super::{Outbound, Session};
use crate::ciphersuite::{lookup, CiphersuiteInfo};
use crate::crypto::ecdsa_p256::extract_p256_pubkey_from_cert;
use crate::error::Error;
use crate::handshake::extensions::{encode_client_hello_extensions, parse_extensions};
use crate::handshake::messages::{
    encode_client_hello, parse_certificate, parse_server_hello, parse_server_hello_done,
    write_handshake_header, HANDSHAKE_HEADER_LEN,
};
use crate::handshake::{HandshakeState, HandshakeType};
use crate::key_exchange::NamedGroup;
use crate::record::ProtocolVersion;

/// Most suites listed in one ClientHello.
const MAX_OFFERED_SUITES: usize = 32;
/// ClientHello extension block scratch space.
const CLIENT_EXTENSIONS_LEN: usize = 256;

impl<'a, R: RngCore + CryptoRng> Session<'a, R> {
    pub(super) fn start_client(&mut self) -> Result<(), Error> {
        if self.offered_suites().is_empty() {
            tracing::warn!("no usable ciphersuite configured");
            return Err(Error::HandshakeFailure);
        }
        self.rng.fill_bytes(&mut self.key_material.client_random);
        self.transcript.reset();
        self.queue(Outbound::ClientHello)?;
        self.set_state(HandshakeState::ClientHelloSent);
        Ok(())
    }

    /// Configured suites this client can actually run, in preference order.
    /// PSK suites need at least one registered key.
    fn offered_suites(&self) -> heapless::Vec<&'static CiphersuiteInfo, MAX_OFFERED_SUITES> {
        let have_psk = self.psk_registry.count() > 0;
        self.config
            .ciphersuites
            .iter()
            .filter_map(|&id| lookup(id))
            .filter(|s| !s.tls13 && (!s.is_psk() || have_psk))
            .take(MAX_OFFERED_SUITES)
            .collect()
    }

    pub(super) fn write_client_hello(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        let offered = self.offered_suites();
        let mut ids = heapless::Vec::<u16, MAX_OFFERED_SUITES>::new();
        for suite in &offered {
            ids.push(suite.id).map_err(|_| Error::InvalidParameters)?;
        }
        let groups: &[NamedGroup] = if offered.iter().any(|s| !s.is_psk()) {
            self.config.groups
        } else {
            &[]
        };
        let mut extensions = [0u8; CLIENT_EXTENSIONS_LEN];
        let ext_len = encode_client_hello_extensions(self.config.server_name, groups, &mut extensions)?;
        encode_client_hello(
            ProtocolVersion::Tls12.to_u16(),
            &self.key_material.client_random,
            &[],
            &ids,
            &extensions[..ext_len],
            out,
        )
    }

    pub(super) fn on_server_hello(&mut self, body: &[u8]) -> Result<(), Error> {
        let hello = parse_server_hello(body)?;
        if ProtocolVersion::from_u16(hello.version) != Some(ProtocolVersion::Tls12) {
            tracing::debug!(version = hello.version, "server chose an unsupported version");
            return Err(Error::ProtocolVersion);
        }
        if hello.compression_method != 0 {
            return Err(Error::HandshakeFailure);
        }
        let suite = self
            .offered_suites()
            .into_iter()
            .find(|s| s.id == hello.cipher_suite)
            .ok_or(Error::HandshakeFailure)?;
        parse_extensions(hello.extensions)?;

        self.key_material.server_random = *hello.random;
        self.version = ProtocolVersion::Tls12;
        self.ciphersuite = Some(suite);
        tracing::debug!(suite = suite.name, "server selected ciphersuite");
        self.set_state(HandshakeState::ServerHelloReceived);
        Ok(())
    }

    pub(super) fn on_server_certificate(&mut self, body: &[u8]) -> Result<(), Error> {
        let chain = parse_certificate(body)?;
        let leaf = chain.iter().next().ok_or(Error::BadCertificate)?;

        let pinned = self.config.pinned_certs;
        if !pinned.is_empty() && !pinned.iter().any(|p| *p == leaf) {
            tracing::warn!("server certificate does not match any pinned certificate");
            return Err(Error::BadCertificate);
        }

        if self.certificates.is_allocated() {
            if chain.len() > self.certificates.slot_count() {
                return Err(Error::InsufficientCertificateSpace);
            }
            for (index, der) in chain.iter().enumerate() {
                self.certificates.store(index, der)?;
            }
        }

        self.peer_signing_key = Some(extract_p256_pubkey_from_cert(leaf)?);
        self.set_state(HandshakeState::ServerCertificateReceived);
        Ok(())
    }

    pub(super) fn on_server_key_exchange(&mut self, body: &[u8]) -> Result<(), Error> {
        let suite = self.suite()?;
        let version = self.version;
        suite
            .key_exchange
            .process_server_key_exchange(&mut self.key_exchange_context(version), body)?;
        self.set_state(HandshakeState::ServerKeyExchangeReceived);
        Ok(())
    }

    pub(super) fn on_server_hello_done(&mut self, body: &[u8]) -> Result<(), Error> {
        parse_server_hello_done(body)?;
        self.queue(Outbound::ClientKeyExchange)?;
        self.queue(Outbound::ChangeCipherSpec)?;
        self.queue(Outbound::Finished)?;
        self.set_state(HandshakeState::ClientFinishedSent);
        Ok(())
    }

    pub(super) fn write_client_key_exchange(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if out.len() < HANDSHAKE_HEADER_LEN {
            return Err(Error::BufferTooSmall { needed: HANDSHAKE_HEADER_LEN });
        }
        let suite = self.suite()?;
        let version = self.version;
        let (header, body) = out.split_at_mut(HANDSHAKE_HEADER_LEN);
        let n = suite
            .key_exchange
            .generate_client_key_exchange(&mut self.key_exchange_context(version), body)?;
        write_handshake_header(HandshakeType::ClientKeyExchange, n, header)?;
        Ok(HANDSHAKE_HEADER_LEN + n)
    }
}
