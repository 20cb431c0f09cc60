//! TLS 1.2 session: handshake controller and record protection for one peer.
//!
//! A [`Session`] is owned and driven by one thread. It borrows its
//! configuration, the shared [`PskRegistry`] and, optionally, caller memory
//! for received certificates. All network I/O goes through a [`Transport`].

mod client;
mod controller;
mod io;
mod server;

use rand_core::{CryptoRng, RngCore};

use crate::buf::{Buf, BufExt};
use crate::certificate::RemoteCertificateStore;
use crate::ciphersuite::CiphersuiteInfo;
use crate::config::{SessionConfig, HANDSHAKE_BUF_SIZE, MAX_FRAGMENT_LEN, RECORD_BUF_SIZE};
use crate::crypto::ecdsa_p256::P256_POINT_LEN;
use crate::crypto::RecordMac;
use crate::error::Error;
use crate::handshake::{DnsName, HandshakeState, Role, TranscriptHash};
use crate::key_exchange::{EcdheState, KeyExchangeContext};
use crate::key_material::KeyMaterial;
use crate::packet::{Packet, PacketAllocator, WaitOption};
use crate::psk::PskRegistry;
use crate::record::{record_iv_size, ProtocolVersion, RecordProtection, RECORD_HEADER_LEN};
use crate::transport::Transport;

/// Received bytes not yet framed: up to one partial record plus one packet.
const RECV_BUF_SIZE: usize = 2 * RECORD_BUF_SIZE;
/// Messages in the largest flight (client: CKE, CCS, Finished; server: SH..SHD).
const MAX_FLIGHT: usize = 8;

/// Handshake messages waiting to be written, built when flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outbound {
    ClientHello,
    ServerHello,
    Certificate,
    ServerKeyExchange,
    ServerHelloDone,
    ClientKeyExchange,
    ChangeCipherSpec,
    Finished,
}

pub struct Session<'a, R> {
    role: Role,
    config: SessionConfig<'a>,
    psk_registry: &'a PskRegistry,
    rng: R,

    state: HandshakeState,
    version: ProtocolVersion,
    ciphersuite: Option<&'static CiphersuiteInfo>,

    key_material: KeyMaterial,
    ecdhe: EcdheState,
    transcript: TranscriptHash,
    record_mac: RecordMac,

    local_session_active: bool,
    remote_session_active: bool,
    tx: Option<RecordProtection>,
    rx: Option<RecordProtection>,
    pending_tx: Option<RecordProtection>,
    pending_rx: Option<RecordProtection>,

    certificates: RemoteCertificateStore<'a>,
    peer_signing_key: Option<[u8; P256_POINT_LEN]>,
    server_name: DnsName,

    recv_buf: Buf<RECV_BUF_SIZE>,
    hs_buf: Buf<HANDSHAKE_BUF_SIZE>,
    app_buf: Buf<MAX_FRAGMENT_LEN>,
    outbound: heapless::Deque<Outbound, MAX_FLIGHT>,

    /// The peer's Finished checked out; the handshake completes once our
    /// own final flight is on the wire.
    peer_finished: bool,
    peer_closed: bool,
    local_closed: bool,
}

impl<'a, R: RngCore + CryptoRng> Session<'a, R> {
    pub fn new_client(config: SessionConfig<'a>, psk_registry: &'a PskRegistry, rng: R) -> Self {
        Self::new(Role::Client, config, psk_registry, rng)
    }

    pub fn new_server(config: SessionConfig<'a>, psk_registry: &'a PskRegistry, rng: R) -> Self {
        Self::new(Role::Server, config, psk_registry, rng)
    }

    fn new(role: Role, config: SessionConfig<'a>, psk_registry: &'a PskRegistry, rng: R) -> Self {
        Self {
            role,
            config,
            psk_registry,
            rng,
            state: HandshakeState::Idle,
            version: ProtocolVersion::Tls12,
            ciphersuite: None,
            key_material: KeyMaterial::new(),
            ecdhe: EcdheState::new(),
            transcript: TranscriptHash::new(),
            record_mac: RecordMac::new(),
            local_session_active: false,
            remote_session_active: false,
            tx: None,
            rx: None,
            pending_tx: None,
            pending_rx: None,
            certificates: RemoteCertificateStore::empty(),
            peer_signing_key: None,
            server_name: DnsName::new(),
            recv_buf: Buf::new(),
            hs_buf: Buf::new(),
            app_buf: Buf::new(),
            outbound: heapless::Deque::new(),
            peer_finished: false,
            peer_closed: false,
            local_closed: false,
        }
    }

    /// Explicit IV bytes each outgoing record carries right now.
    ///
    /// Zero until the local side has sent ChangeCipherSpec.
    pub fn session_iv_size(&self) -> Result<usize, Error> {
        if !self.local_session_active {
            return Ok(0);
        }
        let suite = self.suite()?;
        Ok(record_iv_size(suite.cipher, self.version))
    }

    /// Allocate a packet framed for one outgoing record: a record header
    /// region followed by a zero-filled explicit IV region.
    ///
    /// The packet is released back to `pool` on any failure.
    pub fn allocate_record_packet<A: PacketAllocator + ?Sized>(
        &self,
        pool: &A,
        wait: WaitOption,
    ) -> Result<Packet, Error> {
        let mut packet = pool.allocate(wait)?;
        match self.frame_record_packet(&mut packet) {
            Ok(()) => Ok(packet),
            Err(e) => {
                pool.release(packet);
                Err(e)
            }
        }
    }

    fn frame_record_packet(&self, packet: &mut Packet) -> Result<(), Error> {
        let iv_len = self.session_iv_size()?;
        let capacity = packet.capacity();
        if capacity < RECORD_HEADER_LEN + 2 {
            return Err(Error::BufferTooSmall { needed: RECORD_HEADER_LEN + 2 });
        }
        if iv_len > 0 && capacity < RECORD_HEADER_LEN + iv_len {
            return Err(Error::BufferTooSmall { needed: RECORD_HEADER_LEN + iv_len });
        }
        packet.clear();
        packet.reserve_record_regions(RECORD_HEADER_LEN, iv_len)
    }

    /// Finish the running record MAC into `out`, returning the MAC length.
    pub fn compute_record_mac(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        self.suite()?;
        self.record_mac.calculate(out)
    }

    /// Run the negotiated key exchange's premaster computation for
    /// `protocol_id` (a wire version such as `0x0303`).
    pub fn generate_premaster_secret(&mut self, protocol_id: u16) -> Result<(), Error> {
        let suite = self.suite()?;
        let version = ProtocolVersion::from_u16(protocol_id).ok_or(Error::ProtocolVersion)?;
        suite
            .key_exchange
            .generate_premaster_secret(&mut self.key_exchange_context(version))
    }

    /// Write the ServerKeyExchange body for the negotiated suite into the
    /// free tail of `packet` and advance it by the bytes written.
    pub fn generate_server_key_exchange(&mut self, packet: &mut Packet) -> Result<usize, Error> {
        let written = self.write_server_key_exchange(packet.append_region())?;
        packet.advance(written)?;
        Ok(written)
    }

    pub(crate) fn write_server_key_exchange(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        let suite = self.suite()?;
        let version = self.version;
        suite
            .key_exchange
            .generate_server_key_exchange(&mut self.key_exchange_context(version), out)
    }

    /// Add a pre-shared key to the registry this session uses.
    pub fn add_psk(&self, psk: &[u8], identity: &[u8], hint: &[u8]) -> Result<(), Error> {
        self.psk_registry.add_psk(psk, identity, hint)
    }

    /// Lend memory for the peer's certificate chain, split into `cert_count` slots.
    pub fn remote_certificate_buffer_allocate(
        &mut self,
        cert_count: usize,
        buffer: &'a mut [u8],
    ) -> Result<(), Error> {
        self.certificates = RemoteCertificateStore::allocate(cert_count, buffer)?;
        Ok(())
    }

    /// Encrypt and send application data, split into records of at most 2^14 bytes.
    pub fn send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        data: &[u8],
        wait: WaitOption,
    ) -> Result<usize, Error> {
        if self.state != HandshakeState::HandshakeFinished
            || self.local_closed
            || !self.outbound.is_empty()
            || self.tx.is_none()
        {
            return Err(Error::InvalidState);
        }
        self.send_application_data(transport, data, wait)
            .map_err(|e| self.abort(transport, e))?;
        Ok(data.len())
    }

    /// Read decrypted application data into `buf`.
    ///
    /// Returns [`Error::NoPacket`] when nothing arrived within `wait` and
    /// [`Error::Closed`] once the peer has sent close_notify.
    pub fn receive<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        buf: &mut [u8],
        wait: WaitOption,
    ) -> Result<usize, Error> {
        if self.state != HandshakeState::HandshakeFinished {
            return Err(Error::InvalidState);
        }
        loop {
            if !self.app_buf.buf_is_empty() {
                let n = core::cmp::min(buf.len(), self.app_buf.buf_len());
                buf[..n].copy_from_slice(&self.app_buf.buf_as_slice()[..n]);
                self.app_buf.buf_drain_front(n);
                return Ok(n);
            }
            if self.peer_closed {
                return Err(Error::Closed);
            }
            match self.process_next_record() {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => return Err(self.abort(transport, e)),
            }
            let packet = transport
                .receive(wait)
                .map_err(|e| self.abort(transport, e))?;
            self.absorb(transport, packet)
                .map_err(|e| self.abort(transport, e))?;
        }
    }

    /// Send close_notify. The session stays readable until the peer closes.
    pub fn end<T: Transport + ?Sized>(&mut self, transport: &mut T, wait: WaitOption) -> Result<(), Error> {
        if self.state == HandshakeState::Failed {
            return Err(Error::InvalidState);
        }
        if self.local_closed {
            return Ok(());
        }
        self.local_closed = true;
        tracing::debug!(role = ?self.role, "sending close_notify");
        self.send_alert(
            transport,
            crate::handshake::AlertLevel::Warning,
            crate::handshake::AlertDescription::CloseNotify,
            wait,
        )
    }

    /// Scrub all secrets and return to `Idle`. Certificate slots stay lent.
    pub fn reset(&mut self) {
        self.state = HandshakeState::Idle;
        self.version = ProtocolVersion::Tls12;
        self.ciphersuite = None;
        self.key_material.reset();
        self.ecdhe.reset();
        self.transcript.reset();
        self.record_mac.reset();
        self.local_session_active = false;
        self.remote_session_active = false;
        self.tx = None;
        self.rx = None;
        self.pending_tx = None;
        self.pending_rx = None;
        self.certificates.clear();
        self.peer_signing_key = None;
        self.server_name.clear();
        self.recv_buf.buf_clear();
        self.hs_buf.buf_clear();
        self.app_buf.buf_clear();
        self.outbound.clear();
        self.peer_finished = false;
        self.peer_closed = false;
        self.local_closed = false;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn ciphersuite(&self) -> Option<&'static CiphersuiteInfo> {
        self.ciphersuite
    }

    pub fn local_session_active(&self) -> bool {
        self.local_session_active
    }

    pub fn remote_session_active(&self) -> bool {
        self.remote_session_active
    }

    /// Host name the client asked for via SNI (server side).
    pub fn server_name(&self) -> Option<&[u8]> {
        (!self.server_name.is_empty()).then_some(self.server_name.as_slice())
    }

    /// Certificate `index` of the peer's chain, if it was kept.
    pub fn remote_certificate(&self, index: usize) -> Option<&[u8]> {
        self.certificates.get(index)
    }

    pub fn remote_certificate_count(&self) -> usize {
        self.certificates.stored_count()
    }

    /// Identity of the PSK the handshake settled on.
    pub fn psk_identity(&self) -> Option<&[u8]> {
        self.key_material
            .has_psk()
            .then(|| self.key_material.psk_identity())
    }

    fn suite(&self) -> Result<&'static CiphersuiteInfo, Error> {
        self.ciphersuite.ok_or(Error::UnknownCiphersuite)
    }

    fn is_psk_suite(&self) -> bool {
        self.ciphersuite.is_some_and(|s| s.is_psk())
    }

    fn set_state(&mut self, next: HandshakeState) {
        tracing::debug!(role = ?self.role, from = ?self.state, to = ?next, "handshake state");
        self.state = next;
    }

    fn queue(&mut self, message: Outbound) -> Result<(), Error> {
        self.outbound.push_back(message).map_err(|_| Error::InvalidState)
    }

    fn key_exchange_context(&mut self, version: ProtocolVersion) -> KeyExchangeContext<'_> {
        KeyExchangeContext {
            role: self.role,
            version,
            tls13: version == ProtocolVersion::Tls13,
            key_material: &mut self.key_material,
            ecdhe: &mut self.ecdhe,
            psk_registry: self.psk_registry,
            groups: self.config.groups,
            signing_key: self.config.signing_key,
            peer_signing_key: self.peer_signing_key.as_ref(),
            rng: &mut self.rng,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ciphersuite::lookup;
    use crate::packet::PacketPool;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session(registry: &PskRegistry) -> Session<'_, StdRng> {
        Session::new_client(SessionConfig::new(), registry, StdRng::seed_from_u64(1))
    }

    #[test]
    fn iv_size_zero_until_local_side_active() {
        let registry = PskRegistry::new();
        let mut s = session(&registry);
        assert_eq!(s.session_iv_size(), Ok(0));
        s.local_session_active = true;
        assert_eq!(s.session_iv_size(), Err(Error::UnknownCiphersuite));
        s.ciphersuite = lookup(0xC02B);
        assert_eq!(s.session_iv_size(), Ok(8));
        s.ciphersuite = lookup(0xC023);
        assert_eq!(s.session_iv_size(), Ok(16));
        s.ciphersuite = lookup(0xCCA9);
        assert_eq!(s.session_iv_size(), Ok(0));
        s.version = ProtocolVersion::Tls10;
        s.ciphersuite = lookup(0xC023);
        assert_eq!(s.session_iv_size(), Ok(0));
    }

    #[test]
    fn record_packet_regions() {
        let registry = PskRegistry::new();
        let pool = PacketPool::new(64, 2);
        let mut s = session(&registry);
        s.local_session_active = true;
        s.ciphersuite = lookup(0xC02B);
        let p = s.allocate_record_packet(&pool, WaitOption::NoWait).unwrap();
        assert_eq!(p.header_len(), RECORD_HEADER_LEN);
        assert_eq!(p.iv_len(), 8);
        assert_eq!(p.len(), 13);
        pool.release(p);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn record_packet_too_small_is_released() {
        let registry = PskRegistry::new();
        let s = session(&registry);
        let pool = PacketPool::new(RECORD_HEADER_LEN + 1, 1);
        assert_eq!(
            s.allocate_record_packet(&pool, WaitOption::NoWait).unwrap_err(),
            Error::BufferTooSmall { needed: RECORD_HEADER_LEN + 2 }
        );
        assert_eq!(pool.allocations(), 1);
        assert_eq!(pool.releases(), 1);
    }

    #[test]
    fn record_packet_iv_failure_is_released() {
        let registry = PskRegistry::new();
        let mut s = session(&registry);
        s.local_session_active = true;
        let pool = PacketPool::new(64, 1);
        assert_eq!(
            s.allocate_record_packet(&pool, WaitOption::NoWait).unwrap_err(),
            Error::UnknownCiphersuite
        );
        assert_eq!(pool.in_use(), 0);

        s.ciphersuite = lookup(0xC023);
        let pool = PacketPool::new(RECORD_HEADER_LEN + 8, 1);
        assert_eq!(
            s.allocate_record_packet(&pool, WaitOption::NoWait).unwrap_err(),
            Error::BufferTooSmall { needed: RECORD_HEADER_LEN + 16 }
        );
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn cipher_operations_need_a_suite() {
        let registry = PskRegistry::new();
        let mut s = session(&registry);
        let mut out = [0u8; 48];
        assert_eq!(s.compute_record_mac(&mut out), Err(Error::UnknownCiphersuite));
        assert_eq!(s.generate_premaster_secret(0x0303), Err(Error::UnknownCiphersuite));
        let mut p = Packet::with_capacity(64).unwrap();
        assert_eq!(s.generate_server_key_exchange(&mut p), Err(Error::UnknownCiphersuite));
        assert!(p.is_empty());
    }

    #[test]
    fn premaster_rejects_unknown_version() {
        let registry = PskRegistry::new();
        let mut s = session(&registry);
        s.ciphersuite = lookup(0x00A8);
        assert_eq!(s.generate_premaster_secret(0x0200), Err(Error::ProtocolVersion));
    }

    #[test]
    fn psk_premaster_through_session() {
        let registry = PskRegistry::new();
        let mut s = session(&registry);
        s.ciphersuite = lookup(0x00A8);
        s.key_material.set_psk(b"abc", b"id1").unwrap();
        s.generate_premaster_secret(0x0303).unwrap();
        assert_eq!(
            s.key_material.pre_master(),
            &[0, 3, 0, 0, 0, 0, 3, b'a', b'b', b'c']
        );
    }

    #[test]
    fn record_mac_length_follows_suite() {
        let registry = PskRegistry::new();
        let mut s = session(&registry);
        s.ciphersuite = lookup(0xC024);
        let key = [1u8; 48];
        s.record_mac
            .begin(crate::crypto::MacAlgorithm::HmacSha384, &key, 0, 23, 0x0303, 3)
            .unwrap();
        s.record_mac.update(b"abc").unwrap();
        let mut out = [0u8; 48];
        assert_eq!(s.compute_record_mac(&mut out), Ok(48));
        assert!(!s.record_mac.is_active());
    }

    #[test]
    fn server_key_exchange_advances_packet() {
        let registry = PskRegistry::new();
        registry.add_psk(b"secret", b"id", b"hint").unwrap();
        let mut s = Session::new_server(SessionConfig::new(), &registry, StdRng::seed_from_u64(2));
        s.ciphersuite = lookup(0x00A8);
        let mut p = Packet::with_capacity(64).unwrap();
        p.reserve_record_regions(RECORD_HEADER_LEN, 0).unwrap();
        let n = s.generate_server_key_exchange(&mut p).unwrap();
        assert_eq!(n, 6);
        assert_eq!(p.len(), RECORD_HEADER_LEN + 6);
        assert_eq!(p.payload(), b"\x00\x04hint");
    }

    #[test]
    fn certificate_buffer_bounds() {
        let registry = PskRegistry::new();
        let mut exact = [0u8; 3 * (8 + 256)];
        let mut short = [0u8; 3 * (8 + 256) - 1];
        let mut s = session(&registry);
        assert_eq!(
            s.remote_certificate_buffer_allocate(3, &mut short),
            Err(Error::InvalidParameters)
        );
        assert_eq!(s.remote_certificate_buffer_allocate(3, &mut exact), Ok(()));
        assert_eq!(s.remote_certificate_count(), 0);
        assert_eq!(s.certificates.slot_count(), 3);
        assert_eq!(s.certificates.slot_capacity(), 256);
    }

    #[test]
    fn add_psk_goes_to_registry() {
        let registry = PskRegistry::new();
        let s = session(&registry);
        s.add_psk(b"abc", b"id1", b"h1").unwrap();
        assert_eq!(registry.count(), 1);
        assert_eq!(s.add_psk(b"abc", &[b'x'; 21], b"h2"), Err(Error::NoMorePskSpace));
        assert_eq!(registry.count(), 1);
    }
}
