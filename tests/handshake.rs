//! End-to-end TLS 1.2 sessions over the in-memory channel transport,
//! exercising the public API only.
//!
//! Most tests drive client and server in lockstep on one thread with
//! `WaitOption::NoWait`; one runs each side on its own thread with blocking
//! waits. Every test checks that the shared packet pool ends balanced.

extern crate std;

use std::cell::Cell;
use std::sync::LazyLock;
use std::vec::Vec;

use milli_tls::crypto::ecdsa_p256::{build_p256_cert_der, p256_public_key_from_scalar};
use milli_tls::transport::channel::{channel_pair, ChannelTransport};
use milli_tls::{
    AlertDescription, Error, HandshakeState, HandshakeStatus, Packet, PacketAllocator, PacketPool,
    PskRegistry, Session, SessionConfig, Transport, WaitOption,
};
use milli_tls::config::MAX_PACKET_SIZE;
use rand::rngs::StdRng;
use rand::SeedableRng;

// =========================================================================
// Test infrastructure
// =========================================================================

/// P-256 private scalar of the test server.
const SERVER_KEY: [u8; 32] = [0x42; 32];

fn server_cert() -> &'static [u8] {
    static V: LazyLock<Vec<u8>> = LazyLock::new(|| {
        let public = p256_public_key_from_scalar(&SERVER_KEY).unwrap();
        let mut buf = [0u8; 512];
        let len = build_p256_cert_der(&public, &mut buf).unwrap();
        buf[..len].to_vec()
    });
    &V
}

fn server_chain() -> &'static [&'static [u8]] {
    static V: LazyLock<Vec<&'static [u8]>> = LazyLock::new(|| vec![server_cert()]);
    &V
}

type TestSession<'a> = Session<'a, StdRng>;

/// Send session logs to the test output; filter with `RUST_LOG`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Channel end whose allocator can be switched off to simulate an empty pool
/// on one side only.
struct Starvable<'p> {
    inner: ChannelTransport<'p>,
    starved: Cell<bool>,
}

impl<'p> Starvable<'p> {
    fn new(inner: ChannelTransport<'p>) -> Self {
        Self { inner, starved: Cell::new(false) }
    }
}

impl PacketAllocator for Starvable<'_> {
    fn allocate(&self, wait: WaitOption) -> Result<Packet, Error> {
        if self.starved.get() {
            return Err(Error::NoPacket);
        }
        self.inner.allocate(wait)
    }

    fn release(&self, packet: Packet) {
        self.inner.release(packet)
    }
}

impl Transport for Starvable<'_> {
    fn receive(&mut self, wait: WaitOption) -> Result<Packet, Error> {
        self.inner.receive(wait)
    }

    fn send(&mut self, packet: Packet, wait: WaitOption) -> Result<(), Error> {
        self.inner.send(packet, wait)
    }
}

fn client<'a>(config: SessionConfig<'a>, registry: &'a PskRegistry) -> TestSession<'a> {
    Session::new_client(config, registry, StdRng::seed_from_u64(0x10))
}

fn server<'a>(config: SessionConfig<'a>, registry: &'a PskRegistry) -> TestSession<'a> {
    Session::new_server(config, registry, StdRng::seed_from_u64(0x50))
}

fn server_config<'a>() -> SessionConfig<'a> {
    SessionConfig::new().with_certificate(server_chain(), &SERVER_KEY)
}

fn pool() -> PacketPool {
    PacketPool::new(MAX_PACKET_SIZE, 16)
}

/// Drive both sides with `NoWait` until both report `Complete` or one fails.
fn lockstep(
    client: &mut TestSession<'_>,
    ct: &mut ChannelTransport<'_>,
    server: &mut TestSession<'_>,
    st: &mut ChannelTransport<'_>,
) -> Result<(), (&'static str, Error)> {
    init_logging();
    for _ in 0..8 {
        let c = client
            .process_handshake(ct, WaitOption::NoWait)
            .map_err(|e| ("client", e))?;
        let s = server
            .process_handshake(st, WaitOption::NoWait)
            .map_err(|e| ("server", e))?;
        if c == HandshakeStatus::Complete && s == HandshakeStatus::Complete {
            return Ok(());
        }
    }
    panic!("handshake did not converge");
}

/// Release everything still queued on a transport.
fn drain(t: &mut ChannelTransport<'_>) {
    while let Ok(p) = t.receive(WaitOption::NoWait) {
        t.release(p);
    }
}

fn assert_balanced(pool: &PacketPool) {
    assert_eq!(pool.in_use(), 0, "packets leaked");
    assert_eq!(pool.allocations(), pool.releases());
}

/// Send `data` from `tx` and read it back on `rx`.
fn transfer(
    tx: &mut TestSession<'_>,
    tx_t: &mut ChannelTransport<'_>,
    rx: &mut TestSession<'_>,
    rx_t: &mut ChannelTransport<'_>,
    data: &[u8],
) -> Vec<u8> {
    assert_eq!(tx.send(tx_t, data, WaitOption::NoWait).unwrap(), data.len());
    let mut out = Vec::new();
    let mut buf = [0u8; 1500];
    while out.len() < data.len() {
        let n = rx.receive(rx_t, &mut buf, WaitOption::NoWait).unwrap();
        out.extend_from_slice(&buf[..n]);
    }
    out
}

// =========================================================================
// ECDHE-ECDSA
// =========================================================================

#[test]
fn ecdhe_handshake_every_suite() {
    for id in [0xC02B, 0xC02C, 0xC023, 0xC024, 0xCCA9, 0xC0AC, 0xC0AE] {
        let suites = [id];
        let registry = PskRegistry::new();
        let pool = pool();
        let (mut ct, mut st) = channel_pair(&pool);
        let mut c = client(SessionConfig::new().with_ciphersuites(&suites), &registry);
        let mut s = server(server_config().with_ciphersuites(&suites), &registry);

        lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();
        assert_eq!(c.state(), HandshakeState::HandshakeFinished);
        assert_eq!(s.state(), HandshakeState::HandshakeFinished);
        assert_eq!(c.ciphersuite().map(|s| s.id), Some(id));
        assert_eq!(s.ciphersuite().map(|s| s.id), Some(id));
        assert!(c.local_session_active() && c.remote_session_active());
        assert!(s.local_session_active() && s.remote_session_active());

        let up = transfer(&mut c, &mut ct, &mut s, &mut st, b"GET /status");
        assert_eq!(up, b"GET /status");
        let down = transfer(&mut s, &mut st, &mut c, &mut ct, b"200 OK");
        assert_eq!(down, b"200 OK");

        drain(&mut ct);
        drain(&mut st);
        assert_balanced(&pool);
    }
}

#[test]
fn explicit_iv_size_follows_cipher() {
    for (id, iv) in [(0xC02B, 8), (0xC023, 16), (0xCCA9, 0)] {
        let suites = [id];
        let registry = PskRegistry::new();
        let pool = pool();
        let (mut ct, mut st) = channel_pair(&pool);
        let mut c = client(SessionConfig::new().with_ciphersuites(&suites), &registry);
        let mut s = server(server_config().with_ciphersuites(&suites), &registry);
        assert_eq!(c.session_iv_size(), Ok(0));

        lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();
        assert_eq!(c.session_iv_size(), Ok(iv));
        assert_eq!(s.session_iv_size(), Ok(iv));

        let p = c.allocate_record_packet(&ct, WaitOption::NoWait).unwrap();
        assert_eq!(p.iv_len(), iv);
        ct.release(p);
        assert_balanced(&pool);
    }
}

#[test]
fn threaded_handshake_and_echo() {
    init_logging();
    let registry = PskRegistry::new();
    let registry = &registry;
    let pool = pool();
    let (mut ct, st) = channel_pair(&pool);
    // The server thread owns its end, so a server failure disconnects the
    // link and the client's unbounded waits return instead of hanging.
    let server_wait = WaitOption::Ticks(5_000);
    let client_wait = WaitOption::Forever;

    let mut st = std::thread::scope(|scope| {
        let server_thread = scope.spawn(move || {
            let mut st = st;
            let mut s = server(server_config(), registry);
            assert_eq!(
                s.process_handshake(&mut st, server_wait),
                Ok(HandshakeStatus::Complete)
            );
            let name = s.server_name().map(|n| n.to_vec());

            let mut buf = [0u8; 256];
            let n = s.receive(&mut st, &mut buf, server_wait).unwrap();
            s.send(&mut st, &buf[..n], server_wait).unwrap();
            assert_eq!(s.receive(&mut st, &mut buf, server_wait), Err(Error::Closed));
            s.end(&mut st, server_wait).unwrap();
            (name, st)
        });

        let mut c = client(SessionConfig::new().with_server_name("device.local"), registry);
        assert_eq!(c.process_handshake(&mut ct, client_wait), Ok(HandshakeStatus::Complete));
        c.send(&mut ct, b"ping", client_wait).unwrap();
        let mut buf = [0u8; 256];
        let n = c.receive(&mut ct, &mut buf, client_wait).unwrap();
        assert_eq!(&buf[..n], b"ping");
        c.end(&mut ct, client_wait).unwrap();
        assert_eq!(c.receive(&mut ct, &mut buf, client_wait), Err(Error::Closed));

        let (name, st) = server_thread.join().unwrap();
        assert_eq!(name.as_deref(), Some(&b"device.local"[..]));
        st
    });

    drain(&mut ct);
    drain(&mut st);
    assert_balanced(&pool);
}

#[test]
fn large_writes_are_fragmented() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let mut s = server(server_config(), &registry);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();

    let data: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
    let before = pool.allocations();
    let got = transfer(&mut c, &mut ct, &mut s, &mut st, &data);
    assert_eq!(got, data);
    assert_eq!(pool.allocations() - before, 3);
    assert_balanced(&pool);
}

#[test]
fn remote_certificates_are_kept() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut cert_buf = [0u8; 1024];
    let mut c = client(SessionConfig::new(), &registry);
    c.remote_certificate_buffer_allocate(2, &mut cert_buf).unwrap();
    let mut s = server(server_config(), &registry);

    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();
    assert_eq!(c.remote_certificate_count(), 1);
    assert_eq!(c.remote_certificate(0), Some(server_cert()));
    assert_eq!(c.remote_certificate(1), None);
}

#[test]
fn pinned_certificate_accepted() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let pins = [server_cert()];
    let mut c = client(SessionConfig::new().with_pinned_certs(&pins), &registry);
    let mut s = server(server_config(), &registry);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();
}

#[test]
fn pinned_certificate_mismatch_fails_both_sides() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let other: &[u8] = b"some other certificate";
    let pins = [other];
    let mut c = client(SessionConfig::new().with_pinned_certs(&pins), &registry);
    let mut s = server(server_config(), &registry);

    assert_eq!(
        lockstep(&mut c, &mut ct, &mut s, &mut st),
        Err(("client", Error::BadCertificate))
    );
    assert_eq!(c.state(), HandshakeState::Failed);
    assert_eq!(
        s.process_handshake(&mut st, WaitOption::NoWait),
        Err(Error::Alert(AlertDescription::BadCertificate))
    );
    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Err(Error::InvalidState));

    drain(&mut ct);
    drain(&mut st);
    assert_balanced(&pool);
}

#[test]
fn no_common_suite() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new().with_ciphersuites(&[0xC02B]), &registry);
    let mut s = server(server_config().with_ciphersuites(&[0xCCA9]), &registry);

    assert_eq!(
        lockstep(&mut c, &mut ct, &mut s, &mut st),
        Err(("server", Error::HandshakeFailure))
    );
    assert_eq!(
        c.process_handshake(&mut ct, WaitOption::NoWait),
        Err(Error::Alert(AlertDescription::HandshakeFailure))
    );
    drain(&mut ct);
    drain(&mut st);
    assert_balanced(&pool);
}

#[test]
fn server_without_certificate_cannot_pick_ecdhe() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let mut s = server(SessionConfig::new(), &registry);
    assert_eq!(
        lockstep(&mut c, &mut ct, &mut s, &mut st),
        Err(("server", Error::HandshakeFailure))
    );
}

// =========================================================================
// PSK
// =========================================================================

#[test]
fn psk_handshake_with_hint() {
    for id in [0x00A8, 0x00AE, 0xC0A4, 0xC0A8, 0xCCAB] {
        let suites = [id];
        let registry = PskRegistry::new();
        registry.add_psk(b"0123456789abcdef", b"client-1", b"hint").unwrap();
        let pool = pool();
        let (mut ct, mut st) = channel_pair(&pool);
        let mut c = client(SessionConfig::new().with_ciphersuites(&suites), &registry);
        let mut s = server(SessionConfig::new().with_ciphersuites(&suites), &registry);

        lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();
        assert_eq!(s.psk_identity(), Some(&b"client-1"[..]));
        assert_eq!(c.psk_identity(), Some(&b"client-1"[..]));
        let got = transfer(&mut c, &mut ct, &mut s, &mut st, b"sensor=21.5");
        assert_eq!(got, b"sensor=21.5");

        drain(&mut ct);
        drain(&mut st);
        assert_balanced(&pool);
    }
}

#[test]
fn psk_handshake_without_hint_skips_key_exchange() {
    let registry = PskRegistry::new();
    registry.add_psk(b"secret", b"node", b"").unwrap();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new().with_ciphersuites(&[0x00A8]), &registry);
    let mut s = server(SessionConfig::new().with_ciphersuites(&[0x00A8]), &registry);

    c.process_handshake(&mut ct, WaitOption::NoWait).unwrap();
    s.process_handshake(&mut st, WaitOption::NoWait).unwrap();
    // ServerHello and ServerHelloDone only.
    assert_eq!(pool.in_use(), 2);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();
}

#[test]
fn psk_identity_unknown_to_server() {
    let client_registry = PskRegistry::new();
    client_registry.add_psk(b"secret", b"stranger", b"").unwrap();
    let server_registry = PskRegistry::new();
    server_registry.add_psk(b"secret", b"node", b"").unwrap();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new().with_ciphersuites(&[0x00A8]), &client_registry);
    let mut s = server(SessionConfig::new().with_ciphersuites(&[0x00A8]), &server_registry);

    assert_eq!(
        lockstep(&mut c, &mut ct, &mut s, &mut st),
        Err(("server", Error::PskNotFound))
    );
    assert_eq!(
        c.process_handshake(&mut ct, WaitOption::NoWait),
        Err(Error::Alert(AlertDescription::UnknownPskIdentity))
    );
}

#[test]
fn mismatched_psk_fails_finished() {
    let client_registry = PskRegistry::new();
    client_registry.add_psk(b"secret-a", b"node", b"").unwrap();
    let server_registry = PskRegistry::new();
    server_registry.add_psk(b"secret-b", b"node", b"").unwrap();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new().with_ciphersuites(&[0x00A8]), &client_registry);
    let mut s = server(SessionConfig::new().with_ciphersuites(&[0x00A8]), &server_registry);

    // The client's Finished is sealed under keys the server does not share.
    assert_eq!(
        lockstep(&mut c, &mut ct, &mut s, &mut st),
        Err(("server", Error::BadRecordMac))
    );
}

// =========================================================================
// State machine and record layer errors
// =========================================================================

#[test]
fn nowait_reports_continue() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, _st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    assert_eq!(c.state(), HandshakeState::Idle);
    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    assert_eq!(c.state(), HandshakeState::ClientHelloSent);
    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    assert_eq!(c.state(), HandshakeState::ClientHelloSent);
}

#[test]
fn client_hello_to_client_is_unexpected() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut a_t, mut b_t) = channel_pair(&pool);
    let mut a = client(SessionConfig::new(), &registry);
    let mut b = client(SessionConfig::new(), &registry);

    assert_eq!(a.process_handshake(&mut a_t, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    assert_eq!(
        b.process_handshake(&mut b_t, WaitOption::NoWait),
        Err(Error::UnexpectedMessage)
    );
    assert_eq!(b.state(), HandshakeState::Failed);
    // b's own ClientHello reaches a ahead of b's alert.
    assert_eq!(
        a.process_handshake(&mut a_t, WaitOption::NoWait),
        Err(Error::UnexpectedMessage)
    );

    drain(&mut a_t);
    drain(&mut b_t);
    assert_balanced(&pool);
}

#[test]
fn tampered_record_fails_server() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let mut s = server(server_config(), &registry);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();

    c.send(&mut ct, b"transfer 10", WaitOption::NoWait).unwrap();
    let mut packet = st.receive(WaitOption::NoWait).unwrap();
    let tampered: Vec<u8> = packet
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, b)| if i == 20 { b ^ 0x01 } else { *b })
        .collect();
    packet.clear();
    packet.append(&tampered).unwrap();
    // Re-inject through the client's end so it arrives at the server again.
    ct.send(packet, WaitOption::NoWait).unwrap();

    let mut buf = [0u8; 64];
    assert_eq!(s.receive(&mut st, &mut buf, WaitOption::NoWait), Err(Error::BadRecordMac));
    assert_eq!(s.state(), HandshakeState::Failed);
    assert_eq!(
        c.receive(&mut ct, &mut buf, WaitOption::NoWait),
        Err(Error::Alert(AlertDescription::BadRecordMac))
    );

    drain(&mut ct);
    drain(&mut st);
    assert_balanced(&pool);
}

#[test]
fn close_notify_ends_reads() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let mut s = server(server_config(), &registry);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();

    c.send(&mut ct, b"last words", WaitOption::NoWait).unwrap();
    c.end(&mut ct, WaitOption::NoWait).unwrap();
    assert_eq!(c.send(&mut ct, b"more", WaitOption::NoWait), Err(Error::InvalidState));

    let mut buf = [0u8; 64];
    let n = s.receive(&mut st, &mut buf, WaitOption::NoWait).unwrap();
    assert_eq!(&buf[..n], b"last words");
    assert_eq!(s.receive(&mut st, &mut buf, WaitOption::NoWait), Err(Error::Closed));
    assert_eq!(s.receive(&mut st, &mut buf, WaitOption::NoWait), Err(Error::Closed));
    assert_eq!(s.state(), HandshakeState::HandshakeFinished);
    assert_balanced(&pool);
}

#[test]
fn data_before_handshake_is_rejected() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, _st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let mut buf = [0u8; 8];
    assert_eq!(c.send(&mut ct, b"x", WaitOption::NoWait), Err(Error::InvalidState));
    assert_eq!(c.receive(&mut ct, &mut buf, WaitOption::NoWait), Err(Error::InvalidState));
}

#[test]
fn reset_allows_a_fresh_handshake() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let mut s = server(server_config(), &registry);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();

    c.reset();
    s.reset();
    assert_eq!(c.state(), HandshakeState::Idle);
    assert!(c.ciphersuite().is_none());
    assert!(!c.local_session_active());
    assert_eq!(c.session_iv_size(), Ok(0));

    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();
    let got = transfer(&mut c, &mut ct, &mut s, &mut st, b"again");
    assert_eq!(got, b"again");
    assert_balanced(&pool);
}

#[test]
fn exhausted_pool_reports_continue() {
    let registry = PskRegistry::new();
    let pool = PacketPool::new(MAX_PACKET_SIZE, 1);
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let held = st.allocate(WaitOption::NoWait).unwrap();

    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    assert_eq!(pool.allocations(), 1);
    st.release(held);

    // The queued ClientHello goes out once a packet is free.
    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    let hello = st.receive(WaitOption::NoWait).unwrap();
    assert_eq!(hello.as_bytes()[0], 22);
    st.release(hello);
    assert_balanced(&pool);
}

#[test]
fn server_finishes_only_after_its_final_flight() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, st) = channel_pair(&pool);
    let mut st = Starvable::new(st);
    let mut c = client(SessionConfig::new(), &registry);
    let mut s = server(server_config(), &registry);

    // ClientHello, server flight, then the client's final flight.
    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    assert_eq!(s.process_handshake(&mut st, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Ok(HandshakeStatus::Continue));

    // The client's Finished verifies but no packet is free for the reply.
    st.starved.set(true);
    assert_eq!(s.process_handshake(&mut st, WaitOption::NoWait), Ok(HandshakeStatus::Continue));
    assert_eq!(s.state(), HandshakeState::ClientKeyExchangeReceived);
    assert!(!s.local_session_active());
    st.starved.set(false);
    assert_eq!(
        s.send(&mut st, b"TOP-SECRET", WaitOption::NoWait),
        Err(Error::InvalidState)
    );
    assert_eq!(ct.receive(WaitOption::NoWait).unwrap_err(), Error::NoPacket);

    assert_eq!(s.process_handshake(&mut st, WaitOption::NoWait), Ok(HandshakeStatus::Complete));
    assert!(s.local_session_active());
    assert_eq!(c.process_handshake(&mut ct, WaitOption::NoWait), Ok(HandshakeStatus::Complete));

    let up = transfer(&mut c, &mut ct, &mut s, &mut st.inner, b"hello");
    assert_eq!(up, b"hello");
    let down = transfer(&mut s, &mut st.inner, &mut c, &mut ct, b"TOP-SECRET");
    assert_eq!(down, b"TOP-SECRET");
    drain(&mut ct);
    drain(&mut st.inner);
    assert_balanced(&pool);
}

#[test]
fn lost_link_fails_an_established_session() {
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new(), &registry);
    let mut s = server(server_config(), &registry);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();

    drop(ct);
    let mut buf = [0u8; 16];
    assert_eq!(s.receive(&mut st, &mut buf, WaitOption::NoWait), Err(Error::Transport));
    assert_eq!(s.state(), HandshakeState::Failed);
    assert_eq!(s.receive(&mut st, &mut buf, WaitOption::NoWait), Err(Error::InvalidState));
    assert_eq!(s.send(&mut st, b"x", WaitOption::NoWait), Err(Error::InvalidState));
    assert_balanced(&pool);
}

#[test]
fn packets_too_small_for_a_sealed_record_are_returned() {
    let suites = [0xC02B];
    let registry = PskRegistry::new();
    let pool = pool();
    let (mut ct, mut st) = channel_pair(&pool);
    let mut c = client(SessionConfig::new().with_ciphersuites(&suites), &registry);
    let mut s = server(server_config().with_ciphersuites(&suites), &registry);
    lockstep(&mut c, &mut ct, &mut s, &mut st).unwrap();

    // Room for the header and explicit nonce but not the GCM tag.
    let tiny = PacketPool::new(24, 2);
    let (mut tt, _peer) = channel_pair(&tiny);
    assert!(matches!(
        c.send(&mut tt, b"data", WaitOption::NoWait),
        Err(Error::BufferTooSmall { .. })
    ));
    assert_eq!(tiny.in_use(), 0);
    assert_eq!(tiny.allocations(), tiny.releases());
}
