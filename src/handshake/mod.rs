//! TLS 1.2 handshake: message codecs, extensions, transcript and alerts.
//!
//! The state machine that sequences these lives in [`crate::session`].

pub mod alert;
pub mod extensions;
pub mod messages;
pub mod transcript;

pub use alert::{AlertDescription, AlertLevel};
pub use extensions::{parse_sni_extension, DnsName, Extension};
pub use transcript::TranscriptHash;

/// Which end of the session we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn peer(self) -> Self {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// Handshake message types (RFC 5246 section 7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::HelloRequest),
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            11 => Some(Self::Certificate),
            12 => Some(Self::ServerKeyExchange),
            13 => Some(Self::CertificateRequest),
            14 => Some(Self::ServerHelloDone),
            15 => Some(Self::CertificateVerify),
            16 => Some(Self::ClientKeyExchange),
            20 => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Where a session is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeState {
    Idle,
    // client
    ClientHelloSent,
    ServerHelloReceived,
    ServerCertificateReceived,
    ServerKeyExchangeReceived,
    ClientFinishedSent,
    // server
    ServerHelloDoneSent,
    ClientKeyExchangeReceived,
    HandshakeFinished,
    /// A fatal error ended the handshake; only `reset` leaves this state.
    Failed,
}

/// Outcome of one `process_handshake` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeStatus {
    Complete,
    /// Nothing to read yet under `WaitOption::NoWait`; call again.
    Continue,
}
