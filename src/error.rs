use crate::handshake::alert::AlertDescription;

/// Top-level crate error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No ciphersuite has been negotiated, or the id is not in the suite table.
    UnknownCiphersuite,
    /// Caller-provided or pool-provided buffer too small.
    BufferTooSmall { needed: usize },
    /// Size mismatch in a caller-supplied buffer or argument.
    InvalidParameters,
    /// Server Name Indication extension is malformed.
    SniExtensionInvalid,
    /// Requested extension is not present. Often a benign "not applicable".
    ExtensionNotFound,
    /// PSK store is full or an entry exceeds its size bound.
    NoMorePskSpace,
    /// Peer named a PSK identity we do not hold.
    PskNotFound,
    /// Remote certificate does not fit in the slots supplied by the caller.
    InsufficientCertificateSpace,
    /// Transport has no data (or the packet pool is empty) under the given wait.
    NoPacket,
    /// Hard transport failure.
    Transport,
    /// Message or record not valid in the current handshake state.
    UnexpectedMessage,
    /// Malformed message or record.
    Decode,
    /// Peer requested a protocol version we do not speak.
    ProtocolVersion,
    /// No common parameters could be negotiated.
    HandshakeFailure,
    /// Peer certificate rejected.
    BadCertificate,
    /// Record failed authentication.
    BadRecordMac,
    /// Finished or signature verification failed.
    DecryptError,
    /// Peer sent a fatal alert.
    Alert(AlertDescription),
    /// Peer closed the session with close_notify.
    Closed,
    /// Operation not valid in the current session state.
    InvalidState,
    /// Cryptographic primitive failed.
    Crypto,
}

impl Error {
    /// Alert to send to the peer when this error ends a session.
    ///
    /// Returns `None` for errors that originate with the transport or the
    /// peer, where sending an alert is pointless.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::UnexpectedMessage => Some(AlertDescription::UnexpectedMessage),
            Error::Decode | Error::SniExtensionInvalid => Some(AlertDescription::DecodeError),
            Error::BadRecordMac => Some(AlertDescription::BadRecordMac),
            Error::UnknownCiphersuite | Error::HandshakeFailure => {
                Some(AlertDescription::HandshakeFailure)
            }
            Error::ProtocolVersion => Some(AlertDescription::ProtocolVersion),
            Error::BadCertificate | Error::InsufficientCertificateSpace => {
                Some(AlertDescription::BadCertificate)
            }
            Error::PskNotFound => Some(AlertDescription::UnknownPskIdentity),
            Error::DecryptError => Some(AlertDescription::DecryptError),
            Error::NoPacket | Error::Transport | Error::Alert(_) | Error::Closed => None,
            _ => Some(AlertDescription::InternalError),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::UnknownCiphersuite => write!(f, "unknown ciphersuite"),
            Error::BufferTooSmall { needed } => {
                write!(f, "buffer too small, need {needed} bytes")
            }
            Error::InvalidParameters => write!(f, "invalid parameters"),
            Error::SniExtensionInvalid => write!(f, "invalid SNI extension"),
            Error::ExtensionNotFound => write!(f, "extension not found"),
            Error::NoMorePskSpace => write!(f, "no more PSK space"),
            Error::PskNotFound => write!(f, "PSK identity not found"),
            Error::InsufficientCertificateSpace => write!(f, "insufficient certificate space"),
            Error::NoPacket => write!(f, "no packet available"),
            Error::Transport => write!(f, "transport error"),
            Error::UnexpectedMessage => write!(f, "unexpected message"),
            Error::Decode => write!(f, "malformed message"),
            Error::ProtocolVersion => write!(f, "unsupported protocol version"),
            Error::HandshakeFailure => write!(f, "handshake failure"),
            Error::BadCertificate => write!(f, "bad certificate"),
            Error::BadRecordMac => write!(f, "bad record MAC"),
            Error::DecryptError => write!(f, "decrypt error"),
            Error::Alert(desc) => write!(f, "peer sent alert: {desc:?}"),
            Error::Closed => write!(f, "session closed"),
            Error::InvalidState => write!(f, "invalid state"),
            Error::Crypto => write!(f, "cryptographic error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
