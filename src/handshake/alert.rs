//! TLS alert protocol (RFC 5246 section 7.2).

use crate::error::Error;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

/// TLS alert description codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    NoRenegotiation = 100,
    UnsupportedExtension = 110,
    UnrecognizedName = 112,
    UnknownPskIdentity = 115,
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::CloseNotify),
            10 => Some(Self::UnexpectedMessage),
            20 => Some(Self::BadRecordMac),
            22 => Some(Self::RecordOverflow),
            40 => Some(Self::HandshakeFailure),
            42 => Some(Self::BadCertificate),
            43 => Some(Self::UnsupportedCertificate),
            46 => Some(Self::CertificateUnknown),
            47 => Some(Self::IllegalParameter),
            50 => Some(Self::DecodeError),
            51 => Some(Self::DecryptError),
            70 => Some(Self::ProtocolVersion),
            71 => Some(Self::InsufficientSecurity),
            80 => Some(Self::InternalError),
            100 => Some(Self::NoRenegotiation),
            110 => Some(Self::UnsupportedExtension),
            112 => Some(Self::UnrecognizedName),
            115 => Some(Self::UnknownPskIdentity),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Encode a two-byte alert body.
pub fn encode_alert(level: AlertLevel, desc: AlertDescription) -> [u8; 2] {
    [level as u8, desc.to_u8()]
}

/// Decode an alert body into (level, description).
///
/// Unknown descriptions are reported as `InternalError` so that a fatal alert
/// from the peer is never mistaken for something benign.
pub fn decode_alert(body: &[u8]) -> Result<(AlertLevel, AlertDescription), Error> {
    if body.len() != 2 {
        return Err(Error::Decode);
    }
    let level = match body[0] {
        1 => AlertLevel::Warning,
        2 => AlertLevel::Fatal,
        _ => return Err(Error::Decode),
    };
    let desc = AlertDescription::from_u8(body[1]).unwrap_or(AlertDescription::InternalError);
    Ok((level, desc))
}
