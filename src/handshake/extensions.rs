//! Hello extensions (RFC 5246 section 7.4.1.4, RFC 6066, RFC 8422).
//!
//! Extension format: type (2 bytes) + length (2 bytes) + data.

use super::messages::{Reader, Writer};
use crate::config::MAX_DNS_NAME_LEN;
use crate::crypto::ecdsa_p256::ECDSA_SECP256R1_SHA256;
use crate::error::Error;
use crate::key_exchange::NamedGroup;

pub const EXT_SERVER_NAME: u16 = 0x0000;
pub const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
pub const EXT_EC_POINT_FORMATS: u16 = 0x000b;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;

/// SNI NameType host_name.
const HOST_NAME: u8 = 0;
/// ECPointFormat uncompressed.
const POINT_FORMAT_UNCOMPRESSED: u8 = 0;

/// Most extensions kept from one hello.
pub const MAX_EXTENSIONS: usize = 32;

/// Host name received in SNI, at most [`MAX_DNS_NAME_LEN`] bytes.
pub type DnsName = heapless::Vec<u8, MAX_DNS_NAME_LEN>;

/// One raw extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension<'a> {
    pub ext_type: u16,
    pub data: &'a [u8],
}

/// Split an extension block into its entries.
pub fn parse_extensions(block: &[u8]) -> Result<heapless::Vec<Extension<'_>, MAX_EXTENSIONS>, Error> {
    let mut out = heapless::Vec::new();
    let mut r = Reader::new(block);
    while !r.is_empty() {
        let ext_type = r.u16()?;
        let data = r.vec16()?;
        out.push(Extension { ext_type, data }).map_err(|_| Error::Decode)?;
    }
    Ok(out)
}

pub fn find_extension<'e, 'a>(extensions: &'e [Extension<'a>], ext_type: u16) -> Option<&'e Extension<'a>> {
    extensions.iter().find(|e| e.ext_type == ext_type)
}

/// Encode the ClientHello extension block: server_name (when set),
/// supported_groups, ec_point_formats and signature_algorithms.
pub fn encode_client_hello_extensions(
    server_name: Option<&str>,
    groups: &[NamedGroup],
    out: &mut [u8],
) -> Result<usize, Error> {
    let mut w = Writer::new(out);

    if let Some(name) = server_name.filter(|n| !n.is_empty()) {
        let name = name.as_bytes();
        w.u16(EXT_SERVER_NAME)?;
        w.u16((2 + 1 + 2 + name.len()) as u16)?;
        w.u16((1 + 2 + name.len()) as u16)?;
        w.u8(HOST_NAME)?;
        w.u16(name.len() as u16)?;
        w.put(name)?;
    }

    if !groups.is_empty() {
        w.u16(EXT_SUPPORTED_GROUPS)?;
        w.u16((2 + 2 * groups.len()) as u16)?;
        w.u16((2 * groups.len()) as u16)?;
        for g in groups {
            w.u16(g.to_u16())?;
        }

        w.u16(EXT_EC_POINT_FORMATS)?;
        w.u16(2)?;
        w.u8(1)?;
        w.u8(POINT_FORMAT_UNCOMPRESSED)?;

        w.u16(EXT_SIGNATURE_ALGORITHMS)?;
        w.u16(4)?;
        w.u16(2)?;
        w.u16(ECDSA_SECP256R1_SHA256)?;
    }

    Ok(w.len())
}

/// Groups named in a supported_groups extension, unknown codes skipped.
pub fn parse_supported_groups(data: &[u8]) -> Result<heapless::Vec<NamedGroup, 8>, Error> {
    let mut r = Reader::new(data);
    let list = r.vec16()?;
    r.finish()?;
    if list.len() % 2 != 0 {
        return Err(Error::Decode);
    }
    let mut groups = heapless::Vec::new();
    for code in list.chunks_exact(2) {
        if let Some(g) = NamedGroup::from_u16(u16::from_be_bytes([code[0], code[1]])) {
            if !groups.contains(&g) {
                // At most two known groups, so this cannot overflow.
                let _ = groups.push(g);
            }
        }
    }
    Ok(groups)
}

/// Whether the client's signature_algorithms list allows ECDSA-P256-SHA256.
/// An absent extension implies the RFC 5246 defaults, which include it.
pub fn allows_ecdsa_p256_sha256(extensions: &[Extension<'_>]) -> Result<bool, Error> {
    let Some(ext) = find_extension(extensions, EXT_SIGNATURE_ALGORITHMS) else {
        return Ok(true);
    };
    let mut r = Reader::new(ext.data);
    let list = r.vec16()?;
    r.finish()?;
    Ok(list
        .chunks_exact(2)
        .any(|c| u16::from_be_bytes([c[0], c[1]]) == ECDSA_SECP256R1_SHA256))
}

/// Extract the host name from the server_name extension (RFC 6066 section 3).
///
/// Only the first ServerName entry is read. A name longer than
/// [`MAX_DNS_NAME_LEN`] whose framing is otherwise consistent is truncated
/// and accepted.
pub fn parse_sni_extension(extensions: &[Extension<'_>]) -> Result<DnsName, Error> {
    let ext = find_extension(extensions, EXT_SERVER_NAME).ok_or(Error::ExtensionNotFound)?;
    let data = ext.data;
    if data.len() < 5 {
        return Err(Error::SniExtensionInvalid);
    }

    let list_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let name_type = data[2];
    let name_len = u16::from_be_bytes([data[3], data[4]]) as usize;

    if name_type != HOST_NAME {
        return Err(Error::SniExtensionInvalid);
    }
    if list_len + 2 > data.len() {
        return Err(Error::SniExtensionInvalid);
    }
    if name_len > list_len {
        return Err(Error::SniExtensionInvalid);
    }
    if 5 + name_len > data.len() {
        return Err(Error::SniExtensionInvalid);
    }

    let keep = if name_len > MAX_DNS_NAME_LEN {
        tracing::warn!(name_len, max = MAX_DNS_NAME_LEN, "SNI host name truncated");
        MAX_DNS_NAME_LEN
    } else {
        name_len
    };

    let mut name = DnsName::new();
    name.extend_from_slice(&data[5..5 + keep])
        .map_err(|_| Error::SniExtensionInvalid)?;
    Ok(name)
}
