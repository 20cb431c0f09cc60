//! TLS 1.2 handshake message encoding and decoding.
//!
//! Every message is framed as
//!   HandshakeType (1 byte)
//!   Length (3 bytes, big-endian)
//!   Body (Length bytes)
//!
//! Encoders write the whole framed message; parsers take the body only.

use super::HandshakeType;
use crate::error::Error;
use crate::key_material::{RANDOM_LEN, VERIFY_DATA_LEN};

pub const HANDSHAKE_HEADER_LEN: usize = 4;
/// Largest body a 24-bit length can describe.
pub const MAX_HANDSHAKE_BODY: usize = 0x00ff_ffff;

/// Bounds-checked big-endian reader over a message body.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, off: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self.off.checked_add(n).ok_or(Error::Decode)?;
        let out = self.data.get(self.off..end).ok_or(Error::Decode)?;
        self.off = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u24(&mut self) -> Result<usize, Error> {
        let b = self.take(3)?;
        Ok(((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }

    pub(crate) fn vec8(&mut self) -> Result<&'a [u8], Error> {
        let n = self.u8()? as usize;
        self.take(n)
    }

    pub(crate) fn vec16(&mut self) -> Result<&'a [u8], Error> {
        let n = self.u16()? as usize;
        self.take(n)
    }

    pub(crate) fn vec24(&mut self) -> Result<&'a [u8], Error> {
        let n = self.u24()?;
        self.take(n)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.off == self.data.len()
    }

    /// Fail unless every byte was consumed.
    pub(crate) fn finish(&self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Decode)
        }
    }
}

/// Append-only writer over a caller buffer.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    off: usize,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, off: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.off
    }

    pub(crate) fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.off + bytes.len();
        if end > self.buf.len() {
            return Err(Error::BufferTooSmall { needed: end });
        }
        self.buf[self.off..end].copy_from_slice(bytes);
        self.off = end;
        Ok(())
    }

    pub(crate) fn u8(&mut self, v: u8) -> Result<(), Error> {
        self.put(&[v])
    }

    pub(crate) fn u16(&mut self, v: u16) -> Result<(), Error> {
        self.put(&v.to_be_bytes())
    }

    pub(crate) fn u24(&mut self, v: usize) -> Result<(), Error> {
        if v > MAX_HANDSHAKE_BODY {
            return Err(Error::InvalidParameters);
        }
        self.put(&(v as u32).to_be_bytes()[1..])
    }

    /// Reserve `n` length bytes, returning their offset for [`Writer::patch_len`].
    pub(crate) fn reserve(&mut self, n: usize) -> Result<usize, Error> {
        let at = self.off;
        self.put(&[0u8; 3][..n])?;
        Ok(at)
    }

    /// Fill a reserved length field with the bytes written since it.
    pub(crate) fn patch_len(&mut self, at: usize, n: usize) -> Result<(), Error> {
        let len = self.off - at - n;
        let bytes = (len as u32).to_be_bytes();
        if len >> (8 * n) != 0 {
            return Err(Error::InvalidParameters);
        }
        self.buf[at..at + n].copy_from_slice(&bytes[4 - n..]);
        Ok(())
    }

    /// Free space after the cursor, for callees that report their own length.
    pub(crate) fn tail(&mut self) -> &mut [u8] {
        &mut self.buf[self.off..]
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), Error> {
        let end = self.off + n;
        if end > self.buf.len() {
            return Err(Error::BufferTooSmall { needed: end });
        }
        self.off = end;
        Ok(())
    }
}

/// Write the 4-byte handshake header.
pub fn write_handshake_header(msg_type: HandshakeType, body_len: usize, out: &mut [u8]) -> Result<(), Error> {
    if out.len() < HANDSHAKE_HEADER_LEN {
        return Err(Error::BufferTooSmall { needed: HANDSHAKE_HEADER_LEN });
    }
    let mut w = Writer::new(out);
    w.u8(msg_type as u8)?;
    w.u24(body_len)
}

/// Read the handshake header: `(type_byte, body_length)`.
pub fn read_handshake_header(data: &[u8]) -> Result<(u8, usize), Error> {
    if data.len() < HANDSHAKE_HEADER_LEN {
        return Err(Error::Decode);
    }
    let mut r = Reader::new(data);
    Ok((r.u8()?, r.u24()?))
}

/// Frame `body` as a handshake message of type `msg_type`.
pub fn encode_message(msg_type: HandshakeType, body: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    let total = HANDSHAKE_HEADER_LEN + body.len();
    if out.len() < total {
        return Err(Error::BufferTooSmall { needed: total });
    }
    write_handshake_header(msg_type, body.len(), out)?;
    out[HANDSHAKE_HEADER_LEN..total].copy_from_slice(body);
    Ok(total)
}

/// Parsed ClientHello body.
#[derive(Debug)]
pub struct ClientHello<'a> {
    pub version: u16,
    pub random: &'a [u8; RANDOM_LEN],
    pub session_id: &'a [u8],
    /// Raw list of 2-byte suite ids.
    pub cipher_suites: &'a [u8],
    pub compression_methods: &'a [u8],
    /// Raw extension block, possibly empty.
    pub extensions: &'a [u8],
}

impl ClientHello<'_> {
    pub fn cipher_suites(&self) -> impl Iterator<Item = u16> + '_ {
        self.cipher_suites
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
    }

    pub fn offers_suite(&self, id: u16) -> bool {
        self.cipher_suites().any(|s| s == id)
    }
}

fn read_random<'a>(r: &mut Reader<'a>) -> Result<&'a [u8; RANDOM_LEN], Error> {
    r.take(RANDOM_LEN)?.try_into().map_err(|_| Error::Decode)
}

/// Encode a full ClientHello message with null compression.
pub fn encode_client_hello(
    version: u16,
    random: &[u8; RANDOM_LEN],
    session_id: &[u8],
    cipher_suites: &[u16],
    extensions: &[u8],
    out: &mut [u8],
) -> Result<usize, Error> {
    if session_id.len() > 32 || cipher_suites.is_empty() {
        return Err(Error::InvalidParameters);
    }
    let mut w = Writer::new(out);
    w.u8(HandshakeType::ClientHello as u8)?;
    let body = w.reserve(3)?;
    w.u16(version)?;
    w.put(random)?;
    w.u8(session_id.len() as u8)?;
    w.put(session_id)?;
    w.u16((cipher_suites.len() * 2) as u16)?;
    for s in cipher_suites {
        w.u16(*s)?;
    }
    w.put(&[1, 0])?;
    if !extensions.is_empty() {
        w.u16(extensions.len() as u16)?;
        w.put(extensions)?;
    }
    w.patch_len(body, 3)?;
    Ok(w.len())
}

pub fn parse_client_hello(body: &[u8]) -> Result<ClientHello<'_>, Error> {
    let mut r = Reader::new(body);
    let version = r.u16()?;
    let random = read_random(&mut r)?;
    let session_id = r.vec8()?;
    if session_id.len() > 32 {
        return Err(Error::Decode);
    }
    let cipher_suites = r.vec16()?;
    if cipher_suites.is_empty() || cipher_suites.len() % 2 != 0 {
        return Err(Error::Decode);
    }
    let compression_methods = r.vec8()?;
    if compression_methods.is_empty() {
        return Err(Error::Decode);
    }
    let extensions = if r.is_empty() { &[][..] } else { r.vec16()? };
    r.finish()?;
    Ok(ClientHello {
        version,
        random,
        session_id,
        cipher_suites,
        compression_methods,
        extensions,
    })
}

/// Parsed ServerHello body.
#[derive(Debug)]
pub struct ServerHello<'a> {
    pub version: u16,
    pub random: &'a [u8; RANDOM_LEN],
    pub session_id: &'a [u8],
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: &'a [u8],
}

pub fn encode_server_hello(
    version: u16,
    random: &[u8; RANDOM_LEN],
    session_id: &[u8],
    cipher_suite: u16,
    extensions: &[u8],
    out: &mut [u8],
) -> Result<usize, Error> {
    if session_id.len() > 32 {
        return Err(Error::InvalidParameters);
    }
    let mut w = Writer::new(out);
    w.u8(HandshakeType::ServerHello as u8)?;
    let body = w.reserve(3)?;
    w.u16(version)?;
    w.put(random)?;
    w.u8(session_id.len() as u8)?;
    w.put(session_id)?;
    w.u16(cipher_suite)?;
    w.u8(0)?;
    if !extensions.is_empty() {
        w.u16(extensions.len() as u16)?;
        w.put(extensions)?;
    }
    w.patch_len(body, 3)?;
    Ok(w.len())
}

pub fn parse_server_hello(body: &[u8]) -> Result<ServerHello<'_>, Error> {
    let mut r = Reader::new(body);
    let version = r.u16()?;
    let random = read_random(&mut r)?;
    let session_id = r.vec8()?;
    if session_id.len() > 32 {
        return Err(Error::Decode);
    }
    let cipher_suite = r.u16()?;
    let compression_method = r.u8()?;
    let extensions = if r.is_empty() { &[][..] } else { r.vec16()? };
    r.finish()?;
    Ok(ServerHello {
        version,
        random,
        session_id,
        cipher_suite,
        compression_method,
        extensions,
    })
}

/// Encode a Certificate message: a 24-bit list of 24-bit DER blobs, leaf first.
pub fn encode_certificate(chain: &[&[u8]], out: &mut [u8]) -> Result<usize, Error> {
    let mut w = Writer::new(out);
    w.u8(HandshakeType::Certificate as u8)?;
    let body = w.reserve(3)?;
    let list = w.reserve(3)?;
    for cert in chain {
        w.u24(cert.len())?;
        w.put(cert)?;
    }
    w.patch_len(list, 3)?;
    w.patch_len(body, 3)?;
    Ok(w.len())
}

/// Validated Certificate body.
#[derive(Debug, Clone, Copy)]
pub struct CertificateList<'a> {
    list: &'a [u8],
}

impl<'a> CertificateList<'a> {
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// DER certificates, leaf first.
    pub fn iter(&self) -> CertificateIter<'a> {
        CertificateIter { r: Reader::new(self.list) }
    }
}

pub struct CertificateIter<'a> {
    r: Reader<'a>,
}

impl<'a> Iterator for CertificateIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.r.is_empty() {
            return None;
        }
        self.r.vec24().ok()
    }
}

pub fn parse_certificate(body: &[u8]) -> Result<CertificateList<'_>, Error> {
    let mut r = Reader::new(body);
    let list = r.vec24()?;
    r.finish()?;
    let mut entries = Reader::new(list);
    while !entries.is_empty() {
        if entries.vec24()?.is_empty() {
            return Err(Error::Decode);
        }
    }
    Ok(CertificateList { list })
}

pub fn encode_finished(verify_data: &[u8; VERIFY_DATA_LEN], out: &mut [u8]) -> Result<usize, Error> {
    encode_message(HandshakeType::Finished, verify_data, out)
}

pub fn parse_finished(body: &[u8]) -> Result<&[u8; VERIFY_DATA_LEN], Error> {
    body.try_into().map_err(|_| Error::Decode)
}

/// ServerHelloDone has an empty body.
pub fn parse_server_hello_done(body: &[u8]) -> Result<(), Error> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(Error::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(msg: &[u8]) -> &[u8] {
        let (_, len) = read_handshake_header(msg).unwrap();
        assert_eq!(msg.len(), HANDSHAKE_HEADER_LEN + len);
        &msg[HANDSHAKE_HEADER_LEN..]
    }

    #[test]
    fn client_hello_encode_parse() {
        let random = [0xAA; 32];
        let suites = [0xC02B, 0x00A8];
        let ext = [0x00, 0x0b, 0x00, 0x02, 0x01, 0x00];
        let mut buf = [0u8; 256];
        let n = encode_client_hello(0x0303, &random, &[], &suites, &ext, &mut buf).unwrap();
        assert_eq!(buf[0], HandshakeType::ClientHello as u8);

        let ch = parse_client_hello(body(&buf[..n])).unwrap();
        assert_eq!(ch.version, 0x0303);
        assert_eq!(ch.random, &random);
        assert!(ch.session_id.is_empty());
        assert!(ch.offers_suite(0x00A8));
        assert!(!ch.offers_suite(0x1301));
        assert_eq!(ch.compression_methods, &[0]);
        assert_eq!(ch.extensions, &ext);
    }

    #[test]
    fn client_hello_without_extensions() {
        let mut buf = [0u8; 128];
        let n = encode_client_hello(0x0303, &[1; 32], &[9; 4], &[0xC02B], &[], &mut buf).unwrap();
        let ch = parse_client_hello(body(&buf[..n])).unwrap();
        assert_eq!(ch.session_id, &[9; 4]);
        assert!(ch.extensions.is_empty());
    }

    #[test]
    fn client_hello_truncated() {
        let mut buf = [0u8; 128];
        let n = encode_client_hello(0x0303, &[1; 32], &[], &[0xC02B], &[], &mut buf).unwrap();
        let b = body(&buf[..n]);
        for cut in [0, 10, 34, b.len() - 1] {
            assert_eq!(parse_client_hello(&b[..cut]).unwrap_err(), Error::Decode);
        }
    }

    #[test]
    fn client_hello_buffer_too_small() {
        let mut buf = [0u8; 20];
        assert!(matches!(
            encode_client_hello(0x0303, &[1; 32], &[], &[0xC02B], &[], &mut buf),
            Err(Error::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn server_hello_encode_parse() {
        let mut buf = [0u8; 128];
        let n = encode_server_hello(0x0303, &[0x55; 32], &[], 0xCCA9, &[], &mut buf).unwrap();
        let sh = parse_server_hello(body(&buf[..n])).unwrap();
        assert_eq!(sh.cipher_suite, 0xCCA9);
        assert_eq!(sh.compression_method, 0);
        assert_eq!(sh.random, &[0x55; 32]);
    }

    #[test]
    fn server_hello_trailing_garbage() {
        let mut buf = [0u8; 128];
        let n = encode_server_hello(0x0303, &[0x55; 32], &[], 0xCCA9, &[], &mut buf).unwrap();
        buf[n] = 0;
        buf[3] += 1;
        assert_eq!(parse_server_hello(&buf[4..n + 1]).unwrap_err(), Error::Decode);
    }

    #[test]
    fn certificate_list_encode_parse() {
        let a = [0x30u8; 300];
        let b = [0x31u8; 20];
        let mut buf = [0u8; 512];
        let n = encode_certificate(&[&a[..], &b[..]], &mut buf).unwrap();
        let list = parse_certificate(body(&buf[..n])).unwrap();
        assert_eq!(list.len(), 2);
        let mut it = list.iter();
        assert_eq!(it.next(), Some(&a[..]));
        assert_eq!(it.next(), Some(&b[..]));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn certificate_list_rejects_bad_framing() {
        assert!(parse_certificate(&[0, 0, 0]).unwrap().is_empty());
        assert_eq!(parse_certificate(&[0, 0, 4, 0, 0, 9, 1]).unwrap_err(), Error::Decode);
        assert_eq!(parse_certificate(&[0, 0, 3, 0, 0, 0]).unwrap_err(), Error::Decode);
        assert_eq!(parse_certificate(&[0, 0]).unwrap_err(), Error::Decode);
    }

    #[test]
    fn finished_encode_parse() {
        let vd = [7u8; 12];
        let mut buf = [0u8; 16];
        let n = encode_finished(&vd, &mut buf).unwrap();
        assert_eq!(n, 16);
        assert_eq!(parse_finished(body(&buf[..n])).unwrap(), &vd);
        assert_eq!(parse_finished(&vd[..11]).unwrap_err(), Error::Decode);
    }

    #[test]
    fn server_hello_done_is_empty() {
        assert!(parse_server_hello_done(&[]).is_ok());
        assert_eq!(parse_server_hello_done(&[0]), Err(Error::Decode));
    }

    #[test]
    fn header_roundtrip_and_truncation() {
        let mut buf = [0u8; 4];
        write_handshake_header(HandshakeType::ClientKeyExchange, 0x012345, &mut buf).unwrap();
        assert_eq!(read_handshake_header(&buf).unwrap(), (16, 0x012345));
        assert_eq!(read_handshake_header(&buf[..3]).unwrap_err(), Error::Decode);
    }
}
