//! ECDSA-P256 (secp256r1 with SHA-256) for the TLS 1.2 ServerKeyExchange signature.
//!
//! The signed content is `client_random || server_random || ServerECDHParams`
//! (RFC 8422 section 5.4). Signatures are DER-encoded on the wire.
//!
//! Also carries the minimal DER handling the session needs: pulling the P-256
//! key out of a leaf certificate and building a self-signed certificate for
//! a bare key.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{DerSignature, SigningKey, VerifyingKey};

use crate::error::Error;

/// SignatureScheme code for ECDSA with secp256r1 and SHA-256.
pub const ECDSA_SECP256R1_SHA256: u16 = 0x0403;

/// Length of an uncompressed SEC1 P-256 point.
pub const P256_POINT_LEN: usize = 65;

/// Upper bound of a DER ECDSA-P256 signature.
pub const MAX_DER_SIGNATURE_LEN: usize = 72;

const SECP256R1_OID: [u8; 10] = [0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const EC_PUBLIC_KEY_OID: [u8; 9] = [0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
const ECDSA_WITH_SHA256: [u8; 12] = [
    0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02,
];
const COMMON_NAME_OID: [u8; 5] = [0x06, 0x03, 0x55, 0x04, 0x03];

/// Largest signed content: two randoms plus curve params with an uncompressed point.
const MAX_SIGNED_LEN: usize = 32 + 32 + 4 + P256_POINT_LEN;

fn signed_content<'b>(
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    params: &[u8],
    buf: &'b mut [u8; MAX_SIGNED_LEN],
) -> Result<&'b [u8], Error> {
    let len = 64 + params.len();
    if len > MAX_SIGNED_LEN {
        return Err(Error::InvalidParameters);
    }
    buf[..32].copy_from_slice(client_random);
    buf[32..64].copy_from_slice(server_random);
    buf[64..len].copy_from_slice(params);
    Ok(&buf[..len])
}

/// Sign ServerECDHParams with a 32-byte P-256 private scalar.
pub fn sign_key_exchange_params(
    scalar: &[u8; 32],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    params: &[u8],
) -> Result<heapless::Vec<u8, MAX_DER_SIGNATURE_LEN>, Error> {
    let signing_key = SigningKey::from_bytes(scalar.into()).map_err(|_| Error::Crypto)?;
    let mut buf = [0u8; MAX_SIGNED_LEN];
    let content = signed_content(client_random, server_random, params, &mut buf)?;
    let signature: DerSignature = signing_key.sign(content);

    let mut out = heapless::Vec::new();
    out.extend_from_slice(signature.as_bytes())
        .map_err(|_| Error::Crypto)?;
    Ok(out)
}

/// Verify a ServerKeyExchange signature against the server's P-256 key.
pub fn verify_key_exchange_params(
    public_key: &[u8],
    signature: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    params: &[u8],
) -> Result<(), Error> {
    let verifying_key =
        VerifyingKey::from_sec1_bytes(public_key).map_err(|_| Error::BadCertificate)?;
    let sig = DerSignature::try_from(signature).map_err(|_| Error::DecryptError)?;
    let mut buf = [0u8; MAX_SIGNED_LEN];
    let content = signed_content(client_random, server_random, params, &mut buf)?;
    verifying_key
        .verify(content, &sig)
        .map_err(|_| Error::DecryptError)
}

/// Derive the uncompressed public point for a private scalar.
pub fn p256_public_key_from_scalar(scalar: &[u8; 32]) -> Result<[u8; P256_POINT_LEN], Error> {
    let signing_key = SigningKey::from_bytes(scalar.into()).map_err(|_| Error::Crypto)?;
    let encoded = signing_key.verifying_key().to_encoded_point(false);
    let mut out = [0u8; P256_POINT_LEN];
    out.copy_from_slice(encoded.as_bytes());
    Ok(out)
}

/// Pull the uncompressed P-256 key out of a DER certificate.
///
/// Looks for the secp256r1 curve OID and takes the first 66-byte BIT STRING
/// after it, which is the SubjectPublicKeyInfo key.
pub fn extract_p256_pubkey_from_cert(cert_der: &[u8]) -> Result<[u8; P256_POINT_LEN], Error> {
    let oid_at = find_subsequence(cert_der, &SECP256R1_OID).ok_or(Error::BadCertificate)?;
    let tail = &cert_der[oid_at + SECP256R1_OID.len()..];
    let key_at = find_subsequence(tail, &[0x03, 0x42, 0x00, 0x04]).ok_or(Error::BadCertificate)?;
    let point = tail
        .get(key_at + 3..key_at + 3 + P256_POINT_LEN)
        .ok_or(Error::BadCertificate)?;
    let mut out = [0u8; P256_POINT_LEN];
    out.copy_from_slice(point);
    Ok(out)
}

/// Build a minimal self-signed-looking X.509 certificate for `public_key`.
///
/// The outer signature is a fixed placeholder: peers that pin the exact DER
/// blob accept it, nothing else should.
pub fn build_p256_cert_der(public_key: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    if public_key.len() != P256_POINT_LEN || public_key[0] != 0x04 {
        return Err(Error::InvalidParameters);
    }

    let mut cn = [0u8; 16];
    let cn_len = der(0x0c, &[b"milli-tls"], &mut cn)?;
    let mut atv = [0u8; 32];
    let atv_len = der(0x30, &[&COMMON_NAME_OID, &cn[..cn_len]], &mut atv)?;
    let mut rdn = [0u8; 32];
    let rdn_len = der(0x31, &[&atv[..atv_len]], &mut rdn)?;
    let mut name = [0u8; 32];
    let name_len = der(0x30, &[&rdn[..rdn_len]], &mut name)?;
    let name = &name[..name_len];

    let mut not_before = [0u8; 16];
    let nb_len = der(0x17, &[b"260101000000Z"], &mut not_before)?;
    let mut not_after = [0u8; 16];
    let na_len = der(0x17, &[b"360101000000Z"], &mut not_after)?;
    let mut validity = [0u8; 40];
    let validity_len = der(0x30, &[&not_before[..nb_len], &not_after[..na_len]], &mut validity)?;

    let mut alg = [0u8; 24];
    let alg_len = der(0x30, &[&EC_PUBLIC_KEY_OID, &SECP256R1_OID], &mut alg)?;
    let mut bits = [0u8; 72];
    let bits_len = der(0x03, &[&[0x00], public_key], &mut bits)?;
    let mut spki = [0u8; 100];
    let spki_len = der(0x30, &[&alg[..alg_len], &bits[..bits_len]], &mut spki)?;

    let version: [u8; 5] = [0xa0, 0x03, 0x02, 0x01, 0x02];
    let serial: [u8; 3] = [0x02, 0x01, 0x01];
    let mut tbs = [0u8; 256];
    let tbs_len = der(
        0x30,
        &[
            &version,
            &serial,
            &ECDSA_WITH_SHA256,
            name,
            &validity[..validity_len],
            name,
            &spki[..spki_len],
        ],
        &mut tbs,
    )?;

    let mut sig = [0u8; 16];
    let sig_len = der(0x03, &[&[0x00], &[0xAA; 8]], &mut sig)?;

    der(
        0x30,
        &[&tbs[..tbs_len], &ECDSA_WITH_SHA256, &sig[..sig_len]],
        out,
    )
}

/// Write one DER TLV whose content is the concatenation of `parts`.
fn der(tag: u8, parts: &[&[u8]], out: &mut [u8]) -> Result<usize, Error> {
    let content_len: usize = parts.iter().map(|p| p.len()).sum();
    let mut header = [0u8; 4];
    header[0] = tag;
    let header_len = 1 + write_asn1_length(content_len, &mut header[1..])?;
    let total = header_len + content_len;
    if out.len() < total {
        return Err(Error::BufferTooSmall { needed: total });
    }
    out[..header_len].copy_from_slice(&header[..header_len]);
    let mut off = header_len;
    for part in parts {
        out[off..off + part.len()].copy_from_slice(part);
        off += part.len();
    }
    Ok(total)
}

fn write_asn1_length(len: usize, out: &mut [u8]) -> Result<usize, Error> {
    match len {
        0..=0x7f => {
            out[0] = len as u8;
            Ok(1)
        }
        0x80..=0xff => {
            out[0] = 0x81;
            out[1] = len as u8;
            Ok(2)
        }
        0x100..=0xffff => {
            out[0] = 0x82;
            out[1..3].copy_from_slice(&(len as u16).to_be_bytes());
            Ok(3)
        }
        _ => Err(Error::InvalidParameters),
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
