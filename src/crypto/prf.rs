//! TLS 1.2 pseudo-random function (RFC 5246 section 5).
//!
//! `PRF(secret, label, seed) = P_<hash>(secret, label || seed)` where
//! `P_hash` chains `A(i) = HMAC(secret, A(i-1))` and emits
//! `HMAC(secret, A(i) || label || seed)` blocks.

use zeroize::Zeroize;

use crate::crypto::mac::{HmacState, MAX_MAC_LEN};
use crate::crypto::HashAlgorithm;
use crate::error::Error;

/// Fill `out` with `PRF(secret, label, seed[0] || seed[1] || ...)`.
pub fn prf(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    seed: &[&[u8]],
    out: &mut [u8],
) -> Result<(), Error> {
    let keyed = HmacState::new(hash, secret)?;

    let mut a = [0u8; MAX_MAC_LEN];
    let mut block = [0u8; MAX_MAC_LEN];

    // A(1)
    let mut mac = keyed.clone();
    mac.update(label);
    for s in seed {
        mac.update(s);
    }
    let hash_len = mac.finalize_into(&mut a);

    let mut offset = 0;
    while offset < out.len() {
        let mut mac = keyed.clone();
        mac.update(&a[..hash_len]);
        mac.update(label);
        for s in seed {
            mac.update(s);
        }
        mac.finalize_into(&mut block);

        let n = core::cmp::min(hash_len, out.len() - offset);
        out[offset..offset + n].copy_from_slice(&block[..n]);
        offset += n;

        let mut mac = keyed.clone();
        mac.update(&a[..hash_len]);
        mac.finalize_into(&mut a);
    }

    a.zeroize();
    block.zeroize();
    Ok(())
}
