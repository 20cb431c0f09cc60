//! Ephemeral elliptic-curve Diffie-Hellman (RFC 8422), ECDSA-signed.

use zeroize::Zeroize;

use super::{check_room, KeyExchangeContext, KeyExchangeMethod, NamedGroup};
use crate::crypto::ecdsa_p256::{
    sign_key_exchange_params, verify_key_exchange_params, ECDSA_SECP256R1_SHA256,
};
use crate::error::Error;

/// ECCurveType named_curve.
const NAMED_CURVE: u8 = 3;

pub struct Ecdhe;

pub static ECDHE: Ecdhe = Ecdhe;

impl Ecdhe {
    /// Make sure the handshake has an ephemeral key, picking a group if needed.
    fn ensure_key(ctx: &mut KeyExchangeContext<'_>) -> Result<NamedGroup, Error> {
        let group = ctx
            .ecdhe
            .group()
            .or_else(|| ctx.groups.first().copied())
            .ok_or(Error::HandshakeFailure)?;
        if !ctx.ecdhe.has_secret() {
            ctx.ecdhe.generate(group, &mut *ctx.rng)?;
        }
        Ok(group)
    }
}

impl KeyExchangeMethod for Ecdhe {
    fn name(&self) -> &'static str {
        "ECDHE"
    }

    fn generate_premaster_secret(&self, ctx: &mut KeyExchangeContext<'_>) -> Result<(), Error> {
        let mut shared = [0u8; 32];
        let result = ctx
            .ecdhe
            .shared_secret(&mut shared)
            .and_then(|()| ctx.key_material.set_pre_master(&shared));
        shared.zeroize();
        result
    }

    fn generate_server_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        let group = Self::ensure_key(ctx)?;
        let public = ctx.ecdhe.public_key();

        if ctx.tls13 {
            // KeyShareEntry
            let len = 4 + public.len();
            check_room(out, len)?;
            out[0..2].copy_from_slice(&group.to_u16().to_be_bytes());
            out[2..4].copy_from_slice(&(public.len() as u16).to_be_bytes());
            out[4..len].copy_from_slice(public);
            return Ok(len);
        }

        // ServerECDHParams
        let params_len = 4 + public.len();
        check_room(out, params_len)?;
        out[0] = NAMED_CURVE;
        out[1..3].copy_from_slice(&group.to_u16().to_be_bytes());
        out[3] = public.len() as u8;
        out[4..params_len].copy_from_slice(public);

        let key = ctx.signing_key.ok_or(Error::HandshakeFailure)?;
        let signature = sign_key_exchange_params(
            key,
            &ctx.key_material.client_random,
            &ctx.key_material.server_random,
            &out[..params_len],
        )?;

        let total = params_len + 4 + signature.len();
        check_room(out, total)?;
        out[params_len..params_len + 2].copy_from_slice(&ECDSA_SECP256R1_SHA256.to_be_bytes());
        out[params_len + 2..params_len + 4]
            .copy_from_slice(&(signature.len() as u16).to_be_bytes());
        out[params_len + 4..total].copy_from_slice(&signature);
        Ok(total)
    }

    fn process_server_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        if body.len() < 4 || body[0] != NAMED_CURVE {
            return Err(Error::Decode);
        }
        let group = NamedGroup::from_u16(u16::from_be_bytes([body[1], body[2]]))
            .ok_or(Error::HandshakeFailure)?;
        if !ctx.groups.contains(&group) {
            return Err(Error::HandshakeFailure);
        }
        let point_len = body[3] as usize;
        let params_len = 4 + point_len;
        if body.len() < params_len + 4 {
            return Err(Error::Decode);
        }
        let (params, rest) = body.split_at(params_len);

        let scheme = u16::from_be_bytes([rest[0], rest[1]]);
        if scheme != ECDSA_SECP256R1_SHA256 {
            return Err(Error::HandshakeFailure);
        }
        let sig_len = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        if rest.len() != 4 + sig_len {
            return Err(Error::Decode);
        }
        let signature = &rest[4..];

        let server_key = ctx.peer_signing_key.ok_or(Error::BadCertificate)?;
        verify_key_exchange_params(
            server_key,
            signature,
            &ctx.key_material.client_random,
            &ctx.key_material.server_random,
            params,
        )?;

        ctx.ecdhe.select_group(group);
        ctx.ecdhe.set_peer_public(&params[4..])?;
        tracing::trace!(?group, "server ECDH params verified");
        Ok(())
    }

    fn generate_client_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        Self::ensure_key(ctx)?;
        let public = ctx.ecdhe.public_key();
        let len = 1 + public.len();
        check_room(out, len)?;
        out[0] = public.len() as u8;
        out[1..len].copy_from_slice(public);
        Ok(len)
    }

    fn process_client_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        if body.is_empty() || body[0] as usize != body.len() - 1 {
            return Err(Error::Decode);
        }
        if !ctx.ecdhe.has_secret() {
            return Err(Error::InvalidState);
        }
        ctx.ecdhe.set_peer_public(&body[1..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecdsa_p256::p256_public_key_from_scalar;
    use crate::handshake::Role;
    use crate::key_exchange::test_support::Parts;
    use crate::psk::PskRegistry;

    const SCALAR: [u8; 32] = [0x42; 32];

    #[test]
    fn full_exchange_agrees() {
        let registry = PskRegistry::new();
        let server_pub = p256_public_key_from_scalar(&SCALAR).unwrap();
        let mut server = Parts::new(1);
        let mut client = Parts::new(2);
        for p in [&mut server, &mut client] {
            p.key_material.client_random = [0xC1; 32];
            p.key_material.server_random = [0x5E; 32];
        }

        let mut ske = [0u8; 256];
        let ske_len = {
            let mut ctx = server.ctx(Role::Server, &registry, Some(&SCALAR), None);
            ECDHE.generate_server_key_exchange(&mut ctx, &mut ske).unwrap()
        };
        assert_eq!(ske[0], NAMED_CURVE);
        assert_eq!(u16::from_be_bytes([ske[1], ske[2]]), NamedGroup::X25519.to_u16());

        let mut cke = [0u8; 128];
        let cke_len = {
            let mut ctx = client.ctx(Role::Client, &registry, None, Some(&server_pub));
            ECDHE.process_server_key_exchange(&mut ctx, &ske[..ske_len]).unwrap();
            let n = ECDHE.generate_client_key_exchange(&mut ctx, &mut cke).unwrap();
            ECDHE.generate_premaster_secret(&mut ctx).unwrap();
            n
        };
        assert_eq!(cke_len, 33);

        {
            let mut ctx = server.ctx(Role::Server, &registry, Some(&SCALAR), None);
            ECDHE.process_client_key_exchange(&mut ctx, &cke[..cke_len]).unwrap();
            ECDHE.generate_premaster_secret(&mut ctx).unwrap();
        }

        assert_eq!(server.key_material.pre_master().len(), 32);
        assert_eq!(server.key_material.pre_master(), client.key_material.pre_master());
    }

    #[test]
    fn tampered_signature_rejected() {
        let registry = PskRegistry::new();
        let server_pub = p256_public_key_from_scalar(&SCALAR).unwrap();
        let mut server = Parts::new(3);
        let mut client = Parts::new(4);

        let mut ske = [0u8; 256];
        let n = {
            let mut ctx = server.ctx(Role::Server, &registry, Some(&SCALAR), None);
            ECDHE.generate_server_key_exchange(&mut ctx, &mut ske).unwrap()
        };
        ske[5] ^= 0xff;
        let mut ctx = client.ctx(Role::Client, &registry, None, Some(&server_pub));
        assert_eq!(
            ECDHE.process_server_key_exchange(&mut ctx, &ske[..n]),
            Err(Error::DecryptError)
        );
    }

    #[test]
    fn server_without_signing_key_fails() {
        let registry = PskRegistry::new();
        let mut server = Parts::new(5);
        let mut ctx = server.ctx(Role::Server, &registry, None, None);
        let mut out = [0u8; 256];
        assert_eq!(
            ECDHE.generate_server_key_exchange(&mut ctx, &mut out),
            Err(Error::HandshakeFailure)
        );
    }

    #[test]
    fn tls13_writes_key_share_entry() {
        let registry = PskRegistry::new();
        let mut server = Parts::new(6);
        server.ecdhe.select_group(NamedGroup::Secp256r1);
        let mut ctx = server.ctx(Role::Server, &registry, None, None);
        ctx.tls13 = true;
        let mut out = [0u8; 128];
        let n = ECDHE.generate_server_key_exchange(&mut ctx, &mut out).unwrap();
        assert_eq!(n, 4 + 65);
        assert_eq!(&out[..4], &[0x00, 0x17, 0x00, 65]);
        assert_eq!(out[4], 0x04);
    }

    #[test]
    fn short_output_reports_needed() {
        let registry = PskRegistry::new();
        let mut server = Parts::new(7);
        let mut ctx = server.ctx(Role::Server, &registry, Some(&SCALAR), None);
        let mut out = [0u8; 8];
        assert_eq!(
            ECDHE.generate_server_key_exchange(&mut ctx, &mut out),
            Err(Error::BufferTooSmall { needed: 36 })
        );
    }

    #[test]
    fn malformed_client_key_exchange() {
        let registry = PskRegistry::new();
        let mut server = Parts::new(8);
        let mut ctx = server.ctx(Role::Server, &registry, Some(&SCALAR), None);
        let mut out = [0u8; 256];
        ECDHE.generate_server_key_exchange(&mut ctx, &mut out).unwrap();
        assert_eq!(ECDHE.process_client_key_exchange(&mut ctx, &[5, 1, 2]), Err(Error::Decode));
        assert_eq!(ECDHE.process_client_key_exchange(&mut ctx, &[]), Err(Error::Decode));
    }
}
