//! Plain pre-shared key exchange (RFC 4279 section 2).

use super::{check_room, KeyExchangeContext, KeyExchangeMethod};
use crate::error::Error;

pub struct Psk;

pub static PSK: Psk = Psk;

fn read_u16_vector(body: &[u8]) -> Result<&[u8], Error> {
    if body.len() < 2 {
        return Err(Error::Decode);
    }
    let len = u16::from_be_bytes([body[0], body[1]]) as usize;
    if body.len() != 2 + len {
        return Err(Error::Decode);
    }
    Ok(&body[2..])
}

impl KeyExchangeMethod for Psk {
    fn name(&self) -> &'static str {
        "PSK"
    }

    /// `uint16 N || N zero bytes || uint16 N || psk`.
    fn generate_premaster_secret(&self, ctx: &mut KeyExchangeContext<'_>) -> Result<(), Error> {
        if !ctx.key_material.has_psk() {
            return Err(Error::PskNotFound);
        }
        let n = ctx.key_material.psk().len();
        let mut psk = [0u8; crate::config::MAX_PSK_SIZE];
        psk[..n].copy_from_slice(ctx.key_material.psk());

        let pm = ctx.key_material.pre_master_mut();
        let len_bytes = (n as u16).to_be_bytes();
        pm[0..2].copy_from_slice(&len_bytes);
        pm[2..2 + n].fill(0);
        pm[2 + n..4 + n].copy_from_slice(&len_bytes);
        pm[4 + n..4 + 2 * n].copy_from_slice(&psk[..n]);
        ctx.key_material.commit_pre_master(4 + 2 * n);

        zeroize::Zeroize::zeroize(&mut psk);
        Ok(())
    }

    fn generate_server_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        let entry = ctx.psk_registry.entry(0).ok_or(Error::PskNotFound)?;
        let hint = entry.hint();
        if ctx.tls13 || hint.is_empty() {
            return Ok(0);
        }
        let len = 2 + hint.len();
        check_room(out, len)?;
        out[0..2].copy_from_slice(&(hint.len() as u16).to_be_bytes());
        out[2..len].copy_from_slice(hint);
        Ok(len)
    }

    fn process_server_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        let hint = read_u16_vector(body)?;
        let entry = ctx
            .psk_registry
            .find_by_hint(hint)
            .or_else(|| ctx.psk_registry.entry(0))
            .ok_or(Error::PskNotFound)?;
        tracing::trace!(hint_len = hint.len(), "PSK identity hint received");
        ctx.key_material.set_psk(entry.secret(), entry.identity())
    }

    fn generate_client_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        if !ctx.key_material.has_psk() {
            let entry = ctx.psk_registry.entry(0).ok_or(Error::PskNotFound)?;
            ctx.key_material.set_psk(entry.secret(), entry.identity())?;
        }
        let identity = ctx.key_material.psk_identity();
        let len = 2 + identity.len();
        check_room(out, len)?;
        out[0..2].copy_from_slice(&(identity.len() as u16).to_be_bytes());
        out[2..len].copy_from_slice(identity);
        Ok(len)
    }

    fn process_client_key_exchange(
        &self,
        ctx: &mut KeyExchangeContext<'_>,
        body: &[u8],
    ) -> Result<(), Error> {
        let identity = read_u16_vector(body)?;
        let Some(entry) = ctx.psk_registry.find_by_identity(identity) else {
            tracing::debug!(identity_len = identity.len(), "unknown PSK identity");
            return Err(Error::PskNotFound);
        };
        ctx.key_material.set_psk(entry.secret(), entry.identity())
    }
}
