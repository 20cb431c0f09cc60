//! Storage for certificates received from the peer.
//!
//! The caller lends one byte buffer; it is carved into equal slots, each
//! starting with a control block:
//!
//! ```text
//! +----------------+-----------+-------------+------------------------+
//! | used_len (u32) | flags u16 | reserved u16| certificate DER ...    |
//! +----------------+-----------+-------------+------------------------+
//! ```

use crate::config::{CERTIFICATE_CONTROL_BLOCK_LEN, MAX_REMOTE_CERTIFICATES, MINIMUM_CERTIFICATE_SIZE};
use crate::error::Error;

const FLAG_ALLOCATED: u16 = 0x0001;
const FLAG_IN_USE: u16 = 0x0002;

/// Remote certificates, stored in caller-owned memory.
pub struct RemoteCertificateStore<'a> {
    slots: heapless::Vec<&'a mut [u8], MAX_REMOTE_CERTIFICATES>,
}

impl<'a> RemoteCertificateStore<'a> {
    /// A store with no slots. Certificates offered to it are rejected.
    pub const fn empty() -> Self {
        Self {
            slots: heapless::Vec::new(),
        }
    }

    /// Split `buffer` into `cert_count` equal slots.
    ///
    /// Fails with `InvalidParameters` if `cert_count` is zero or above
    /// [`MAX_REMOTE_CERTIFICATES`], if the buffer cannot hold the control
    /// blocks, or if the slice left for each certificate is below
    /// [`MINIMUM_CERTIFICATE_SIZE`].
    pub fn allocate(cert_count: usize, buffer: &'a mut [u8]) -> Result<Self, Error> {
        if cert_count == 0 || cert_count > MAX_REMOTE_CERTIFICATES {
            return Err(Error::InvalidParameters);
        }
        let overhead = cert_count * CERTIFICATE_CONTROL_BLOCK_LEN;
        if buffer.len() < overhead {
            return Err(Error::InvalidParameters);
        }
        let per_cert = (buffer.len() - overhead) / cert_count;
        if per_cert < MINIMUM_CERTIFICATE_SIZE {
            return Err(Error::InvalidParameters);
        }

        let slot_len = CERTIFICATE_CONTROL_BLOCK_LEN + per_cert;
        let mut store = Self::empty();
        let mut rest: &'a mut [u8] = buffer;
        for _ in 0..cert_count {
            let (slot, tail) = core::mem::take(&mut rest).split_at_mut(slot_len);
            rest = tail;
            init_slot(slot)?;
            store.slots.push(slot).map_err(|_| Error::InvalidParameters)?;
        }
        tracing::debug!(cert_count, per_cert, "remote certificate store allocated");
        Ok(store)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Certificate bytes each slot can hold.
    pub fn slot_capacity(&self) -> usize {
        self.slots
            .first()
            .map_or(0, |s| s.len() - CERTIFICATE_CONTROL_BLOCK_LEN)
    }

    pub fn is_allocated(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Copy `der` into slot `index`.
    pub fn store(&mut self, index: usize, der: &[u8]) -> Result<(), Error> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(Error::InsufficientCertificateSpace)?;
        let capacity = slot.len() - CERTIFICATE_CONTROL_BLOCK_LEN;
        if der.len() > capacity {
            return Err(Error::InsufficientCertificateSpace);
        }
        let (control, body) = slot.split_at_mut(CERTIFICATE_CONTROL_BLOCK_LEN);
        body[..der.len()].copy_from_slice(der);
        control[..4].copy_from_slice(&(der.len() as u32).to_be_bytes());
        control[4..6].copy_from_slice(&(FLAG_ALLOCATED | FLAG_IN_USE).to_be_bytes());
        Ok(())
    }

    /// Certificate in slot `index`, if one was stored.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let slot = self.slots.get(index)?;
        let flags = u16::from_be_bytes([slot[4], slot[5]]);
        if flags & FLAG_IN_USE == 0 {
            return None;
        }
        let used = u32::from_be_bytes([slot[0], slot[1], slot[2], slot[3]]) as usize;
        slot.get(CERTIFICATE_CONTROL_BLOCK_LEN..CERTIFICATE_CONTROL_BLOCK_LEN + used)
    }

    /// Number of slots holding a certificate.
    pub fn stored_count(&self) -> usize {
        (0..self.slots.len()).filter(|&i| self.get(i).is_some()).count()
    }

    /// Mark every slot free and scrub its contents.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.fill(0);
            let _ = init_slot(slot);
        }
    }
}

/// Write a fresh control block.
fn init_slot(slot: &mut [u8]) -> Result<(), Error> {
    if slot.len() < CERTIFICATE_CONTROL_BLOCK_LEN + MINIMUM_CERTIFICATE_SIZE {
        return Err(Error::InvalidParameters);
    }
    slot[..4].copy_from_slice(&0u32.to_be_bytes());
    slot[4..6].copy_from_slice(&FLAG_ALLOCATED.to_be_bytes());
    slot[6..8].copy_from_slice(&0u16.to_be_bytes());
    Ok(())
}
