//! Pre-shared key registry (RFC 4279).
//!
//! A fixed table of secrets with their identities and identity hints. The
//! registry is the only state sessions share, so every access goes through
//! one critical-section mutex. It has a `const` constructor and can live in
//! a `static`.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{MAX_PSK_ID_SIZE, MAX_PSK_KEYS, MAX_PSK_SIZE};
use crate::error::Error;

/// One PSK slot.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PskEntry {
    secret: [u8; MAX_PSK_SIZE],
    secret_len: usize,
    identity: [u8; MAX_PSK_ID_SIZE],
    identity_len: usize,
    hint: [u8; MAX_PSK_ID_SIZE],
    hint_len: usize,
}

impl PskEntry {
    const EMPTY: Self = Self {
        secret: [0; MAX_PSK_SIZE],
        secret_len: 0,
        identity: [0; MAX_PSK_ID_SIZE],
        identity_len: 0,
        hint: [0; MAX_PSK_ID_SIZE],
        hint_len: 0,
    };

    pub fn secret(&self) -> &[u8] {
        &self.secret[..self.secret_len]
    }

    pub fn identity(&self) -> &[u8] {
        &self.identity[..self.identity_len]
    }

    pub fn hint(&self) -> &[u8] {
        &self.hint[..self.hint_len]
    }
}

impl core::fmt::Debug for PskEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PskEntry")
            .field("identity", &self.identity())
            .field("hint", &self.hint())
            .finish_non_exhaustive()
    }
}

struct PskTable {
    entries: [PskEntry; MAX_PSK_KEYS],
    count: usize,
}

/// Shared PSK table.
pub struct PskRegistry {
    inner: Mutex<CriticalSectionRawMutex, RefCell<PskTable>>,
}

impl PskRegistry {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PskTable {
                entries: [PskEntry::EMPTY; MAX_PSK_KEYS],
                count: 0,
            })),
        }
    }

    /// Store a secret with its identity and identity hint.
    ///
    /// Accepted only while `count + 1 < MAX_PSK_KEYS` and each field fits
    /// its bound; otherwise fails with `NoMorePskSpace` and leaves the table
    /// unchanged.
    pub fn add_psk(&self, psk: &[u8], identity: &[u8], hint: &[u8]) -> Result<(), Error> {
        self.inner.lock(|cell| {
            let mut table = cell.borrow_mut();
            if table.count + 1 >= MAX_PSK_KEYS
                || psk.len() > MAX_PSK_SIZE
                || identity.len() > MAX_PSK_ID_SIZE
                || hint.len() > MAX_PSK_ID_SIZE
            {
                tracing::debug!(
                    count = table.count,
                    psk_len = psk.len(),
                    identity_len = identity.len(),
                    hint_len = hint.len(),
                    "PSK rejected"
                );
                return Err(Error::NoMorePskSpace);
            }

            let index = table.count;
            let entry = &mut table.entries[index];
            entry.secret[..psk.len()].copy_from_slice(psk);
            entry.secret_len = psk.len();
            entry.identity[..identity.len()].copy_from_slice(identity);
            entry.identity_len = identity.len();
            entry.hint[..hint.len()].copy_from_slice(hint);
            entry.hint_len = hint.len();
            table.count += 1;
            Ok(())
        })
    }

    pub fn count(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().count)
    }

    /// Copy of entry `index`, if populated.
    pub fn entry(&self, index: usize) -> Option<PskEntry> {
        self.inner.lock(|cell| {
            let table = cell.borrow();
            (index < table.count).then(|| table.entries[index].clone())
        })
    }

    /// First entry whose identity equals `identity`.
    pub fn find_by_identity(&self, identity: &[u8]) -> Option<PskEntry> {
        self.find(|e| e.identity() == identity)
    }

    /// First entry whose hint equals `hint`.
    pub fn find_by_hint(&self, hint: &[u8]) -> Option<PskEntry> {
        self.find(|e| e.hint() == hint)
    }

    fn find(&self, pred: impl Fn(&PskEntry) -> bool) -> Option<PskEntry> {
        self.inner.lock(|cell| {
            let table = cell.borrow();
            table.entries[..table.count]
                .iter()
                .find(|e| pred(e))
                .cloned()
        })
    }

    /// Zeroize every slot and empty the table.
    pub fn clear(&self) {
        self.inner.lock(|cell| {
            let mut table = cell.borrow_mut();
            for entry in table.entries.iter_mut() {
                entry.zeroize();
            }
            table.count = 0;
        })
    }
}

impl Default for PskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
