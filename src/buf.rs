//! Byte buffers for packets and reassembly.
//!
//! `Buf<N>` holds at most `N` bytes inline (`heapless::Vec`) unless the
//! `alloc` feature is on, in which case it is a `Vec<u8>` and `N` is only a
//! hint. [`BufExt`] gives both one fallible API so callers never branch on
//! the feature.

use crate::error::Error;

#[cfg(not(feature = "alloc"))]
pub type Buf<const N: usize> = heapless::Vec<u8, N>;

#[cfg(feature = "alloc")]
pub type Buf<const N: usize> = alloc::vec::Vec<u8>;

pub trait BufExt {
    fn buf_len(&self) -> usize;
    fn buf_is_empty(&self) -> bool {
        self.buf_len() == 0
    }
    fn buf_clear(&mut self);
    /// Append `data`; a full inline buffer reports the length it would need.
    fn buf_extend_from_slice(&mut self, data: &[u8]) -> Result<(), Error>;
    /// Grow or shrink to `len`, zero-filling new bytes.
    fn buf_resize(&mut self, len: usize) -> Result<(), Error>;
    fn buf_as_slice(&self) -> &[u8];
    fn buf_as_mut_slice(&mut self) -> &mut [u8];
    /// Drop the first `n` bytes (all of them if `n` exceeds the length).
    fn buf_drain_front(&mut self, n: usize);
}

impl<const N: usize> BufExt for heapless::Vec<u8, N> {
    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_clear(&mut self) {
        self.clear();
    }

    fn buf_extend_from_slice(&mut self, data: &[u8]) -> Result<(), Error> {
        let needed = self.len() + data.len();
        self.extend_from_slice(data)
            .map_err(|_| Error::BufferTooSmall { needed })
    }

    fn buf_resize(&mut self, len: usize) -> Result<(), Error> {
        self.resize(len, 0)
            .map_err(|_| Error::BufferTooSmall { needed: len })
    }

    fn buf_as_slice(&self) -> &[u8] {
        self
    }

    fn buf_as_mut_slice(&mut self) -> &mut [u8] {
        self
    }

    fn buf_drain_front(&mut self, n: usize) {
        let n = n.min(self.len());
        self.copy_within(n.., 0);
        self.truncate(self.len() - n);
    }
}

#[cfg(feature = "alloc")]
impl BufExt for alloc::vec::Vec<u8> {
    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_clear(&mut self) {
        self.clear();
    }

    fn buf_extend_from_slice(&mut self, data: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn buf_resize(&mut self, len: usize) -> Result<(), Error> {
        self.resize(len, 0);
        Ok(())
    }

    fn buf_as_slice(&self) -> &[u8] {
        self
    }

    fn buf_as_mut_slice(&mut self) -> &mut [u8] {
        self
    }

    fn buf_drain_front(&mut self, n: usize) {
        let n = n.min(self.len());
        self.drain(..n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_front_keeps_tail() {
        let mut b: heapless::Vec<u8, 8> = heapless::Vec::new();
        b.buf_extend_from_slice(b"abcdef").unwrap();
        b.buf_drain_front(2);
        assert_eq!(b.buf_as_slice(), b"cdef");
        b.buf_drain_front(10);
        assert!(b.buf_is_empty());
    }

    #[test]
    fn inline_overflow_reports_needed() {
        let mut b: heapless::Vec<u8, 4> = heapless::Vec::new();
        b.buf_extend_from_slice(b"abc").unwrap();
        assert_eq!(
            b.buf_extend_from_slice(b"de"),
            Err(Error::BufferTooSmall { needed: 5 })
        );
        assert_eq!(b.buf_len(), 3);
        assert_eq!(b.buf_resize(5), Err(Error::BufferTooSmall { needed: 5 }));
    }
}
