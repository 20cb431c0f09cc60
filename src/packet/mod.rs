//! Packets and the packet allocator boundary.
//!
//! A [`Packet`] is a fixed-capacity byte buffer with an append cursor and
//! two named regions at its front: the record header and the explicit IV.
//! Packets come from a [`PacketAllocator`] and must be handed back exactly
//! once, either by `release` or by giving them to a transport's `send`.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::buf::{Buf, BufExt};
use crate::config::MAX_PACKET_SIZE;
use crate::error::Error;

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOption {
    NoWait,
    Forever,
    /// Implementation-defined ticks.
    Ticks(u32),
}

/// A framed byte buffer.
pub struct Packet {
    data: Buf<MAX_PACKET_SIZE>,
    len: usize,
    header_len: usize,
    iv_len: usize,
}

impl Packet {
    /// A zero-filled packet able to hold `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        if capacity > MAX_PACKET_SIZE {
            return Err(Error::InvalidParameters);
        }
        let mut data = Buf::new();
        data.buf_resize(capacity)?;
        Ok(Self {
            data,
            len: 0,
            header_len: 0,
            iv_len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.buf_len()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Reserve a record header region and a zero-filled IV region at the
    /// front of an empty packet.
    pub fn reserve_record_regions(&mut self, header_len: usize, iv_len: usize) -> Result<(), Error> {
        if self.len != 0 {
            return Err(Error::InvalidState);
        }
        let needed = header_len + iv_len;
        if needed > self.capacity() {
            return Err(Error::BufferTooSmall { needed });
        }
        self.data.buf_as_mut_slice()[..needed].fill(0);
        self.header_len = header_len;
        self.iv_len = iv_len;
        self.len = needed;
        Ok(())
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn iv_len(&self) -> usize {
        self.iv_len
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        self.header_len + self.iv_len
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.len + bytes.len();
        if end > self.capacity() {
            return Err(Error::BufferTooSmall { needed: end });
        }
        self.data.buf_as_mut_slice()[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// The free tail of the packet, for writers that report how much they used.
    /// Follow with [`Packet::advance`].
    pub fn append_region(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.data.buf_as_mut_slice()[len..]
    }

    pub fn advance(&mut self, n: usize) -> Result<(), Error> {
        let end = self.len + n;
        if end > self.capacity() {
            return Err(Error::BufferTooSmall { needed: end });
        }
        self.len = end;
        Ok(())
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    /// Discard contents and regions.
    pub fn clear(&mut self) {
        self.len = 0;
        self.header_len = 0;
        self.iv_len = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data.buf_as_slice()[..self.len]
    }

    /// Whole backing store up to capacity, for in-place record sealing.
    pub fn storage_mut(&mut self) -> &mut [u8] {
        self.data.buf_as_mut_slice()
    }

    pub fn header_mut(&mut self) -> &mut [u8] {
        let end = self.header_len;
        &mut self.data.buf_as_mut_slice()[..end]
    }

    pub fn iv_mut(&mut self) -> &mut [u8] {
        let (start, end) = (self.header_len, self.header_len + self.iv_len);
        &mut self.data.buf_as_mut_slice()[start..end]
    }

    pub fn payload(&self) -> &[u8] {
        let start = core::cmp::min(self.payload_offset(), self.len);
        &self.data.buf_as_slice()[start..self.len]
    }

    /// Build a packet holding `bytes`, for transports that receive raw data.
    pub fn from_bytes(bytes: &[u8], capacity: usize) -> Result<Self, Error> {
        let mut packet = Self::with_capacity(capacity)?;
        packet.append(bytes)?;
        Ok(packet)
    }
}

impl core::fmt::Debug for Packet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("header_len", &self.header_len)
            .field("iv_len", &self.iv_len)
            .finish()
    }
}

/// Source of packets.
pub trait PacketAllocator {
    fn allocate(&self, wait: WaitOption) -> Result<Packet, Error>;

    /// Return a packet. Every allocated packet is released exactly once.
    fn release(&self, packet: Packet);
}

/// Counting allocator with a cap on outstanding packets.
///
/// Counters are atomic so one pool can back both ends of an in-memory link.
/// An exhausted pool reports [`Error::NoPacket`] regardless of the wait option.
pub struct PacketPool {
    packet_size: usize,
    max_outstanding: usize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
    in_use: AtomicUsize,
}

impl PacketPool {
    pub const fn new(packet_size: usize, max_outstanding: usize) -> Self {
        Self {
            packet_size,
            max_outstanding,
            allocations: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Acquire)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Acquire)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl PacketAllocator for PacketPool {
    fn allocate(&self, _wait: WaitOption) -> Result<Packet, Error> {
        let max = self.max_outstanding;
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < max {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .map_err(|_| Error::NoPacket)?;
        match Packet::with_capacity(self.packet_size) {
            Ok(packet) => {
                self.allocations.fetch_add(1, Ordering::AcqRel);
                Ok(packet)
            }
            Err(e) => {
                self.in_use.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn release(&self, packet: Packet) {
        drop(packet);
        self.releases.fetch_add(1, Ordering::AcqRel);
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<A: PacketAllocator + ?Sized> PacketAllocator for &A {
    fn allocate(&self, wait: WaitOption) -> Result<Packet, Error> {
        (**self).allocate(wait)
    }

    fn release(&self, packet: Packet) {
        (**self).release(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_and_append() {
        let mut p = Packet::with_capacity(64).unwrap();
        p.reserve_record_regions(5, 8).unwrap();
        assert_eq!(p.len(), 13);
        assert_eq!(p.payload_offset(), 13);
        assert!(p.payload().is_empty());
        assert!(p.iv_mut().iter().all(|&b| b == 0));

        p.append(b"abc").unwrap();
        assert_eq!(p.payload(), b"abc");
        assert_eq!(p.remaining(), 64 - 16);
    }

    #[test]
    fn append_region_and_advance() {
        let mut p = Packet::with_capacity(16).unwrap();
        let region = p.append_region();
        assert_eq!(region.len(), 16);
        region[..2].copy_from_slice(&[1, 2]);
        p.advance(2).unwrap();
        assert_eq!(p.as_bytes(), &[1, 2]);
        assert_eq!(p.advance(15), Err(Error::BufferTooSmall { needed: 17 }));
    }

    #[test]
    fn append_overflow() {
        let mut p = Packet::with_capacity(4).unwrap();
        assert_eq!(p.append(&[0; 5]), Err(Error::BufferTooSmall { needed: 5 }));
        assert!(p.is_empty());
    }

    #[test]
    fn regions_need_empty_packet() {
        let mut p = Packet::with_capacity(32).unwrap();
        p.append(b"x").unwrap();
        assert_eq!(p.reserve_record_regions(5, 0), Err(Error::InvalidState));
    }

    #[test]
    fn pool_counts_and_caps() {
        let pool = PacketPool::new(128, 2);
        let a = pool.allocate(WaitOption::NoWait).unwrap();
        let b = pool.allocate(WaitOption::Forever).unwrap();
        assert_eq!(pool.allocate(WaitOption::NoWait).unwrap_err(), Error::NoPacket);
        assert_eq!(pool.in_use(), 2);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.allocations(), 2);
        assert_eq!(pool.releases(), 2);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn oversized_pool_packets_fail_cleanly() {
        let pool = PacketPool::new(MAX_PACKET_SIZE + 1, 1);
        assert_eq!(
            pool.allocate(WaitOption::NoWait).unwrap_err(),
            Error::InvalidParameters
        );
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.allocations(), 0);
    }
}
