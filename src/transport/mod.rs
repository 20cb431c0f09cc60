//! Transport boundary.
//!
//! The session never touches sockets. It asks a [`Transport`] for packets
//! carrying raw record bytes and hands it packets carrying records to send.

#[cfg(feature = "std")]
pub mod channel;

use crate::error::Error;
use crate::packet::{Packet, PacketAllocator, WaitOption};

/// A byte-stream transport that moves packets.
///
/// `receive` returns [`Error::NoPacket`] when nothing arrived within the
/// wait, and [`Error::Transport`] for a hard failure. `send` takes ownership
/// of the packet; on failure the transport has already released it.
pub trait Transport: PacketAllocator {
    fn receive(&mut self, wait: WaitOption) -> Result<Packet, Error>;

    fn send(&mut self, packet: Packet, wait: WaitOption) -> Result<(), Error>;
}
