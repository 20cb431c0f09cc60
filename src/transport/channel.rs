//! In-memory transport over `std::sync::mpsc`, for tests and host tools.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use crate::error::Error;
use crate::packet::{Packet, PacketAllocator, PacketPool, WaitOption};
use crate::transport::Transport;

/// One end of a bidirectional in-memory link. `Ticks` waits are milliseconds.
pub struct ChannelTransport<'p> {
    pool: &'p PacketPool,
    tx: Sender<Packet>,
    rx: Receiver<Packet>,
}

/// Two connected ends drawing packets from the same pool.
pub fn channel_pair(pool: &PacketPool) -> (ChannelTransport<'_>, ChannelTransport<'_>) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        ChannelTransport { pool, tx: a_tx, rx: a_rx },
        ChannelTransport { pool, tx: b_tx, rx: b_rx },
    )
}

impl PacketAllocator for ChannelTransport<'_> {
    fn allocate(&self, wait: WaitOption) -> Result<Packet, Error> {
        self.pool.allocate(wait)
    }

    fn release(&self, packet: Packet) {
        self.pool.release(packet)
    }
}

impl Transport for ChannelTransport<'_> {
    fn receive(&mut self, wait: WaitOption) -> Result<Packet, Error> {
        match wait {
            WaitOption::NoWait => self.rx.try_recv().map_err(|e| match e {
                TryRecvError::Empty => Error::NoPacket,
                TryRecvError::Disconnected => Error::Transport,
            }),
            WaitOption::Forever => self.rx.recv().map_err(|_| Error::Transport),
            WaitOption::Ticks(ms) => self
                .rx
                .recv_timeout(Duration::from_millis(u64::from(ms)))
                .map_err(|e| match e {
                    RecvTimeoutError::Timeout => Error::NoPacket,
                    RecvTimeoutError::Disconnected => Error::Transport,
                }),
        }
    }

    fn send(&mut self, packet: Packet, _wait: WaitOption) -> Result<(), Error> {
        self.tx.send(packet).map_err(|mpsc::SendError(packet)| {
            self.pool.release(packet);
            Error::Transport
        })
    }
}
