#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod buf;
pub mod config;
pub mod error;

pub mod certificate;
pub mod ciphersuite;
pub mod crypto;
pub mod handshake;
pub mod key_exchange;
pub mod key_material;
pub mod packet;
pub mod psk;
pub mod record;
pub mod session;
pub mod transport;

pub use ciphersuite::{lookup as lookup_ciphersuite, CiphersuiteInfo};
pub use config::SessionConfig;
pub use error::Error;
pub use handshake::{AlertDescription, HandshakeState, HandshakeStatus, Role};
pub use key_exchange::NamedGroup;
pub use packet::{Packet, PacketAllocator, PacketPool, WaitOption};
pub use psk::PskRegistry;
pub use record::ProtocolVersion;
pub use session::Session;
pub use transport::Transport;
