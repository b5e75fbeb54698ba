//! BACnet network layer: addressing, NPDU codec, routing and discovery.
//!
//! The pieces, leaves first:
//!
//! - [`address`]: the six-variant addressing taxonomy.
//! - [`npdu`]: the bit-exact NPDU header codec.
//! - [`message`]: the closed network-layer message enum.
//! - [`adapter`]: one bound transport per attached network.
//! - [`cache`]: the two-index router info cache.
//! - [`sap`]: the forwarding engine tying them together.
//!
//! The discovery protocol handlers live in a private element driven by the
//! access point's inbound dispatch.

pub mod adapter;
pub mod address;
pub mod cache;
mod element;
pub mod message;
pub mod npdu;
pub mod sap;

pub use adapter::NetworkAdapter;
pub use address::{Address, NetNumber, GLOBAL_BROADCAST_DNET};
pub use cache::{RouterInfo, RouterInfoCache, RouterStatus};
pub use message::NetworkMessage;
pub use npdu::{Npdu, NpduError, INITIAL_HOP_COUNT};
pub use sap::{AdapterId, ApplicationLayer, NetworkError, NetworkServiceAccessPoint, SapStats};
