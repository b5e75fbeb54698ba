//! BACnet network-layer addressing.
//!
//! An [`Address`] names where an NPDU should go (or where it came from) in
//! the two-level BACnet topology: a station on the local network, a station
//! behind a router on a remote network, or one of the broadcast scopes.
//!
//! Station bytes are the opaque link-layer address of a node on its own
//! network (1 byte for MS/TP, 6 bytes for BACnet/IP). Network numbers are
//! 16-bit; 0xFFFF is reserved on the wire for the global broadcast and is
//! never a valid network number of its own.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A BACnet network number.
pub type NetNumber = u16;

/// DNET value reserved for the global broadcast (ASHRAE 135, 6.2.2).
pub const GLOBAL_BROADCAST_DNET: u16 = 0xFFFF;

/// A network-layer address.
///
/// The six variants cover the full addressing taxonomy of the BACnet
/// network layer:
///
/// | Variant | Meaning |
/// |---|---|
/// | `Null` | unset / not yet known |
/// | `LocalStation` | one node on the adapter's own network |
/// | `LocalBroadcast` | all nodes on the adapter's own network |
/// | `RemoteStation` | one node on a different network |
/// | `RemoteBroadcast` | all nodes on a different network |
/// | `GlobalBroadcast` | all nodes on every reachable network |
///
/// A `RemoteStation` or `RemoteBroadcast` whose network number equals the
/// receiving adapter's own number is an addressing error in a well-formed
/// message; the forwarding engine drops such NPDUs rather than routing them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Address {
    /// No address.
    Null,

    /// A specific station on the local network.
    LocalStation(Vec<u8>),

    /// All stations on the local network.
    LocalBroadcast,

    /// A specific station on a remote network.
    RemoteStation(NetNumber, Vec<u8>),

    /// All stations on a remote network.
    RemoteBroadcast(NetNumber),

    /// All stations on all networks.
    GlobalBroadcast,
}

impl Address {
    /// The network number carried by this address, if any.
    pub fn network(&self) -> Option<NetNumber> {
        match self {
            Address::RemoteStation(net, _) => Some(*net),
            Address::RemoteBroadcast(net) => Some(*net),
            _ => None,
        }
    }

    /// The station bytes carried by this address, if any.
    pub fn station(&self) -> Option<&[u8]> {
        match self {
            Address::LocalStation(mac) => Some(mac),
            Address::RemoteStation(_, mac) => Some(mac),
            _ => None,
        }
    }

    /// True for the three broadcast scopes.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Address::LocalBroadcast | Address::RemoteBroadcast(_) | Address::GlobalBroadcast
        )
    }

    /// True for `RemoteStation`, `RemoteBroadcast` and `GlobalBroadcast`,
    /// the variants that travel in the DNET/DADR fields of an NPDU.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Address::RemoteStation(..) | Address::RemoteBroadcast(_) | Address::GlobalBroadcast
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Null => write!(f, "null"),
            Address::LocalStation(mac) => write!(f, "{}", hex::encode(mac)),
            Address::LocalBroadcast => write!(f, "*"),
            Address::RemoteStation(net, mac) => write!(f, "{}:{}", net, hex::encode(mac)),
            Address::RemoteBroadcast(net) => write!(f, "{}:*", net),
            Address::GlobalBroadcast => write!(f, "*:*"),
        }
    }
}
