//! NPDU header codec (ASHRAE 135, Clause 6.2).
//!
//! An NPDU is a small structured header followed by either an opaque
//! application payload (APDU) or a network-layer message body. The header
//! is bit-exact with the BACnet wire format:
//!
//! ```text
//! +---------+---------+===========+===========+========+=======+=========+
//! | Version | Control | DNET/DLEN | SNET/SLEN | Hop    | Msg   | Payload |
//! | (0x01)  |         | /DADR     | /SADR     | Count  | Type  |         |
//! +---------+---------+===========+===========+========+=======+=========+
//! ```
//!
//! Control byte bits: 0x80 network-layer message, 0x20 destination present,
//! 0x08 source present, 0x04 expecting reply, 0x03 priority. The hop count
//! is present iff the destination fields are, and a message-type byte (plus
//! a two-byte vendor id for types in the proprietary range 0x80-0xFF)
//! follows iff the network-layer bit is set.

use bytes::Bytes;
use thiserror::Error;

use crate::network::address::{Address, GLOBAL_BROADCAST_DNET};

/// Protocol version carried in every NPDU.
pub const NPDU_VERSION: u8 = 0x01;

/// Hop count assigned when an NPDU is originated.
pub const INITIAL_HOP_COUNT: u8 = 255;

/// First message type in the vendor-proprietary range.
pub const PROPRIETARY_MESSAGE_BASE: u8 = 0x80;

// Control byte flags.
const CONTROL_NETWORK_MESSAGE: u8 = 0x80;
const CONTROL_DESTINATION: u8 = 0x20;
const CONTROL_SOURCE: u8 = 0x08;
const CONTROL_EXPECTING_REPLY: u8 = 0x04;
const CONTROL_PRIORITY: u8 = 0x03;

/// Per-datagram decode and addressing faults.
///
/// These are never fatal to the engine: the offending NPDU is dropped and
/// logged, and processing of other traffic continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NpduError {
    /// The buffer ended before the header did.
    #[error("truncated NPDU")]
    Truncated,

    /// Unsupported protocol version byte.
    #[error("unsupported NPDU version {0}")]
    Version(u8),

    /// The source fields do not name a remote station (SNET of 0xFFFF or a
    /// zero-length SADR).
    #[error("invalid source address fields")]
    InvalidSource,

    /// A network-layer message body did not match its message type.
    #[error("malformed network message type 0x{0:02x}")]
    InvalidMessage(u8),
}

/// A decoded network-layer protocol data unit.
///
/// `destination` holds the DNET/DADR fields and is always one of the remote
/// variants of [`Address`] (or `None` when the NPDU is locally scoped);
/// `source` holds SNET/SADR and is always `RemoteStation`. `hop_count` is
/// present exactly when `destination` is. When `message_type` is set the
/// payload is a network-layer message body, otherwise it is an opaque APDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Npdu {
    /// Reply expected by the sender (control bit 0x04).
    pub expecting_reply: bool,

    /// Network priority, 0-3 (control bits 0x03).
    pub priority: u8,

    /// DNET/DADR fields, remote variants only.
    pub destination: Option<Address>,

    /// SNET/SADR fields, `RemoteStation` only.
    pub source: Option<Address>,

    /// Remaining hops; decremented by every relaying router.
    pub hop_count: Option<u8>,

    /// Network-layer message type, if the network-layer bit is set.
    pub message_type: Option<u8>,

    /// Vendor id, only for proprietary message types.
    pub vendor_id: Option<u16>,

    /// APDU bytes, or the network-layer message body.
    pub payload: Bytes,
}

impl Npdu {
    /// An application NPDU carrying the given payload, locally scoped.
    pub fn application(payload: Bytes) -> Self {
        Self {
            expecting_reply: false,
            priority: 0,
            destination: None,
            source: None,
            hop_count: None,
            message_type: None,
            vendor_id: None,
            payload,
        }
    }

    /// True when the payload is a network-layer message body.
    pub fn is_network_message(&self) -> bool {
        self.message_type.is_some()
    }

    /// Encode the header and payload to wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.payload.len());

        out.push(NPDU_VERSION);

        let mut control = self.priority & CONTROL_PRIORITY;
        if self.message_type.is_some() {
            control |= CONTROL_NETWORK_MESSAGE;
        }
        if self.destination.is_some() {
            control |= CONTROL_DESTINATION;
        }
        if self.source.is_some() {
            control |= CONTROL_SOURCE;
        }
        if self.expecting_reply {
            control |= CONTROL_EXPECTING_REPLY;
        }
        out.push(control);

        if let Some(dest) = &self.destination {
            let (dnet, dadr): (u16, &[u8]) = match dest {
                Address::RemoteStation(net, mac) => (*net, mac),
                Address::RemoteBroadcast(net) => (*net, &[]),
                Address::GlobalBroadcast => (GLOBAL_BROADCAST_DNET, &[]),
                // Local variants never travel in DNET/DADR fields.
                _ => (GLOBAL_BROADCAST_DNET, &[]),
            };
            out.extend_from_slice(&dnet.to_be_bytes());
            out.push(dadr.len() as u8);
            out.extend_from_slice(dadr);
        }

        if let Some(Address::RemoteStation(snet, sadr)) = &self.source {
            out.extend_from_slice(&snet.to_be_bytes());
            out.push(sadr.len() as u8);
            out.extend_from_slice(sadr);
        }

        if self.destination.is_some() {
            out.push(self.hop_count.unwrap_or(INITIAL_HOP_COUNT));
        }

        if let Some(msg_type) = self.message_type {
            out.push(msg_type);
            if msg_type >= PROPRIETARY_MESSAGE_BASE {
                out.extend_from_slice(&self.vendor_id.unwrap_or(0).to_be_bytes());
            }
        }

        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode an NPDU from wire format.
    pub fn decode(data: &[u8]) -> Result<Self, NpduError> {
        if data.len() < 2 {
            return Err(NpduError::Truncated);
        }
        if data[0] != NPDU_VERSION {
            return Err(NpduError::Version(data[0]));
        }

        let control = data[1];
        let mut pos = 2;

        let destination = if control & CONTROL_DESTINATION != 0 {
            let (dnet, adr) = decode_net_fields(data, &mut pos)?;
            Some(match (dnet, adr.is_empty()) {
                (GLOBAL_BROADCAST_DNET, _) => Address::GlobalBroadcast,
                (net, true) => Address::RemoteBroadcast(net),
                (net, false) => Address::RemoteStation(net, adr),
            })
        } else {
            None
        };

        let source = if control & CONTROL_SOURCE != 0 {
            let (snet, adr) = decode_net_fields(data, &mut pos)?;
            if snet == GLOBAL_BROADCAST_DNET || adr.is_empty() {
                return Err(NpduError::InvalidSource);
            }
            Some(Address::RemoteStation(snet, adr))
        } else {
            None
        };

        let hop_count = if destination.is_some() {
            let hc = *data.get(pos).ok_or(NpduError::Truncated)?;
            pos += 1;
            Some(hc)
        } else {
            None
        };

        let (message_type, vendor_id) = if control & CONTROL_NETWORK_MESSAGE != 0 {
            let msg_type = *data.get(pos).ok_or(NpduError::Truncated)?;
            pos += 1;
            let vendor_id = if msg_type >= PROPRIETARY_MESSAGE_BASE {
                if pos + 2 > data.len() {
                    return Err(NpduError::Truncated);
                }
                let id = u16::from_be_bytes([data[pos], data[pos + 1]]);
                pos += 2;
                Some(id)
            } else {
                None
            };
            (Some(msg_type), vendor_id)
        } else {
            (None, None)
        };

        Ok(Self {
            expecting_reply: control & CONTROL_EXPECTING_REPLY != 0,
            priority: control & CONTROL_PRIORITY,
            destination,
            source,
            hop_count,
            message_type,
            vendor_id,
            payload: Bytes::copy_from_slice(&data[pos..]),
        })
    }
}

/// Decode one NET(2)/LEN(1)/ADR(len) field group.
fn decode_net_fields(data: &[u8], pos: &mut usize) -> Result<(u16, Vec<u8>), NpduError> {
    if *pos + 3 > data.len() {
        return Err(NpduError::Truncated);
    }
    let net = u16::from_be_bytes([data[*pos], data[*pos + 1]]);
    let len = data[*pos + 2] as usize;
    *pos += 3;

    if *pos + len > data.len() {
        return Err(NpduError::Truncated);
    }
    let adr = data[*pos..*pos + len].to_vec();
    *pos += len;

    Ok((net, adr))
}
