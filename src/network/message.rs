//! Network-layer message codec (ASHRAE 135, Clause 6.4).
//!
//! The finite set of network-layer message types is modeled as a closed
//! enum and dispatched with an exhaustive `match`; types this engine does
//! not act on are decoded into the explicit [`NetworkMessage::Other`] arm
//! and handled as logged no-ops rather than silently vanishing.

use bytes::Bytes;

use crate::network::address::NetNumber;
use crate::network::npdu::{Npdu, NpduError, PROPRIETARY_MESSAGE_BASE};

/// Who-Is-Router-To-Network (0x00).
pub const MSG_WHO_IS_ROUTER_TO_NETWORK: u8 = 0x00;
/// I-Am-Router-To-Network (0x01).
pub const MSG_I_AM_ROUTER_TO_NETWORK: u8 = 0x01;
/// I-Could-Be-Router-To-Network (0x02).
pub const MSG_I_COULD_BE_ROUTER_TO_NETWORK: u8 = 0x02;
/// Reject-Message-To-Network (0x03).
pub const MSG_REJECT_MESSAGE_TO_NETWORK: u8 = 0x03;
/// Router-Busy-To-Network (0x04).
pub const MSG_ROUTER_BUSY_TO_NETWORK: u8 = 0x04;
/// Router-Available-To-Network (0x05).
pub const MSG_ROUTER_AVAILABLE_TO_NETWORK: u8 = 0x05;
/// What-Is-Network-Number (0x12).
pub const MSG_WHAT_IS_NETWORK_NUMBER: u8 = 0x12;
/// Network-Number-Is (0x13).
pub const MSG_NETWORK_NUMBER_IS: u8 = 0x13;

/// Reject-Message-To-Network reason: not directly connected and no route.
pub const REJECT_REASON_NO_ROUTE: u8 = 1;

/// A decoded network-layer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessage {
    /// Ask which router reaches a network, or all known networks when the
    /// target is omitted.
    WhoIsRouterToNetwork(Option<NetNumber>),

    /// Announce reachability of a list of networks through the sender.
    IAmRouterToNetwork(Vec<NetNumber>),

    /// A router could not relay an NPDU for the given network.
    RejectMessageToNetwork { reason: u8, network: NetNumber },

    /// The sender is temporarily unable to route to the listed networks
    /// (all of the sender's networks when the list is empty).
    RouterBusyToNetwork(Vec<NetNumber>),

    /// The sender can route to the listed networks again.
    RouterAvailableToNetwork(Vec<NetNumber>),

    /// Ask the local network what its network number is.
    WhatIsNetworkNumber,

    /// Announce the local network number; `configured` distinguishes an
    /// authoritative, statically configured value (flag 1) from a learned
    /// one (flag 0).
    NetworkNumberIs { network: NetNumber, configured: bool },

    /// Any message type this engine does not act on, kept with its raw
    /// body (I-Could-Be-Router, Initialize-Routing-Table and friends,
    /// connection establishment, vendor-proprietary types).
    Other {
        message_type: u8,
        vendor_id: Option<u16>,
        data: Bytes,
    },
}

impl NetworkMessage {
    /// Decode a message body for the given message type.
    pub fn decode(
        message_type: u8,
        vendor_id: Option<u16>,
        body: &[u8],
    ) -> Result<Self, NpduError> {
        let malformed = || NpduError::InvalidMessage(message_type);

        let msg = match message_type {
            MSG_WHO_IS_ROUTER_TO_NETWORK => match body.len() {
                0 => NetworkMessage::WhoIsRouterToNetwork(None),
                2 => NetworkMessage::WhoIsRouterToNetwork(Some(u16::from_be_bytes([
                    body[0], body[1],
                ]))),
                _ => return Err(malformed()),
            },
            MSG_I_AM_ROUTER_TO_NETWORK => {
                NetworkMessage::IAmRouterToNetwork(decode_net_list(body).ok_or_else(malformed)?)
            }
            MSG_REJECT_MESSAGE_TO_NETWORK => {
                if body.len() != 3 {
                    return Err(malformed());
                }
                NetworkMessage::RejectMessageToNetwork {
                    reason: body[0],
                    network: u16::from_be_bytes([body[1], body[2]]),
                }
            }
            MSG_ROUTER_BUSY_TO_NETWORK => {
                NetworkMessage::RouterBusyToNetwork(decode_net_list(body).ok_or_else(malformed)?)
            }
            MSG_ROUTER_AVAILABLE_TO_NETWORK => NetworkMessage::RouterAvailableToNetwork(
                decode_net_list(body).ok_or_else(malformed)?,
            ),
            MSG_WHAT_IS_NETWORK_NUMBER => {
                if !body.is_empty() {
                    return Err(malformed());
                }
                NetworkMessage::WhatIsNetworkNumber
            }
            MSG_NETWORK_NUMBER_IS => {
                if body.len() != 3 {
                    return Err(malformed());
                }
                NetworkMessage::NetworkNumberIs {
                    network: u16::from_be_bytes([body[0], body[1]]),
                    configured: body[2] & 0x01 != 0,
                }
            }
            _ => NetworkMessage::Other {
                message_type,
                vendor_id,
                data: Bytes::copy_from_slice(body),
            },
        };
        Ok(msg)
    }

    /// The wire message type of this message.
    pub fn message_type(&self) -> u8 {
        match self {
            NetworkMessage::WhoIsRouterToNetwork(_) => MSG_WHO_IS_ROUTER_TO_NETWORK,
            NetworkMessage::IAmRouterToNetwork(_) => MSG_I_AM_ROUTER_TO_NETWORK,
            NetworkMessage::RejectMessageToNetwork { .. } => MSG_REJECT_MESSAGE_TO_NETWORK,
            NetworkMessage::RouterBusyToNetwork(_) => MSG_ROUTER_BUSY_TO_NETWORK,
            NetworkMessage::RouterAvailableToNetwork(_) => MSG_ROUTER_AVAILABLE_TO_NETWORK,
            NetworkMessage::WhatIsNetworkNumber => MSG_WHAT_IS_NETWORK_NUMBER,
            NetworkMessage::NetworkNumberIs { .. } => MSG_NETWORK_NUMBER_IS,
            NetworkMessage::Other { message_type, .. } => *message_type,
        }
    }

    /// Encode the message body.
    pub fn encode_body(&self) -> Vec<u8> {
        match self {
            NetworkMessage::WhoIsRouterToNetwork(None) => Vec::new(),
            NetworkMessage::WhoIsRouterToNetwork(Some(net)) => net.to_be_bytes().to_vec(),
            NetworkMessage::IAmRouterToNetwork(nets)
            | NetworkMessage::RouterBusyToNetwork(nets)
            | NetworkMessage::RouterAvailableToNetwork(nets) => encode_net_list(nets),
            NetworkMessage::RejectMessageToNetwork { reason, network } => {
                let mut body = vec![*reason];
                body.extend_from_slice(&network.to_be_bytes());
                body
            }
            NetworkMessage::WhatIsNetworkNumber => Vec::new(),
            NetworkMessage::NetworkNumberIs {
                network,
                configured,
            } => {
                let mut body = network.to_be_bytes().to_vec();
                body.push(u8::from(*configured));
                body
            }
            NetworkMessage::Other { data, .. } => data.to_vec(),
        }
    }

    /// Wrap this message into a locally scoped NPDU.
    pub fn to_npdu(&self) -> Npdu {
        let message_type = self.message_type();
        let vendor_id = match self {
            NetworkMessage::Other { vendor_id, .. } if message_type >= PROPRIETARY_MESSAGE_BASE => {
                *vendor_id
            }
            _ => None,
        };
        Npdu {
            expecting_reply: false,
            priority: 0,
            destination: None,
            source: None,
            hop_count: None,
            message_type: Some(message_type),
            vendor_id,
            payload: Bytes::from(self.encode_body()),
        }
    }
}

fn decode_net_list(body: &[u8]) -> Option<Vec<NetNumber>> {
    if body.len() % 2 != 0 {
        return None;
    }
    Some(
        body.chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect(),
    )
}

fn encode_net_list(nets: &[NetNumber]) -> Vec<u8> {
    let mut body = Vec::with_capacity(nets.len() * 2);
    for net in nets {
        body.extend_from_slice(&net.to_be_bytes());
    }
    body
}
