//! BACnet network-layer routing and forwarding engine.
//!
//! This crate implements the router of a BACnet stack: the component that
//! decides, for every outbound and inbound message, which attached network
//! it belongs on; caches which router reaches which remote network; resolves
//! unknown destinations with Who-Is-Router-To-Network discovery; prevents
//! forwarding loops with a hop count; and reconciles configured versus
//! learned network-number identity across interfaces.
//!
//! It deliberately does *not* implement the application layer (objects,
//! services) or any concrete data link (BACnet/IP BVLC, MS/TP). The
//! application layer sits above [`NetworkServiceAccessPoint::send`] and the
//! [`ApplicationLayer`] delivery callback; transports sit below the
//! [`datalink::DataLink`] trait, one per bound adapter.
//!
//! # Example
//!
//! A non-router device on network 1 sending to a device on network 9: the
//! engine has no route, so it queues the message behind a
//! Who-Is-Router-To-Network query and flushes it when the router answers.
//!
//! ```
//! use bacnet_route::datalink::{LinkAddress, TestLink};
//! use bacnet_route::network::{Address, NetworkServiceAccessPoint, Npdu, NetworkMessage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sap = NetworkServiceAccessPoint::new();
//! let (link, frames) = TestLink::new();
//! let adapter = sap.bind(Box::new(link), Some(1), Some(vec![0x01]))?;
//!
//! // No route to network 9 yet: a discovery broadcast goes out.
//! sap.send(Address::RemoteStation(9, vec![0x0A]), &[0x10, 0x08])?;
//! assert_eq!(frames.borrow().len(), 1);
//!
//! // The router at station 0x63 answers; the queued message is flushed
//! // to it with DNET/DADR attached.
//! let i_am = NetworkMessage::IAmRouterToNetwork(vec![9]).to_npdu();
//! sap.receive(adapter, &[0x63], LinkAddress::Broadcast, &i_am.encode())?;
//!
//! let log = frames.borrow();
//! assert_eq!(log.len(), 2);
//! assert_eq!(log[1].0, LinkAddress::Station(vec![0x63]));
//! let routed = Npdu::decode(&log[1].1)?;
//! assert_eq!(routed.destination, Some(Address::RemoteStation(9, vec![0x0A])));
//! # Ok(())
//! # }
//! ```

pub mod datalink;
pub mod network;

pub use network::{
    Address, ApplicationLayer, NetNumber, NetworkError, NetworkServiceAccessPoint, Npdu,
};
