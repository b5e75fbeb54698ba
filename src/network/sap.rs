//! Network service access point: the forwarding engine.
//!
//! The access point owns the adapter table, the router info cache and the
//! pending-route queues, and implements the two entry points everything
//! else hangs off:
//!
//! - [`NetworkServiceAccessPoint::send`] takes an application payload and a
//!   destination [`Address`] and either transmits it directly, rewrites it
//!   for a router hop, or queues it behind a Who-Is-Router-To-Network
//!   discovery query.
//! - [`NetworkServiceAccessPoint::receive`] takes a raw inbound frame,
//!   learns the source path, classifies the destination (deliver locally,
//!   forward, or both), dispatches network-layer control messages to the
//!   discovery element, and relays transit traffic with the hop count
//!   decremented.
//!
//! Configuration errors (no adapters, ambiguous local adapter, unconnected
//! networks) are returned to the caller; per-datagram faults are logged and
//! contained, so one adapter's malformed input never disturbs another
//! adapter's traffic.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use bytes::Bytes;
use log::{debug, trace, warn};
use thiserror::Error;

use crate::datalink::{DataLink, DataLinkError, LinkAddress};
use crate::network::address::{Address, NetNumber};
use crate::network::adapter::NetworkAdapter;
use crate::network::cache::{RouterInfoCache, RouterStatus};
use crate::network::element::NetworkServiceElement;
use crate::network::message::{NetworkMessage, REJECT_REASON_NO_ROUTE};
use crate::network::npdu::{Npdu, INITIAL_HOP_COUNT};

/// Handle to a bound adapter, returned by [`NetworkServiceAccessPoint::bind`].
pub type AdapterId = usize;

/// Fatal configuration errors, surfaced to the caller.
///
/// These indicate a wiring bug, not a transient network fault; cache misses
/// and malformed datagrams are handled internally and never appear here.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// No adapter has been bound yet.
    #[error("no adapters bound")]
    NoAdapters,

    /// More than one adapter is bound but none was designated local.
    #[error("multiple adapters bound but no local adapter designated")]
    AmbiguousLocalAdapter,

    /// The network number is already bound to another adapter.
    #[error("network {0} already bound")]
    NetworkBound(NetNumber),

    /// Only one adapter with an unknown network number is permitted.
    #[error("an adapter with an unknown network number is already bound")]
    UnnumberedBound,

    /// A local adapter was already designated by an earlier bind.
    #[error("local adapter already designated")]
    LocalAdapterBound,

    /// The adapter handle does not name a bound adapter.
    #[error("unknown adapter {0}")]
    UnknownAdapter(AdapterId),

    /// The named network is not directly connected.
    #[error("network {0} is not directly connected")]
    NotConnected(NetNumber),

    /// The destination cannot be sent to (e.g. a null address).
    #[error("invalid destination address {0}")]
    InvalidDestination(Address),

    /// The link layer refused the frame.
    #[error(transparent)]
    DataLink(#[from] DataLinkError),
}

/// Upward delivery boundary to the application layer.
pub trait ApplicationLayer {
    /// Deliver an inbound application PDU with its effective peer and
    /// destination addresses.
    fn deliver(&mut self, source: Address, destination: Address, payload: Bytes);
}

/// Engine counters.
#[derive(Debug, Default, Clone)]
pub struct SapStats {
    /// Application PDUs delivered upward.
    pub delivered: u64,
    /// NPDUs relayed to another adapter.
    pub forwarded: u64,
    /// Datagrams dropped for decode or addressing faults.
    pub dropped: u64,
    /// NPDUs queued awaiting route resolution.
    pub queued: u64,
    /// Who-Is-Router-To-Network queries originated.
    pub discovery_queries: u64,
}

/// Shared engine state; split from the access point so the discovery
/// element can borrow it while being driven by inbound dispatch.
pub(crate) struct SapState {
    pub(crate) adapters: Vec<NetworkAdapter>,
    pub(crate) local_adapter: Option<AdapterId>,
    pub(crate) local_address: Option<Vec<u8>>,
    pub(crate) cache: RouterInfoCache,
    pub(crate) pending: HashMap<NetNumber, VecDeque<Npdu>>,
    pub(crate) app: Option<Box<dyn ApplicationLayer>>,
    pub(crate) stats: SapStats,
}

impl SapState {
    /// The adapter directly connected to `net`, if any.
    pub(crate) fn adapter_for(&self, net: NetNumber) -> Option<AdapterId> {
        self.adapters
            .iter()
            .position(|a| a.network_number() == Some(net))
    }

    /// The adapter with the given (possibly unknown) network identity.
    fn adapter_for_identity(&self, net: Option<NetNumber>) -> Option<AdapterId> {
        self.adapters.iter().position(|a| a.network_number() == net)
    }

    /// True when this engine can relay between networks.
    pub(crate) fn is_router(&self) -> bool {
        self.adapters.len() > 1
    }

    /// The application-facing adapter: the sole adapter, or the designated
    /// local one.
    fn local_adapter_id(&self) -> Result<AdapterId, NetworkError> {
        match self.adapters.len() {
            0 => Err(NetworkError::NoAdapters),
            1 => Ok(0),
            _ => self.local_adapter.ok_or(NetworkError::AmbiguousLocalAdapter),
        }
    }

    fn local_net(&self) -> Option<NetNumber> {
        let id = self.local_adapter_id().ok()?;
        self.adapters[id].network_number()
    }

    pub(crate) fn transmit(
        &mut self,
        adapter: AdapterId,
        npdu: &Npdu,
        destination: &LinkAddress,
    ) -> Result<(), NetworkError> {
        self.adapters[adapter]
            .send(npdu, destination)
            .map_err(NetworkError::from)
    }

    /// Send a network-layer control message, best effort.
    pub(crate) fn send_network_message(
        &mut self,
        adapter: AdapterId,
        destination: &LinkAddress,
        source: Option<Address>,
        msg: &NetworkMessage,
    ) {
        let mut npdu = msg.to_npdu();
        npdu.source = source;
        if let Err(e) = self.transmit(adapter, &npdu, destination) {
            warn!("control message transmit failed: {}", e);
        }
    }

    /// Broadcast a network-layer control message on every adapter except
    /// the given one.
    pub(crate) fn broadcast_network_message(
        &mut self,
        except: Option<AdapterId>,
        source: Option<Address>,
        msg: &NetworkMessage,
    ) {
        for id in 0..self.adapters.len() {
            if Some(id) == except {
                continue;
            }
            self.send_network_message(id, &LinkAddress::Broadcast, source.clone(), msg);
        }
    }

    /// Network numbers of all adapters, except the given one.
    pub(crate) fn connected_networks(&self, except: Option<AdapterId>) -> Vec<NetNumber> {
        self.adapters
            .iter()
            .enumerate()
            .filter(|(id, _)| Some(*id) != except)
            .filter_map(|(_, a)| a.network_number())
            .collect()
    }
}

/// The routing and forwarding engine.
pub struct NetworkServiceAccessPoint {
    state: SapState,
    element: NetworkServiceElement,
}

impl Default for NetworkServiceAccessPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkServiceAccessPoint {
    /// Create an engine with no adapters bound.
    pub fn new() -> Self {
        Self {
            state: SapState {
                adapters: Vec::new(),
                local_adapter: None,
                local_address: None,
                cache: RouterInfoCache::new(),
                pending: HashMap::new(),
                app: None,
                stats: SapStats::default(),
            },
            element: NetworkServiceElement::new(),
        }
    }

    /// Bind a link-layer transport as a new adapter.
    ///
    /// `network_number` may be `None` when the local network's number is not
    /// known yet (at most one such adapter may exist at a time); it can later
    /// be learned through the discovery protocol. Passing `local_address`
    /// designates this adapter as the application-facing one and records the
    /// engine's own station bytes on it; with more than one adapter bound, a
    /// designated local adapter is required before [`send`](Self::send) will
    /// accept traffic.
    pub fn bind(
        &mut self,
        link: Box<dyn DataLink>,
        network_number: Option<NetNumber>,
        local_address: Option<Vec<u8>>,
    ) -> Result<AdapterId, NetworkError> {
        match network_number {
            Some(net) => {
                if self.state.adapter_for(net).is_some() {
                    return Err(NetworkError::NetworkBound(net));
                }
            }
            None => {
                if self.state.adapter_for_identity(None).is_some() {
                    return Err(NetworkError::UnnumberedBound);
                }
            }
        }
        if local_address.is_some() && self.state.local_adapter.is_some() {
            return Err(NetworkError::LocalAdapterBound);
        }

        let id = self.state.adapters.len();
        self.state
            .adapters
            .push(NetworkAdapter::new(link, network_number));
        if let Some(mac) = local_address {
            self.state.local_adapter = Some(id);
            self.state.local_address = Some(mac);
        }
        debug!("bound adapter {} to network {:?}", id, network_number);
        Ok(id)
    }

    /// Register the upward delivery callback.
    pub fn set_application(&mut self, app: Box<dyn ApplicationLayer>) {
        self.state.app = Some(app);
    }

    /// Engine counters.
    pub fn stats(&self) -> &SapStats {
        &self.state.stats
    }

    /// The network number currently bound to an adapter.
    pub fn network_number(&self, adapter: AdapterId) -> Result<Option<NetNumber>, NetworkError> {
        self.state
            .adapters
            .get(adapter)
            .map(|a| a.network_number())
            .ok_or(NetworkError::UnknownAdapter(adapter))
    }

    /// Cached route to a destination network, if any.
    pub fn lookup_route(
        &self,
        dnet: NetNumber,
    ) -> Option<(Option<NetNumber>, Address, RouterStatus)> {
        self.state
            .cache
            .lookup(dnet)
            .map(|info| (info.snet, info.address.clone(), info.status))
    }

    /// Install static routes out of band: networks `dnets` are reachable
    /// through the router at `address` on directly connected network `snet`.
    pub fn add_router_references(
        &mut self,
        snet: NetNumber,
        address: &Address,
        dnets: &[NetNumber],
    ) -> Result<(), NetworkError> {
        if self.state.adapter_for(snet).is_none() {
            return Err(NetworkError::NotConnected(snet));
        }
        self.state.cache.update(Some(snet), address, dnets);
        Ok(())
    }

    /// Remove cached routes: everything heard on `snet`, one router record,
    /// or specific destination networks of one router.
    pub fn delete_router_references(
        &mut self,
        snet: NetNumber,
        address: Option<&Address>,
        dnets: Option<&[NetNumber]>,
    ) -> Result<(), NetworkError> {
        if self.state.adapter_for(snet).is_none() {
            return Err(NetworkError::NotConnected(snet));
        }
        self.state.cache.delete(Some(snet), address, dnets);
        Ok(())
    }

    /// Originate What-Is-Network-Number queries on adapters whose own
    /// network number is still unknown.
    pub fn what_is_network_number(&mut self) {
        self.element.what_is_network_number(&mut self.state);
    }

    /// Announce this engine's configured network numbers.
    pub fn network_number_is(&mut self) {
        self.element.network_number_is(&mut self.state);
    }

    /// Drive the discovery element's deferred work; call periodically.
    pub fn handle_timeouts(&mut self, now: Instant) {
        self.element.handle_timeouts(&mut self.state, now);
    }

    /// Outbound entry point: send an application payload to a destination.
    pub fn send(&mut self, destination: Address, payload: &[u8]) -> Result<(), NetworkError> {
        let state = &mut self.state;
        let local = state.local_adapter_id()?;
        let npdu = Npdu::application(Bytes::copy_from_slice(payload));

        match destination {
            Address::Null => Err(NetworkError::InvalidDestination(destination)),

            Address::LocalStation(mac) => {
                state.transmit(local, &npdu, &LinkAddress::Station(mac))
            }
            Address::LocalBroadcast => state.transmit(local, &npdu, &LinkAddress::Broadcast),

            Address::GlobalBroadcast => {
                let mut npdu = npdu;
                npdu.destination = Some(Address::GlobalBroadcast);
                npdu.hop_count = Some(INITIAL_HOP_COUNT);
                for id in 0..state.adapters.len() {
                    state.transmit(id, &npdu, &LinkAddress::Broadcast)?;
                }
                Ok(())
            }

            Address::RemoteStation(dnet, ref mac) => {
                if let Some(id) = state.adapter_for(dnet) {
                    // A "remote" address that is actually directly
                    // connected: send in local form.
                    state.transmit(id, &npdu, &LinkAddress::Station(mac.clone()))
                } else {
                    Self::route_remote(state, dnet, destination, npdu);
                    Ok(())
                }
            }
            Address::RemoteBroadcast(dnet) => {
                if let Some(id) = state.adapter_for(dnet) {
                    state.transmit(id, &npdu, &LinkAddress::Broadcast)
                } else {
                    Self::route_remote(state, dnet, destination, npdu);
                    Ok(())
                }
            }
        }
    }

    /// Route an outbound NPDU to a network reached through a router,
    /// queueing it behind a discovery query when no route is cached.
    fn route_remote(state: &mut SapState, dnet: NetNumber, destination: Address, mut npdu: Npdu) {
        npdu.destination = Some(destination);
        npdu.hop_count = Some(INITIAL_HOP_COUNT);

        let route = state.cache.lookup(dnet).and_then(|info| {
            let id = state.adapter_for_identity(info.snet)?;
            Some((id, info.address.station()?.to_vec()))
        });

        if let Some((id, station)) = route {
            trace!("routing to {} via cached router on adapter {}", dnet, id);
            if let Err(e) = state.transmit(id, &npdu, &LinkAddress::Station(station)) {
                warn!("transmit to router for {} failed: {}", dnet, e);
            }
            return;
        }

        let first_request = !state.pending.contains_key(&dnet);
        state.pending.entry(dnet).or_default().push_back(npdu);
        state.stats.queued += 1;

        if first_request {
            debug!("no route to {}, starting discovery", dnet);
            state.stats.discovery_queries += 1;
            state.broadcast_network_message(
                None,
                None,
                &NetworkMessage::WhoIsRouterToNetwork(Some(dnet)),
            );
        }
    }

    /// Inbound entry point: decode a raw frame delivered by an adapter's
    /// transport. Decode faults are logged and the datagram dropped; only a
    /// bad adapter handle is an error.
    pub fn receive(
        &mut self,
        adapter: AdapterId,
        source: &[u8],
        destination: LinkAddress,
        frame: &[u8],
    ) -> Result<(), NetworkError> {
        if adapter >= self.state.adapters.len() {
            return Err(NetworkError::UnknownAdapter(adapter));
        }
        match Npdu::decode(frame) {
            Ok(npdu) => {
                self.process_npdu(adapter, source.to_vec(), destination, npdu);
                Ok(())
            }
            Err(e) => {
                warn!("adapter {}: dropping undecodable NPDU: {}", adapter, e);
                self.state.stats.dropped += 1;
                Ok(())
            }
        }
    }

    /// The inbound decision tree: learn, classify, deliver and/or forward.
    fn process_npdu(
        &mut self,
        adapter: AdapterId,
        link_source: Vec<u8>,
        link_destination: LinkAddress,
        npdu: Npdu,
    ) {
        let Self { state, element } = self;
        let arrival_net = state.adapters[adapter].network_number();

        // Source-path learning: an NPDU relayed to us proves that its SNET
        // is reachable through whoever handed it to us. A peer claiming a
        // directly connected network as its SNET is spoofing.
        if let Some(Address::RemoteStation(snet, _)) = &npdu.source {
            if state.adapter_for(*snet).is_some() {
                warn!(
                    "adapter {}: SNET {} is directly connected, dropping spoofed NPDU",
                    adapter, snet
                );
                state.stats.dropped += 1;
                return;
            }
            state.cache.update(
                arrival_net,
                &Address::LocalStation(link_source.clone()),
                &[*snet],
            );
        }

        // Destination classification.
        let (process_locally, forward) = match &npdu.destination {
            None => {
                let local = state.adapters.len() == 1
                    || Some(adapter) == state.local_adapter
                    || npdu.is_network_message();
                (local, false)
            }
            Some(Address::RemoteBroadcast(dnet)) => {
                if Some(*dnet) == arrival_net {
                    warn!(
                        "adapter {}: remote broadcast for its own network {}, dropping",
                        adapter, dnet
                    );
                    state.stats.dropped += 1;
                    return;
                }
                (state.local_net() == Some(*dnet), true)
            }
            Some(Address::RemoteStation(dnet, dadr)) => {
                if Some(*dnet) == arrival_net {
                    warn!(
                        "adapter {}: remote station address on its own network {}, dropping",
                        adapter, dnet
                    );
                    state.stats.dropped += 1;
                    return;
                }
                let local = state.local_net() == Some(*dnet)
                    && state.local_address.as_deref() == Some(dadr.as_slice());
                (local, !local)
            }
            Some(Address::GlobalBroadcast) => (true, true),
            Some(other) => {
                warn!("adapter {}: malformed destination {}, dropping", adapter, other);
                state.stats.dropped += 1;
                return;
            }
        };

        if process_locally {
            if let Some(msg_type) = npdu.message_type {
                match NetworkMessage::decode(msg_type, npdu.vendor_id, &npdu.payload) {
                    Ok(msg) => {
                        let was_broadcast = link_destination == LinkAddress::Broadcast
                            || matches!(
                                npdu.destination,
                                Some(Address::RemoteBroadcast(_) | Address::GlobalBroadcast)
                            );
                        element.indication(state, adapter, &link_source, was_broadcast, &msg, &npdu);
                    }
                    Err(e) => {
                        warn!("adapter {}: dropping network message: {}", adapter, e);
                        state.stats.dropped += 1;
                        return;
                    }
                }
            } else {
                let source = npdu.source.clone().unwrap_or_else(|| {
                    // On a router, traffic arriving on a non-local adapter
                    // is a remote peer even without SNET/SADR attached.
                    match arrival_net {
                        Some(net)
                            if state.adapters.len() > 1 && Some(adapter) != state.local_adapter =>
                        {
                            Address::RemoteStation(net, link_source.clone())
                        }
                        _ => Address::LocalStation(link_source.clone()),
                    }
                });
                let destination = npdu.destination.clone().unwrap_or(match &link_destination {
                    LinkAddress::Broadcast => Address::LocalBroadcast,
                    LinkAddress::Station(mac) => Address::LocalStation(mac.clone()),
                });
                state.stats.delivered += 1;
                if let Some(app) = state.app.as_mut() {
                    app.deliver(source, destination, npdu.payload.clone());
                }
            }
        }

        if !forward {
            return;
        }
        if state.adapters.len() == 1 {
            // Not a router.
            return;
        }
        if npdu.hop_count == Some(0) {
            trace!("adapter {}: hop count exhausted, not relaying", adapter);
            state.stats.dropped += 1;
            return;
        }

        // Build a fresh outbound copy; the inbound NPDU is never mutated.
        let source = match npdu.source.clone() {
            Some(source) => source,
            None => match arrival_net {
                Some(net) => Address::RemoteStation(net, link_source.clone()),
                None => {
                    warn!(
                        "adapter {}: cannot relay, own network number still unknown",
                        adapter
                    );
                    return;
                }
            },
        };
        let forwarded = Npdu {
            expecting_reply: npdu.expecting_reply,
            priority: npdu.priority,
            destination: npdu.destination.clone(),
            source: Some(source),
            hop_count: Some(npdu.hop_count.unwrap_or(INITIAL_HOP_COUNT).saturating_sub(1)),
            message_type: npdu.message_type,
            vendor_id: npdu.vendor_id,
            payload: npdu.payload.clone(),
        };

        match npdu.destination.as_ref() {
            Some(Address::GlobalBroadcast) => {
                for id in 0..state.adapters.len() {
                    if id == adapter {
                        continue;
                    }
                    if let Err(e) = state.transmit(id, &forwarded, &LinkAddress::Broadcast) {
                        warn!("rebroadcast on adapter {} failed: {}", id, e);
                    } else {
                        state.stats.forwarded += 1;
                    }
                }
            }
            Some(Address::RemoteBroadcast(dnet)) => {
                Self::forward_remote(state, adapter, *dnet, None, forwarded, &link_source);
            }
            Some(Address::RemoteStation(dnet, dadr)) => {
                Self::forward_remote(
                    state,
                    adapter,
                    *dnet,
                    Some(dadr.clone()),
                    forwarded,
                    &link_source,
                );
            }
            _ => {}
        }
    }

    /// Relay an NPDU toward a remote network: directly if that network is
    /// attached, via a cached router otherwise, else best-effort discovery.
    fn forward_remote(
        state: &mut SapState,
        arrival: AdapterId,
        dnet: NetNumber,
        dadr: Option<Vec<u8>>,
        mut forwarded: Npdu,
        link_source: &[u8],
    ) {
        if let Some(out) = state.adapter_for(dnet) {
            // Last hop: the destination network is attached, so the
            // DNET/DADR fields come off and the link layer addresses it.
            forwarded.destination = None;
            forwarded.hop_count = None;
            let destination = match dadr {
                Some(mac) => LinkAddress::Station(mac),
                None => LinkAddress::Broadcast,
            };
            if let Err(e) = state.transmit(out, &forwarded, &destination) {
                warn!("last-hop transmit to {} failed: {}", dnet, e);
            } else {
                state.stats.forwarded += 1;
            }
            return;
        }

        let route = state.cache.lookup(dnet).and_then(|info| {
            let id = state.adapter_for_identity(info.snet)?;
            Some((id, info.address.station()?.to_vec()))
        });
        if let Some((out, station)) = route {
            // Not yet the last hop; DNET/DADR stay attached.
            if let Err(e) = state.transmit(out, &forwarded, &LinkAddress::Station(station)) {
                warn!("router-hop transmit to {} failed: {}", dnet, e);
            } else {
                state.stats.forwarded += 1;
            }
            return;
        }

        // No route for third-party traffic: best effort, no re-queue. Tell
        // a reply-expecting unicast sender we cannot relay, then try to
        // (re-)discover the path for next time.
        debug!("no route to {} for transit traffic", dnet);
        if forwarded.expecting_reply && dadr.is_some() {
            state.send_network_message(
                arrival,
                &LinkAddress::Station(link_source.to_vec()),
                None,
                &NetworkMessage::RejectMessageToNetwork {
                    reason: REJECT_REASON_NO_ROUTE,
                    network: dnet,
                },
            );
        }
        state.stats.discovery_queries += 1;
        state.broadcast_network_message(
            Some(arrival),
            None,
            &NetworkMessage::WhoIsRouterToNetwork(Some(dnet)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::{FrameLog, TestLink};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Build an engine with one adapter per network number; the first
    /// adapter is the designated local one with station `[0x01]`.
    fn engine(nets: &[Option<NetNumber>]) -> (NetworkServiceAccessPoint, Vec<FrameLog>) {
        let mut sap = NetworkServiceAccessPoint::new();
        let mut logs = Vec::new();
        for (i, net) in nets.iter().enumerate() {
            let (link, frames) = TestLink::new();
            let local = (i == 0).then(|| vec![0x01]);
            sap.bind(Box::new(link), *net, local).unwrap();
            logs.push(frames);
        }
        (sap, logs)
    }

    fn decode_frames(log: &FrameLog) -> Vec<(LinkAddress, Npdu)> {
        log.borrow()
            .iter()
            .map(|(dest, frame)| (dest.clone(), Npdu::decode(frame).unwrap()))
            .collect()
    }

    type Delivered = Rc<RefCell<Vec<(Address, Address, Vec<u8>)>>>;

    struct Recorder(Delivered);

    impl ApplicationLayer for Recorder {
        fn deliver(&mut self, source: Address, destination: Address, payload: Bytes) {
            self.0
                .borrow_mut()
                .push((source, destination, payload.to_vec()));
        }
    }

    #[test]
    fn test_bind_rejects_duplicate_network() {
        let (mut sap, _) = engine(&[Some(1)]);
        let (link, _) = TestLink::new();
        assert!(matches!(
            sap.bind(Box::new(link), Some(1), None),
            Err(NetworkError::NetworkBound(1))
        ));
    }

    #[test]
    fn test_bind_allows_one_unknown_network() {
        let (mut sap, _) = engine(&[None]);
        let (link, _) = TestLink::new();
        assert!(matches!(
            sap.bind(Box::new(link), None, None),
            Err(NetworkError::UnnumberedBound)
        ));
        let (link, _) = TestLink::new();
        assert!(sap.bind(Box::new(link), Some(2), None).is_ok());
    }

    #[test]
    fn test_bind_rejects_second_local_adapter() {
        let (mut sap, _) = engine(&[Some(1)]);
        let (link, _) = TestLink::new();
        assert!(matches!(
            sap.bind(Box::new(link), Some(2), Some(vec![0x02])),
            Err(NetworkError::LocalAdapterBound)
        ));
    }

    #[test]
    fn test_send_requires_adapters_and_local_designation() {
        let mut sap = NetworkServiceAccessPoint::new();
        assert!(matches!(
            sap.send(Address::LocalBroadcast, &[0x00]),
            Err(NetworkError::NoAdapters)
        ));

        // Two adapters, neither designated local.
        let mut sap = NetworkServiceAccessPoint::new();
        for net in [1, 2] {
            let (link, _) = TestLink::new();
            sap.bind(Box::new(link), Some(net), None).unwrap();
        }
        assert!(matches!(
            sap.send(Address::LocalBroadcast, &[0x00]),
            Err(NetworkError::AmbiguousLocalAdapter)
        ));
    }

    #[test]
    fn test_send_null_destination_is_an_error() {
        let (mut sap, _) = engine(&[Some(1)]);
        assert!(matches!(
            sap.send(Address::Null, &[0x00]),
            Err(NetworkError::InvalidDestination(_))
        ));
    }

    #[test]
    fn test_send_local_forms() {
        let (mut sap, logs) = engine(&[Some(1)]);

        sap.send(Address::LocalStation(vec![0x0A]), &[0x10]).unwrap();
        sap.send(Address::LocalBroadcast, &[0x20]).unwrap();
        // A "remote" address on our own network goes out in local form.
        sap.send(Address::RemoteStation(1, vec![0x0B]), &[0x30])
            .unwrap();

        let frames = decode_frames(&logs[0]);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].0, LinkAddress::Station(vec![0x0A]));
        assert!(frames[0].1.destination.is_none());
        assert_eq!(frames[1].0, LinkAddress::Broadcast);
        assert_eq!(frames[2].0, LinkAddress::Station(vec![0x0B]));
        assert!(frames[2].1.destination.is_none());
    }

    #[test]
    fn test_send_global_broadcast_floods_all_adapters() {
        let (mut sap, logs) = engine(&[Some(1), Some(2), Some(3)]);
        sap.send(Address::GlobalBroadcast, &[0x10, 0x08]).unwrap();

        for log in &logs {
            let frames = decode_frames(log);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].0, LinkAddress::Broadcast);
            assert_eq!(frames[0].1.destination, Some(Address::GlobalBroadcast));
            assert_eq!(frames[0].1.hop_count, Some(255));
        }
    }

    #[test]
    fn test_send_remote_hit_uses_cached_router() {
        let (mut sap, logs) = engine(&[Some(1)]);
        sap.add_router_references(1, &Address::LocalStation(vec![0x63]), &[9])
            .unwrap();

        sap.send(Address::RemoteStation(9, vec![0x0A]), &[0x42])
            .unwrap();

        let frames = decode_frames(&logs[0]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, LinkAddress::Station(vec![0x63]));
        assert_eq!(
            frames[0].1.destination,
            Some(Address::RemoteStation(9, vec![0x0A]))
        );
        assert_eq!(frames[0].1.hop_count, Some(255));
    }

    #[test]
    fn test_send_remote_miss_queues_and_discovers_once() {
        let (mut sap, logs) = engine(&[Some(1)]);

        sap.send(Address::RemoteStation(9, vec![0x0A]), &[0xAA])
            .unwrap();
        sap.send(Address::RemoteBroadcast(9), &[0xBB]).unwrap();

        // One discovery broadcast for the first request only.
        let frames = decode_frames(&logs[0]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].1.message_type, Some(0x00));
        assert_eq!(&frames[0].1.payload[..], &[0x00, 0x09]);
        assert_eq!(sap.stats().queued, 2);
        assert_eq!(sap.stats().discovery_queries, 1);
    }

    #[test]
    fn test_administrative_references_require_connected_network() {
        let (mut sap, _) = engine(&[Some(1)]);
        assert!(matches!(
            sap.add_router_references(5, &Address::LocalStation(vec![0x63]), &[9]),
            Err(NetworkError::NotConnected(5))
        ));
        assert!(matches!(
            sap.delete_router_references(5, None, None),
            Err(NetworkError::NotConnected(5))
        ));
    }

    #[test]
    fn test_inbound_delivery_lifts_addresses() {
        let (mut sap, _) = engine(&[Some(1)]);
        let delivered: Delivered = Default::default();
        sap.set_application(Box::new(Recorder(delivered.clone())));

        // Plain local traffic: link addresses become the effective peer.
        let npdu = Npdu::application(Bytes::from_static(&[0x10, 0x08]));
        sap.receive(0, &[0x0A], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        // Routed traffic: SNET/SADR wins.
        let mut routed = Npdu::application(Bytes::from_static(&[0x11]));
        routed.source = Some(Address::RemoteStation(3, vec![0x05]));
        sap.receive(0, &[0x63], LinkAddress::Station(vec![0x01]), &routed.encode())
            .unwrap();

        let log = delivered.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, Address::LocalStation(vec![0x0A]));
        assert_eq!(log[0].1, Address::LocalBroadcast);
        assert_eq!(log[0].2, vec![0x10, 0x08]);
        assert_eq!(log[1].0, Address::RemoteStation(3, vec![0x05]));
        assert_eq!(log[1].1, Address::LocalStation(vec![0x01]));
    }

    #[test]
    fn test_source_path_learning() {
        let (mut sap, _) = engine(&[Some(1)]);
        let mut npdu = Npdu::application(Bytes::from_static(&[0x11]));
        npdu.source = Some(Address::RemoteStation(7, vec![0x05]));
        sap.receive(0, &[0x63], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        let (snet, router, _) = sap.lookup_route(7).unwrap();
        assert_eq!(snet, Some(1));
        assert_eq!(router, Address::LocalStation(vec![0x63]));
    }

    #[test]
    fn test_spoofed_source_network_is_dropped() {
        let (mut sap, logs) = engine(&[Some(1), Some(2)]);
        let delivered: Delivered = Default::default();
        sap.set_application(Box::new(Recorder(delivered.clone())));

        // A peer on network 1 claims to be a router to network 2, which we
        // are directly attached to.
        let mut npdu = Npdu::application(Bytes::from_static(&[0x11]));
        npdu.source = Some(Address::RemoteStation(2, vec![0x05]));
        sap.receive(0, &[0x63], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        assert_eq!(sap.stats().dropped, 1);
        assert!(sap.lookup_route(2).is_none());
        assert!(delivered.borrow().is_empty());
        assert!(logs[1].borrow().is_empty());
    }

    #[test]
    fn test_remote_address_on_own_network_is_dropped() {
        let (mut sap, logs) = engine(&[Some(1), Some(2)]);

        let mut npdu = Npdu::application(Bytes::from_static(&[0x11]));
        npdu.destination = Some(Address::RemoteBroadcast(1));
        npdu.hop_count = Some(255);
        sap.receive(0, &[0x0A], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        assert_eq!(sap.stats().dropped, 1);
        assert!(logs[1].borrow().is_empty());
    }

    #[test]
    fn test_hop_count_zero_is_never_relayed() {
        let (mut sap, logs) = engine(&[Some(1), Some(2)]);

        let mut npdu = Npdu::application(Bytes::from_static(&[0x11]));
        npdu.destination = Some(Address::RemoteStation(2, vec![0x0B]));
        npdu.hop_count = Some(0);
        sap.receive(0, &[0x0A], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        assert!(logs[1].borrow().is_empty());
        assert_eq!(sap.stats().forwarded, 0);
    }

    #[test]
    fn test_last_hop_rewrites_to_local_form() {
        let (mut sap, logs) = engine(&[Some(1), Some(2)]);

        let mut npdu = Npdu::application(Bytes::from_static(&[0x11]));
        npdu.destination = Some(Address::RemoteStation(2, vec![0x0B]));
        npdu.hop_count = Some(77);
        sap.receive(0, &[0x0A], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        let frames = decode_frames(&logs[1]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, LinkAddress::Station(vec![0x0B]));
        // DNET/DADR come off on the last hop; the origin is recorded.
        assert!(frames[0].1.destination.is_none());
        assert_eq!(
            frames[0].1.source,
            Some(Address::RemoteStation(1, vec![0x0A]))
        );
        assert_eq!(sap.stats().forwarded, 1);
    }

    #[test]
    fn test_transit_hop_decrements_and_keeps_dnet() {
        let (mut sap, logs) = engine(&[Some(1), Some(2)]);
        sap.add_router_references(2, &Address::LocalStation(vec![0x63]), &[3])
            .unwrap();

        let mut npdu = Npdu::application(Bytes::from_static(&[0x11]));
        npdu.destination = Some(Address::RemoteStation(3, vec![0x0C]));
        npdu.hop_count = Some(200);
        sap.receive(0, &[0x0A], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        let frames = decode_frames(&logs[1]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, LinkAddress::Station(vec![0x63]));
        assert_eq!(
            frames[0].1.destination,
            Some(Address::RemoteStation(3, vec![0x0C]))
        );
        assert_eq!(frames[0].1.hop_count, Some(199));
    }

    #[test]
    fn test_global_broadcast_is_delivered_and_rebroadcast() {
        let (mut sap, logs) = engine(&[Some(1), Some(2), Some(3)]);
        let delivered: Delivered = Default::default();
        sap.set_application(Box::new(Recorder(delivered.clone())));

        let mut npdu = Npdu::application(Bytes::from_static(&[0x10, 0x08]));
        npdu.destination = Some(Address::GlobalBroadcast);
        npdu.hop_count = Some(255);
        sap.receive(1, &[0x0A], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        assert_eq!(delivered.borrow().len(), 1);
        // Rebroadcast everywhere except where it arrived.
        assert!(logs[1].borrow().is_empty());
        for log in [&logs[0], &logs[2]] {
            let frames = decode_frames(log);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].1.destination, Some(Address::GlobalBroadcast));
            assert_eq!(frames[0].1.hop_count, Some(254));
        }
    }

    #[test]
    fn test_unroutable_transit_rejects_and_rediscovers() {
        let (mut sap, logs) = engine(&[Some(1), Some(2)]);

        let mut npdu = Npdu::application(Bytes::from_static(&[0x11]));
        npdu.destination = Some(Address::RemoteStation(9, vec![0x0D]));
        npdu.hop_count = Some(100);
        npdu.expecting_reply = true;
        sap.receive(0, &[0x0A], LinkAddress::Broadcast, &npdu.encode())
            .unwrap();

        // The sender gets a Reject back on the arrival adapter.
        let inbound = decode_frames(&logs[0]);
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].0, LinkAddress::Station(vec![0x0A]));
        assert_eq!(inbound[0].1.message_type, Some(0x03));
        assert_eq!(&inbound[0].1.payload[..], &[0x01, 0x00, 0x09]);

        // And discovery goes out everywhere else, but never back in.
        let outbound = decode_frames(&logs[1]);
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].1.message_type, Some(0x00));
        assert_eq!(&outbound[0].1.payload[..], &[0x00, 0x09]);
    }

    #[test]
    fn test_undecodable_frame_is_contained() {
        let (mut sap, logs) = engine(&[Some(1)]);
        sap.receive(0, &[0x0A], LinkAddress::Broadcast, &[0x02, 0x00])
            .unwrap();
        assert_eq!(sap.stats().dropped, 1);
        assert!(logs[0].borrow().is_empty());

        assert!(matches!(
            sap.receive(7, &[0x0A], LinkAddress::Broadcast, &[0x01, 0x00]),
            Err(NetworkError::UnknownAdapter(7))
        ));
    }
}
