//! Network service element: the router discovery protocol.
//!
//! Handles the network-layer control messages the engine speaks:
//! Who-Is-Router-To-Network / I-Am-Router-To-Network for route discovery,
//! and What-Is-Network-Number / Network-Number-Is for network-number
//! learning and reconciliation. Router-Busy/-Available update the status of
//! already-known routers; everything else in the message set is accepted as
//! a logged no-op.
//!
//! The element is stateless apart from one deferred self-announcement: a
//! non-router node answering What-Is-Network-Number waits a short delay so
//! that routers (which answer immediately) win the race, and cancels its
//! answer when anyone else's Network-Number-Is is observed first. The delay
//! is a stored deadline polled through
//! [`NetworkServiceAccessPoint::handle_timeouts`](crate::network::NetworkServiceAccessPoint::handle_timeouts).

use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::datalink::LinkAddress;
use crate::network::address::Address;
use crate::network::cache::RouterStatus;
use crate::network::message::NetworkMessage;
use crate::network::npdu::Npdu;
use crate::network::sap::{AdapterId, SapState};

/// How long a non-router defers its Network-Number-Is answer.
const SELF_ANNOUNCE_DELAY: Duration = Duration::from_secs(2);

/// Deferred Network-Number-Is announcement.
struct SelfAnnounce {
    adapter: AdapterId,
    deadline: Instant,
}

/// The discovery protocol handler.
pub(crate) struct NetworkServiceElement {
    self_announce: Option<SelfAnnounce>,
}

impl NetworkServiceElement {
    pub(crate) fn new() -> Self {
        Self {
            self_announce: None,
        }
    }

    /// Dispatch one inbound network-layer message.
    pub(crate) fn indication(
        &mut self,
        state: &mut SapState,
        adapter: AdapterId,
        link_source: &[u8],
        was_broadcast: bool,
        msg: &NetworkMessage,
        npdu: &Npdu,
    ) {
        match msg {
            NetworkMessage::WhoIsRouterToNetwork(target) => {
                self.who_is_router(state, adapter, link_source, *target, npdu)
            }
            NetworkMessage::IAmRouterToNetwork(nets) => {
                self.i_am_router(state, adapter, link_source, nets)
            }
            NetworkMessage::WhatIsNetworkNumber => {
                self.what_is_number_query(state, adapter, was_broadcast)
            }
            NetworkMessage::NetworkNumberIs {
                network,
                configured,
            } => self.network_number_heard(state, adapter, was_broadcast, *network, *configured),
            NetworkMessage::RouterBusyToNetwork(_) => {
                let net = state.adapters[adapter].network_number();
                state.cache.update_status(
                    net,
                    &Address::LocalStation(link_source.to_vec()),
                    RouterStatus::Busy,
                );
            }
            NetworkMessage::RouterAvailableToNetwork(_) => {
                let net = state.adapters[adapter].network_number();
                state.cache.update_status(
                    net,
                    &Address::LocalStation(link_source.to_vec()),
                    RouterStatus::Available,
                );
            }
            NetworkMessage::RejectMessageToNetwork { reason, network } => {
                warn!(
                    "router {} rejected traffic for network {} (reason {})",
                    hex::encode(link_source),
                    network,
                    reason
                );
            }
            NetworkMessage::Other { message_type, .. } => {
                debug!(
                    "unsupported network message type 0x{:02x}, ignored",
                    message_type
                );
            }
        }
    }

    /// Who-Is-Router-To-Network: answer from direct connections or the
    /// cache, else relay the question outward.
    fn who_is_router(
        &mut self,
        state: &mut SapState,
        adapter: AdapterId,
        link_source: &[u8],
        target: Option<u16>,
        npdu: &Npdu,
    ) {
        if !state.is_router() {
            trace!("not a router, ignoring Who-Is-Router-To-Network");
            return;
        }

        let reply_to = LinkAddress::Station(link_source.to_vec());
        match target {
            None => {
                // Everything we route to, other than the asker's own net.
                let nets = state.connected_networks(Some(adapter));
                if !nets.is_empty() {
                    state.send_network_message(
                        adapter,
                        &reply_to,
                        None,
                        &NetworkMessage::IAmRouterToNetwork(nets),
                    );
                }
            }
            Some(dnet) => {
                let arrival_net = state.adapters[adapter].network_number();
                if Some(dnet) == arrival_net {
                    trace!("asked for a route to the asker's own network {}", dnet);
                    return;
                }
                let direct = state.adapter_for(dnet).is_some();
                let cached = !direct
                    && state
                        .cache
                        .lookup(dnet)
                        .is_some_and(|info| info.snet != arrival_net);
                if direct || cached {
                    state.send_network_message(
                        adapter,
                        &reply_to,
                        None,
                        &NetworkMessage::IAmRouterToNetwork(vec![dnet]),
                    );
                    return;
                }

                // Unknown here: relay the question on every other adapter,
                // carrying the original asker's address so answers can
                // eventually route back.
                let source = npdu.source.clone().or_else(|| {
                    arrival_net.map(|net| Address::RemoteStation(net, link_source.to_vec()))
                });
                let Some(source) = source else {
                    warn!("cannot relay Who-Is-Router, own network number unknown");
                    return;
                };
                debug!("relaying Who-Is-Router-To-Network({}) outward", dnet);
                state.broadcast_network_message(
                    Some(adapter),
                    Some(source),
                    &NetworkMessage::WhoIsRouterToNetwork(Some(dnet)),
                );
            }
        }
    }

    /// I-Am-Router-To-Network: learn the routes, propagate the news one hop,
    /// and flush traffic that was waiting on them.
    fn i_am_router(
        &mut self,
        state: &mut SapState,
        adapter: AdapterId,
        link_source: &[u8],
        nets: &[u16],
    ) {
        let arrival_net = state.adapters[adapter].network_number();

        // A router cannot announce a network we are directly attached to.
        let learned: Vec<u16> = nets
            .iter()
            .copied()
            .filter(|net| {
                let spoofed = state.adapter_for(*net).is_some();
                if spoofed {
                    warn!("ignoring announced route to directly connected network {}", net);
                }
                !spoofed
            })
            .collect();
        if learned.is_empty() {
            return;
        }

        state.cache.update(
            arrival_net,
            &Address::LocalStation(link_source.to_vec()),
            &learned,
        );

        // Router knowledge propagates one hop at a time: these networks are
        // now reachable through us as well.
        if state.is_router() {
            state.broadcast_network_message(
                Some(adapter),
                None,
                &NetworkMessage::IAmRouterToNetwork(learned.clone()),
            );
        }

        // Flush traffic queued for the now-resolved networks, in FIFO
        // order, addressed to the announcing router.
        let router = LinkAddress::Station(link_source.to_vec());
        for net in &learned {
            let Some(queue) = state.pending.remove(net) else {
                continue;
            };
            debug!("flushing {} queued NPDUs for network {}", queue.len(), net);
            for npdu in queue {
                if let Err(e) = state.transmit(adapter, &npdu, &router) {
                    warn!("flush transmit for network {} failed: {}", net, e);
                }
            }
        }
    }

    /// What-Is-Network-Number: routers answer at once; a non-router defers
    /// so it only answers when nobody better does.
    fn what_is_number_query(&mut self, state: &mut SapState, adapter: AdapterId, was_broadcast: bool) {
        if state.adapters[adapter].network_number().is_none() {
            trace!("own network number unknown, cannot answer What-Is-Network-Number");
            return;
        }

        if state.is_router() || !was_broadcast {
            self.announce(state, adapter);
        } else if self.self_announce.is_none() {
            trace!("deferring Network-Number-Is answer");
            self.self_announce = Some(SelfAnnounce {
                adapter,
                deadline: Instant::now() + SELF_ANNOUNCE_DELAY,
            });
        }
    }

    /// Network-Number-Is: adopt, confirm or refuse a peer's announcement.
    fn network_number_heard(
        &mut self,
        state: &mut SapState,
        adapter: AdapterId,
        was_broadcast: bool,
        network: u16,
        _configured: bool,
    ) {
        if !was_broadcast {
            // Only broadcast announcements are trusted.
            trace!("ignoring unicast Network-Number-Is");
            return;
        }

        // Someone else answered first; stand down.
        if self
            .self_announce
            .as_ref()
            .is_some_and(|sa| sa.adapter == adapter)
        {
            trace!("cancelling deferred self-announcement");
            self.self_announce = None;
        }

        let a = &mut state.adapters[adapter];
        match a.network_number() {
            None => a.learn_network_number(network),
            Some(own) if own == network => {}
            Some(own) => {
                if a.is_configured() {
                    warn!(
                        "peer announced network {} but {} is configured, keeping it",
                        network, own
                    );
                } else {
                    warn!(
                        "peer announced network {} but {} was already learned, keeping it",
                        network, own
                    );
                }
            }
        }
    }

    /// Broadcast one adapter's Network-Number-Is with its actual
    /// configured/learned flag.
    fn announce(&mut self, state: &mut SapState, adapter: AdapterId) {
        let Some(network) = state.adapters[adapter].network_number() else {
            return;
        };
        let configured = state.adapters[adapter].is_configured();
        state.send_network_message(
            adapter,
            &LinkAddress::Broadcast,
            None,
            &NetworkMessage::NetworkNumberIs {
                network,
                configured,
            },
        );
    }

    /// Originate What-Is-Network-Number on adapters with an unknown number.
    pub(crate) fn what_is_network_number(&mut self, state: &mut SapState) {
        for id in 0..state.adapters.len() {
            if state.adapters[id].network_number().is_none() {
                state.send_network_message(
                    id,
                    &LinkAddress::Broadcast,
                    None,
                    &NetworkMessage::WhatIsNetworkNumber,
                );
            }
        }
    }

    /// Announce every configured network number, one broadcast per adapter.
    pub(crate) fn network_number_is(&mut self, state: &mut SapState) {
        for id in 0..state.adapters.len() {
            if state.adapters[id].is_configured() {
                self.announce(state, id);
            }
        }
    }

    /// Fire the deferred self-announcement once its deadline passes.
    pub(crate) fn handle_timeouts(&mut self, state: &mut SapState, now: Instant) {
        if let Some(sa) = &self.self_announce {
            if sa.deadline <= now {
                let adapter = sa.adapter;
                self.self_announce = None;
                debug!("deferred Network-Number-Is firing");
                self.announce(state, adapter);
            }
        }
    }
}
