//! Network adapters: one per attached network.
//!
//! An adapter binds one local network number (possibly still unknown) to one
//! link-layer transport, and remembers whether that number was statically
//! configured or learned from a peer announcement. Configured numbers are
//! authoritative; learned ones are provisional and first-learned sticks.

use log::{info, trace};

use crate::datalink::{DataLink, LinkAddress, Result};
use crate::network::address::NetNumber;
use crate::network::npdu::Npdu;

/// One attached network.
pub struct NetworkAdapter {
    network_number: Option<NetNumber>,
    // None = unknown, Some(false) = learned, Some(true) = configured.
    configured: Option<bool>,
    link: Box<dyn DataLink>,
}

impl NetworkAdapter {
    /// Bind a link-layer transport, optionally with a configured network
    /// number.
    pub fn new(link: Box<dyn DataLink>, network_number: Option<NetNumber>) -> Self {
        Self {
            network_number,
            configured: network_number.map(|_| true),
            link,
        }
    }

    /// This adapter's network number, if known.
    pub fn network_number(&self) -> Option<NetNumber> {
        self.network_number
    }

    /// `None` while the number is unknown, `Some(true)` when configured,
    /// `Some(false)` when learned from a peer.
    pub fn configured(&self) -> Option<bool> {
        self.configured
    }

    /// True only for a statically configured network number.
    pub fn is_configured(&self) -> bool {
        self.configured == Some(true)
    }

    /// Adopt a network number learned from a peer announcement.
    pub(crate) fn learn_network_number(&mut self, network: NetNumber) {
        info!("adapter learned network number {}", network);
        self.network_number = Some(network);
        self.configured = Some(false);
    }

    /// Encode an NPDU and hand it to the transport.
    pub fn send(&mut self, npdu: &Npdu, destination: &LinkAddress) -> Result<()> {
        trace!(
            "tx net={:?} dest={:?} msg_type={:?} len={}",
            self.network_number,
            destination,
            npdu.message_type,
            npdu.payload.len()
        );
        self.link.send_frame(&npdu.encode(), destination)
    }
}
