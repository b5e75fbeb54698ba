//! Data link abstraction for network adapters.
//!
//! The routing engine does not speak UDP, MS/TP or any other concrete
//! transport. Each [`NetworkAdapter`](crate::network::NetworkAdapter) owns a
//! boxed [`DataLink`] that can deliver an encoded NPDU to a station on its
//! attached network or to all stations at once. Concrete implementations
//! (BACnet/IP with its BVLC framing, an MS/TP driver, a serial console) live
//! outside this crate; [`TestLink`] is provided for tests and examples.
//!
//! A link-layer station is an opaque byte string: 1 byte for an MS/TP MAC,
//! 6 bytes (IPv4 + port) for BACnet/IP, and so on. The engine never
//! interprets station bytes, it only compares and copies them.

use thiserror::Error;

/// Result type for data link operations.
pub type Result<T> = core::result::Result<T, DataLinkError>;

/// Errors reported by a data link implementation.
#[derive(Debug, Error)]
pub enum DataLinkError {
    /// The frame could not be transmitted as given.
    #[error("invalid frame")]
    InvalidFrame,

    /// The destination is not representable on this link.
    #[error("address error: {0}")]
    AddressError(String),

    /// Underlying transport failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Link-layer destination for an outgoing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddress {
    /// A single station, identified by its link-layer address bytes.
    Station(Vec<u8>),

    /// All stations on the attached network.
    Broadcast,
}

/// One attached link-layer transport.
///
/// Implementations transmit an already-encoded NPDU and must not block: the
/// engine hands the frame off and returns immediately. Inbound frames are
/// pushed into the engine by the caller via
/// [`NetworkServiceAccessPoint::receive`](crate::network::NetworkServiceAccessPoint::receive),
/// so the trait only covers the outbound direction.
pub trait DataLink {
    /// Transmit an encoded NPDU to the given link-layer destination.
    fn send_frame(&mut self, frame: &[u8], destination: &LinkAddress) -> Result<()>;
}

/// In-memory data link that records every transmitted frame.
///
/// Used by the test suites to stand in for a real transport; the shared
/// frame log lets a test bind the link into the engine and still inspect
/// what was sent.
///
/// # Examples
///
/// ```
/// use bacnet_route::datalink::{DataLink, LinkAddress, TestLink};
///
/// let (mut link, frames) = TestLink::new();
/// link.send_frame(&[0x01, 0x00], &LinkAddress::Broadcast).unwrap();
/// assert_eq!(frames.borrow().len(), 1);
/// ```
pub struct TestLink {
    frames: FrameLog,
}

/// Shared log of `(destination, frame)` pairs captured by a [`TestLink`].
pub type FrameLog = std::rc::Rc<std::cell::RefCell<Vec<(LinkAddress, Vec<u8>)>>>;

impl TestLink {
    /// Create a test link and a handle to its frame log.
    pub fn new() -> (Self, FrameLog) {
        let frames: FrameLog = Default::default();
        (
            Self {
                frames: frames.clone(),
            },
            frames,
        )
    }
}

impl DataLink for TestLink {
    fn send_frame(&mut self, frame: &[u8], destination: &LinkAddress) -> Result<()> {
        self.frames
            .borrow_mut()
            .push((destination.clone(), frame.to_vec()));
        Ok(())
    }
}
