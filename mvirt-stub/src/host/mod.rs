//! Host network stack collaborators.
//!
//! The stub layer owns no devices table, no transmit queue and no header
//! builder of its own. Everything it needs from the surrounding network
//! stack is expressed by the traits in this module:
//!
//! - [`DeviceDirectory`]: the shared device listing, read under a guard
//! - [`DeviceRegistrar`]: registration of driver-backed devices
//! - [`PacketTransport`]: transmit submission and local delivery
//! - [`HeaderOps`]: link-layer header construction of a device
//! - [`NetDeviceOps`]: callbacks the host invokes on a registered device
//!
//! [`memory::MemoryHost`] implements all of them in-process.

pub mod ethernet;
pub mod memory;
pub mod system;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use ipnet::Ipv4Net;
use smoltcp::wire::{ETHERNET_HEADER_LEN, EthernetAddress, EthernetProtocol};
use thiserror::Error;

use crate::endpoint::TxStats;
use crate::frame::Frame;
use crate::neighbor::NeighParms;

/// Host-assigned device identifier (interface index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if#{}", self.0)
    }
}

/// A device as listed in the host's device table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceView {
    pub id: DeviceId,
    pub name: String,
    /// Administrative state.
    pub up: bool,
    /// Configured IPv4 addresses with their masks, primary first.
    pub addresses: Vec<Ipv4Net>,
}

impl DeviceView {
    pub fn primary_address(&self) -> Option<&Ipv4Net> {
        self.addresses.first()
    }
}

/// A device resolved by name, with its link-layer capabilities.
#[derive(Clone)]
pub struct LinkDevice {
    pub id: DeviceId,
    pub name: String,
    pub hw_addr: EthernetAddress,
    pub header_ops: Option<Arc<dyn HeaderOps>>,
}

impl fmt::Debug for LinkDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("hw_addr", &self.hw_addr)
            .field("header_ops", &self.header_ops.is_some())
            .finish()
    }
}

/// Registrar errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("device table is full")]
    TableFull,

    #[error("device name already in use: {0}")]
    NameInUse(String),
}

/// Header construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// Header written without a destination; rebuild after resolution.
    #[error("destination unresolved, header must be rebuilt")]
    Unresolved,

    #[error("frame owned by {actual}, header builder belongs to {expected}")]
    ForeignDevice { expected: DeviceId, actual: DeviceId },

    #[error("frame too short for a link-layer header")]
    Truncated,

    #[error("payload length {0} does not fit a length-typed header")]
    LengthOverflow(usize),
}

/// Link parameters a device reports to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    pub mtu: usize,
    pub header_len: usize,
    pub tx_queue_len: usize,
    pub broadcast: EthernetAddress,
}

impl LinkParams {
    /// Plain Ethernet.
    pub const ETHERNET: LinkParams = LinkParams {
        mtu: 1500,
        header_len: ETHERNET_HEADER_LEN,
        tx_queue_len: 1000,
        broadcast: EthernetAddress::BROADCAST,
    };
}

/// Parameters of a header construction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    pub ethertype: EthernetProtocol,
    pub dst: Option<EthernetAddress>,
    /// Defaults to the device's own address.
    pub src: Option<EthernetAddress>,
    /// Payload length, used by length-typed (802.3) headers.
    pub len: usize,
}

/// Link-layer header construction capability of a device.
pub trait HeaderOps: Send + Sync {
    /// Prepend a link-layer header and return its length.
    fn create(&self, frame: &mut Frame, header: &LinkHeader) -> Result<usize, HeaderError>;

    /// Complete a header written while the destination was unresolved.
    fn rebuild(&self, frame: &mut Frame) -> Result<(), HeaderError>;
}

/// Header capability of a registered device, reached through its driver.
///
/// Devices whose driver reports no capability build no header and succeed.
pub struct DriverHeaderOps(pub Arc<dyn NetDeviceOps>);

impl HeaderOps for DriverHeaderOps {
    fn create(&self, frame: &mut Frame, header: &LinkHeader) -> Result<usize, HeaderError> {
        match self.0.header_ops() {
            Some(ops) => ops.create(frame, header),
            None => Ok(0),
        }
    }

    fn rebuild(&self, frame: &mut Frame) -> Result<(), HeaderError> {
        match self.0.header_ops() {
            Some(ops) => ops.rebuild(frame),
            None => Ok(()),
        }
    }
}

/// Driver callbacks of a registered device.
pub trait NetDeviceOps: Send + Sync {
    fn name(&self) -> &str;

    fn hw_addr(&self) -> EthernetAddress;

    /// Device brought administratively up.
    fn open(&self);

    /// Device brought administratively down.
    fn stop(&self);

    /// Transmit a frame handed to this device.
    fn start_xmit(&self, frame: Frame);

    fn header_ops(&self) -> Option<&dyn HeaderOps>;

    fn link_params(&self) -> LinkParams;

    /// Adjust neighbour parameters for tables created on this device.
    fn neigh_setup(&self, parms: &mut NeighParms);

    fn set_mac_address(&self, addr: EthernetAddress) -> crate::error::Result<()>;

    fn stats(&self) -> TxStats;
}

/// The host's shared device listing.
pub trait DeviceDirectory: Send + Sync {
    /// Shared guard over the device table; writers are excluded while held.
    type Guard<'a>: Deref<Target = [DeviceView]>
    where
        Self: 'a;

    fn read(&self) -> Self::Guard<'_>;

    /// Resolve a device by name.
    fn link_by_name(&self, name: &str) -> Option<LinkDevice>;
}

/// Registration of driver-backed devices.
pub trait DeviceRegistrar: Send + Sync {
    fn register(&self, dev: Arc<dyn NetDeviceOps>) -> Result<DeviceId, HostError>;

    fn unregister(&self, id: DeviceId);
}

/// Frame submission into the host stack.
pub trait PacketTransport: Send + Sync {
    /// Queue a frame for transmission on the device that owns it.
    fn queue_xmit(&self, frame: Frame);

    /// Hand a frame to the local receive path of the device that owns it.
    fn deliver(&self, frame: Frame);
}

/// Everything the stub layer needs from a host.
pub trait HostStack: DeviceDirectory + DeviceRegistrar + PacketTransport {}

impl<T: DeviceDirectory + DeviceRegistrar + PacketTransport> HostStack for T {}
