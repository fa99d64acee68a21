//! The physical device stubs are attached to.

use std::fmt;
use std::sync::Arc;

use smoltcp::wire::EthernetAddress;

use crate::frame::Frame;
use crate::host::{DeviceId, HeaderOps, LinkDevice, PacketTransport};

/// Uplink shared by every stub of a registry.
///
/// Resolved once when the registry is initialized and never changed.
pub struct Uplink {
    link: LinkDevice,
    transport: Arc<dyn PacketTransport>,
}

impl Uplink {
    pub fn new(link: LinkDevice, transport: Arc<dyn PacketTransport>) -> Self {
        Self { link, transport }
    }

    pub fn id(&self) -> DeviceId {
        self.link.id
    }

    pub fn name(&self) -> &str {
        &self.link.name
    }

    pub fn hw_addr(&self) -> EthernetAddress {
        self.link.hw_addr
    }

    pub fn header_ops(&self) -> Option<&dyn HeaderOps> {
        self.link.header_ops.as_deref()
    }

    /// Queue a frame on the host transport. The caller relabels it first.
    pub fn submit(&self, frame: Frame) {
        self.transport.queue_xmit(frame);
    }
}

impl fmt::Debug for Uplink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uplink").field("link", &self.link).finish()
    }
}
