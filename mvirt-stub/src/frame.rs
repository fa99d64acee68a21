//! Frame buffers in flight through the stub layer.
//!
//! A [`Frame`] carries its bytes, the id of the device that currently owns
//! it, and the offset of a parsed IPv4 header when one was found. Ownership
//! moves between devices: the classifier assigns inbound frames to their
//! destination device, the transmit path relabels outbound frames to the
//! uplink, and header delegation borrows the uplink's identity for the
//! duration of a single call via [`Frame::rebind`].

use std::net::Ipv4Addr;
use std::ops::{Deref, DerefMut};

use smoltcp::phy::ChecksumCapabilities;
use smoltcp::wire::{
    ETHERNET_HEADER_LEN, EthernetAddress, EthernetFrame, EthernetProtocol, EthernetRepr,
    IpProtocol, Ipv4Packet, Ipv4Repr,
};

use crate::host::DeviceId;

/// A link-layer frame and the device it currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    dev: DeviceId,
    /// Offset of the IPv4 header within `data`.
    network: Option<usize>,
}

impl Frame {
    /// Wrap raw bytes without looking for a network header.
    pub fn new(dev: DeviceId, data: Vec<u8>) -> Self {
        Self {
            data,
            dev,
            network: None,
        }
    }

    /// Wrap an Ethernet frame, locating its IPv4 header if it carries one.
    pub fn from_ethernet(dev: DeviceId, data: Vec<u8>) -> Self {
        let network = EthernetFrame::new_checked(data.as_slice())
            .ok()
            .filter(|eth| eth.ethertype() == EthernetProtocol::Ipv4)
            .and_then(|eth| Ipv4Packet::new_checked(eth.payload()).ok())
            .map(|_| ETHERNET_HEADER_LEN);

        Self { data, dev, network }
    }

    /// Wrap a bare IPv4 packet (no link-layer header yet).
    pub fn from_ipv4(dev: DeviceId, data: Vec<u8>) -> Self {
        let network = Ipv4Packet::new_checked(data.as_slice()).ok().map(|_| 0);
        Self { data, dev, network }
    }

    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    pub fn set_dev(&mut self, dev: DeviceId) {
        self.dev = dev;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn has_network_header(&self) -> bool {
        self.network.is_some()
    }

    /// Destination address of the parsed IPv4 header.
    pub fn ipv4_dst(&self) -> Option<Ipv4Addr> {
        let offset = self.network?;
        let packet = Ipv4Packet::new_checked(self.data.get(offset..)?).ok()?;
        Some(packet.dst_addr())
    }

    /// Grow the frame by `len` zeroed bytes at the front and return them.
    pub fn push_front(&mut self, len: usize) -> &mut [u8] {
        self.data.splice(0..0, std::iter::repeat_n(0u8, len));
        if let Some(offset) = self.network.as_mut() {
            *offset += len;
        }
        &mut self.data[..len]
    }

    /// Temporarily hand the frame to `dev`.
    ///
    /// The previous owner is restored when the returned guard is dropped,
    /// whichever way the borrowing scope is left.
    pub fn rebind(&mut self, dev: DeviceId) -> Rebind<'_> {
        let previous = std::mem::replace(&mut self.dev, dev);
        Rebind {
            frame: self,
            previous,
        }
    }
}

/// Scoped owner change created by [`Frame::rebind`].
pub struct Rebind<'a> {
    frame: &'a mut Frame,
    previous: DeviceId,
}

impl Rebind<'_> {
    /// Owner the frame returns to when the guard drops.
    pub fn previous(&self) -> DeviceId {
        self.previous
    }
}

impl Deref for Rebind<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        self.frame
    }
}

impl DerefMut for Rebind<'_> {
    fn deref_mut(&mut self) -> &mut Frame {
        self.frame
    }
}

impl Drop for Rebind<'_> {
    fn drop(&mut self) {
        self.frame.dev = self.previous;
    }
}

/// Build an IPv4 packet carrying an opaque UDP-typed payload.
pub fn build_ipv4_packet(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let repr = Ipv4Repr {
        src_addr: src_ip,
        dst_addr: dst_ip,
        next_header: IpProtocol::Udp,
        payload_len: payload.len(),
        hop_limit: 64,
    };

    let mut buffer = vec![0u8; repr.buffer_len() + payload.len()];
    let mut packet = Ipv4Packet::new_unchecked(&mut buffer);
    repr.emit(&mut packet, &ChecksumCapabilities::default());
    packet.payload_mut().copy_from_slice(payload);
    buffer
}

/// Build an Ethernet frame around an IPv4 packet.
pub fn build_ipv4_frame(
    dst_mac: EthernetAddress,
    src_mac: EthernetAddress,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    payload: &[u8],
) -> Vec<u8> {
    let ip = build_ipv4_packet(src_ip, dst_ip, payload);
    let repr = EthernetRepr {
        src_addr: src_mac,
        dst_addr: dst_mac,
        ethertype: EthernetProtocol::Ipv4,
    };

    let mut buffer = vec![0u8; repr.buffer_len() + ip.len()];
    let mut frame = EthernetFrame::new_unchecked(&mut buffer);
    repr.emit(&mut frame);
    frame.payload_mut().copy_from_slice(&ip);
    buffer
}
