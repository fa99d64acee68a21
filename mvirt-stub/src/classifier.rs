//! Inbound demultiplexer.
//!
//! Frames received on the uplink are assigned to a device by their IPv4
//! destination. Every device known to the host is a candidate, not only the
//! stubs of a registry. The scan runs under the directory's read guard:
//!
//! - devices that are down or have no address are skipped
//! - only the primary address of a device is compared
//! - an exact address match ends the scan
//! - a subnet match is recorded and the scan continues, so a later subnet
//!   match replaces an earlier one, and a later exact match beats both

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::debug;

use crate::config::Delivery;
use crate::frame::Frame;
use crate::host::{DeviceDirectory, DeviceId, DeviceView, PacketTransport};

/// How a destination matched its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// Destination equals the device's address.
    Exact,
    /// Destination lies in the device's subnet.
    Subnet,
}

/// Result of classifying one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The frame carried no IPv4 header and was dropped unexamined.
    NoNetworkHeader,
    /// No device matched the destination.
    Unclaimed,
    /// The frame was assigned to `device`.
    Owned {
        device: DeviceId,
        name: String,
        matched: Match,
    },
}

impl Classification {
    pub fn owner(&self) -> Option<DeviceId> {
        match self {
            Classification::Owned { device, .. } => Some(*device),
            _ => None,
        }
    }
}

/// Assigns frames arriving on the uplink to their destination device.
pub struct InboundClassifier<H> {
    host: Arc<H>,
    delivery: Delivery,
    debug: bool,
}

impl<H: DeviceDirectory + PacketTransport> InboundClassifier<H> {
    pub fn new(host: Arc<H>, delivery: Delivery, debug: bool) -> Self {
        Self {
            host,
            delivery,
            debug,
        }
    }

    /// Classify and consume a frame.
    ///
    /// With [`Delivery::Forward`], owned frames are handed to the host's
    /// receive path relabeled to their owner; everything else is dropped.
    pub fn receive(&self, mut frame: Frame) -> Classification {
        let Some(dst) = frame.ipv4_dst() else {
            return Classification::NoNetworkHeader;
        };

        let outcome = {
            let devices = self.host.read();
            match self.scan(&*devices, dst) {
                Some((dev, matched)) => Classification::Owned {
                    device: dev.id,
                    name: dev.name.clone(),
                    matched,
                },
                None => Classification::Unclaimed,
            }
        };

        match (&outcome, self.delivery) {
            (Classification::Owned { device, .. }, Delivery::Forward) => {
                frame.set_dev(*device);
                self.host.deliver(frame);
            }
            (Classification::Owned { device, .. }, Delivery::Discard) => {
                frame.set_dev(*device);
            }
            _ => {
                if self.debug {
                    debug!(target: "mvirt_stub::frames", dst = %dst, "no owner");
                }
            }
        }

        outcome
    }

    fn scan<'a>(
        &self,
        devices: &'a [DeviceView],
        dst: Ipv4Addr,
    ) -> Option<(&'a DeviceView, Match)> {
        let mut owner = None;

        for dev in devices {
            if !dev.up {
                continue;
            }
            let Some(ifa) = dev.primary_address() else {
                continue;
            };

            if dst == ifa.addr() {
                if self.debug {
                    debug!(
                        target: "mvirt_stub::frames",
                        dev = %dev.name,
                        dst = %dst,
                        "<- (host)"
                    );
                }
                return Some((dev, Match::Exact));
            }

            let mask = u32::from(ifa.netmask());
            if u32::from(dst) & mask == u32::from(ifa.addr()) & mask {
                if self.debug {
                    debug!(
                        target: "mvirt_stub::frames",
                        dev = %dev.name,
                        dst = %dst,
                        "<- (net)"
                    );
                }
                owner = Some((dev, Match::Subnet));
            }
        }

        owner
    }
}
