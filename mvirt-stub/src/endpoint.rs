//! Stub endpoint: a virtual Ethernet device without a link of its own.
//!
//! Transmitting on a stub never touches hardware. The frame is counted,
//! relabeled to the uplink and queued there; header construction and
//! neighbour resolution are borrowed from the uplink as well (see
//! [`crate::header`] and [`crate::neighbor`]).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rand::Rng;
use smoltcp::wire::EthernetAddress;
use tracing::debug;

use crate::error::{Result, StubError};
use crate::frame::Frame;
use crate::host::{HeaderOps, LinkParams, NetDeviceOps};
use crate::neighbor::{self, NeighParms};
use crate::uplink::Uplink;

/// Transmit statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    pub packets: u64,
    pub bytes: u64,
}

/// Transmit counters. The host never runs one stub's transmit path
/// concurrently with itself, so relaxed updates are sufficient.
#[derive(Debug, Default)]
struct TxCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl TxCounters {
    fn record(&self, len: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TxStats {
        TxStats {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Whether `addr` may be assigned to an Ethernet device.
pub fn is_valid_hw_addr(addr: &EthernetAddress) -> bool {
    addr.is_unicast() && addr.0 != [0; 6]
}

/// Generate a random MAC address with local admin bit set.
pub fn random_hw_addr() -> EthernetAddress {
    let mut rng = rand::thread_rng();
    let mut mac = [0u8; 6];
    rng.fill(&mut mac);
    // Set locally administered and unicast bits
    mac[0] = (mac[0] & 0xfe) | 0x02;
    EthernetAddress(mac)
}

/// A stub device bound to an uplink.
#[derive(Debug)]
pub struct Endpoint {
    index: usize,
    name: String,
    hw_addr: RwLock<EthernetAddress>,
    /// Transmit queue running (device open).
    running: AtomicBool,
    stats: TxCounters,
    uplink: Arc<Uplink>,
    debug: bool,
}

impl Endpoint {
    pub fn new(
        index: usize,
        name: impl Into<String>,
        hw_addr: EthernetAddress,
        uplink: Arc<Uplink>,
        debug: bool,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            hw_addr: RwLock::new(hw_addr),
            running: AtomicBool::new(false),
            stats: TxCounters::default(),
            uplink,
            debug,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn uplink(&self) -> &Arc<Uplink> {
        &self.uplink
    }

    pub fn is_up(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl NetDeviceOps for Endpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn hw_addr(&self) -> EthernetAddress {
        *self.hw_addr.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) {
        self.running.store(true, Ordering::Release);
        debug!(stub = %self.name, "Stub up");
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        debug!(stub = %self.name, "Stub down");
    }

    fn start_xmit(&self, mut frame: Frame) {
        self.stats.record(frame.len());

        if self.debug {
            debug!(
                target: "mvirt_stub::frames",
                stub = %self.name,
                len = frame.len(),
                uplink = %self.uplink.name(),
                "->"
            );
        }

        frame.set_dev(self.uplink.id());
        self.uplink.submit(frame);
    }

    fn header_ops(&self) -> Option<&dyn HeaderOps> {
        Some(self)
    }

    /// Stubs look like plain Ethernet to the host.
    fn link_params(&self) -> LinkParams {
        LinkParams::ETHERNET
    }

    fn neigh_setup(&self, parms: &mut NeighParms) {
        neighbor::install_override(parms);
    }

    fn set_mac_address(&self, addr: EthernetAddress) -> Result<()> {
        if !is_valid_hw_addr(&addr) {
            return Err(StubError::InvalidHardwareAddress(addr));
        }
        *self.hw_addr.write().unwrap_or_else(PoisonError::into_inner) = addr;
        debug!(stub = %self.name, mac = %addr, "Hardware address changed");
        Ok(())
    }

    fn stats(&self) -> TxStats {
        self.stats.snapshot()
    }
}
