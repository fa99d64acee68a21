//! Neighbour resolution override for stub devices.
//!
//! A stub has no link of its own, so ARP requests sent "through" it would
//! never be answered. For IPv4 neighbour tables created on a stub, probing
//! is disabled and every new unresolved entry is switched to degraded ops
//! that output frames directly instead of soliciting.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::Ipv4Addr;

use crate::host::DeviceId;

/// Linux defaults for `ucast_probes` / `mcast_probes`.
pub const DEFAULT_UCAST_PROBES: u32 = 3;
pub const DEFAULT_MCAST_PROBES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

/// Neighbour unreachability detection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudState {
    /// Freshly created, nothing known yet.
    None,
    /// Solicitation sent, waiting for a reply.
    Incomplete,
    Reachable,
}

/// How an entry sends frames queued for its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighOutput {
    /// Hold the frame and solicit the link-layer address first.
    Resolve,
    /// Hand the frame straight to the device's header builder.
    Direct,
}

/// Operation set of a neighbour entry.
#[derive(Debug, PartialEq, Eq)]
pub struct NeighOps {
    pub name: &'static str,
    pub output: NeighOutput,
    /// Whether entries using these ops send resolution requests.
    pub solicits: bool,
}

pub static ARP_OPS: NeighOps = NeighOps {
    name: "arp",
    output: NeighOutput::Resolve,
    solicits: true,
};

/// Degraded ops: no solicitation, frames go out as-is.
pub static ARP_BROKEN_OPS: NeighOps = NeighOps {
    name: "arp-broken",
    output: NeighOutput::Direct,
    solicits: false,
};

/// A neighbour cache entry.
#[derive(Debug, Clone)]
pub struct Neighbour {
    pub addr: Ipv4Addr,
    pub dev: DeviceId,
    pub state: NudState,
    pub ops: &'static NeighOps,
    pub output: NeighOutput,
}

impl Neighbour {
    pub fn new(addr: Ipv4Addr, dev: DeviceId) -> Self {
        Self {
            addr,
            dev,
            state: NudState::None,
            ops: &ARP_OPS,
            output: ARP_OPS.output,
        }
    }

    pub fn is_degraded(&self) -> bool {
        std::ptr::eq(self.ops, &ARP_BROKEN_OPS)
    }
}

/// Hook run on every entry a table creates.
pub type NeighSetup = fn(&mut Neighbour) -> bool;

/// Per-device neighbour parameters.
#[derive(Debug, Clone)]
pub struct NeighParms {
    pub family: AddressFamily,
    pub ucast_probes: u32,
    pub mcast_probes: u32,
    pub neigh_setup: Option<NeighSetup>,
}

impl NeighParms {
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            ucast_probes: DEFAULT_UCAST_PROBES,
            mcast_probes: DEFAULT_MCAST_PROBES,
            neigh_setup: None,
        }
    }
}

/// Switch a new unresolved entry to the degraded ops.
///
/// Returns whether the entry changed; resolved or already degraded entries
/// are left alone.
pub fn degrade_neighbour(n: &mut Neighbour) -> bool {
    if n.state != NudState::None || n.is_degraded() {
        return false;
    }
    n.ops = &ARP_BROKEN_OPS;
    n.output = n.ops.output;
    true
}

/// Install the stub override on IPv4 neighbour parameters.
pub fn install_override(parms: &mut NeighParms) {
    if parms.family != AddressFamily::Inet {
        return;
    }
    parms.neigh_setup = Some(degrade_neighbour);
    parms.ucast_probes = 0;
    parms.mcast_probes = 0;
}

/// Neighbour table of one device and address family.
#[derive(Debug)]
pub struct NeighbourTable {
    dev: DeviceId,
    parms: NeighParms,
    entries: HashMap<Ipv4Addr, Neighbour>,
}

impl NeighbourTable {
    pub fn new(dev: DeviceId, parms: NeighParms) -> Self {
        Self {
            dev,
            parms,
            entries: HashMap::new(),
        }
    }

    /// Find the entry for `addr`, creating it if needed.
    ///
    /// New entries run the setup hook once, before they are visible.
    pub fn lookup_or_create(&mut self, addr: Ipv4Addr) -> &mut Neighbour {
        match self.entries.entry(addr) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut neighbour = Neighbour::new(addr, self.dev);
                if let Some(setup) = self.parms.neigh_setup {
                    setup(&mut neighbour);
                }
                entry.insert(neighbour)
            }
        }
    }

    /// Look up `addr` for output, starting resolution on new entries.
    ///
    /// An entry whose ops solicit moves to `Incomplete`; degraded entries
    /// stay in `None` and send frames directly.
    pub fn resolve(&mut self, addr: Ipv4Addr) -> &Neighbour {
        let n = self.lookup_or_create(addr);
        if n.state == NudState::None && n.ops.solicits {
            n.state = NudState::Incomplete;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolution requests an entry for `addr` would send.
    pub fn solicitations(&self, addr: &Ipv4Addr) -> u32 {
        match self.entries.get(addr) {
            Some(n) if n.ops.solicits => self.parms.ucast_probes + self.parms.mcast_probes,
            _ => 0,
        }
    }
}
