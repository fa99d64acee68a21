//! In-process host stack.
//!
//! `MemoryHost` keeps a device table behind a `RwLock`, dispatches frames
//! queued on driver-backed devices to their `start_xmit`, and records what
//! reaches physical devices or the local receive path. Every device gets an
//! IPv4 neighbour table; drivers adjust its parameters at registration.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use ipnet::Ipv4Net;
use smoltcp::wire::EthernetAddress;
use tracing::{debug, trace};

use super::ethernet::EthernetHeaderOps;
use super::{
    DeviceDirectory, DeviceId, DeviceRegistrar, DeviceView, DriverHeaderOps, HeaderOps,
    HostError, LinkDevice, LinkParams, NetDeviceOps, PacketTransport,
};
use crate::frame::Frame;
use crate::neighbor::{AddressFamily, NeighParms, Neighbour, NeighbourTable};

/// Registration history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Registered { id: DeviceId, name: String },
    Unregistered { id: DeviceId, name: String },
}

/// Link-layer side of a table entry.
#[derive(Clone)]
struct Link {
    hw_addr: EthernetAddress,
    header_ops: Option<Arc<dyn HeaderOps>>,
    driver: Option<Arc<dyn NetDeviceOps>>,
}

/// Read guard over the device table.
pub struct TableGuard<'a>(RwLockReadGuard<'a, Vec<DeviceView>>);

impl Deref for TableGuard<'_> {
    type Target = [DeviceView];

    fn deref(&self) -> &[DeviceView] {
        &self.0
    }
}

/// Host stack kept entirely in memory.
pub struct MemoryHost {
    /// Device listing, in registration order.
    table: RwLock<Vec<DeviceView>>,
    links: Mutex<HashMap<DeviceId, Link>>,
    neighbours: Mutex<HashMap<DeviceId, NeighbourTable>>,
    next_id: Mutex<u32>,
    /// Maximum number of devices, if limited.
    capacity: Option<usize>,
    transmitted: Mutex<Vec<Frame>>,
    delivered: Mutex<Vec<Frame>>,
    events: Mutex<Vec<HostEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Vec::new()),
            links: Mutex::new(HashMap::new()),
            neighbours: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
            capacity: None,
            transmitted: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Create a host that refuses registrations beyond `max_devices`.
    pub fn with_capacity_limit(max_devices: usize) -> Self {
        Self {
            capacity: Some(max_devices),
            ..Self::new()
        }
    }

    fn allocate_id(&self) -> DeviceId {
        let mut next = lock(&self.next_id);
        let id = DeviceId(*next);
        *next += 1;
        id
    }

    fn insert(&self, name: &str, link: Link, parms: NeighParms) -> Result<DeviceId, HostError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if self.capacity.is_some_and(|max| table.len() >= max) {
            return Err(HostError::TableFull);
        }
        if table.iter().any(|dev| dev.name == name) {
            return Err(HostError::NameInUse(name.to_string()));
        }

        let id = self.allocate_id();
        table.push(DeviceView {
            id,
            name: name.to_string(),
            up: false,
            addresses: Vec::new(),
        });
        lock(&self.links).insert(id, link);
        lock(&self.neighbours).insert(id, NeighbourTable::new(id, parms));
        Ok(id)
    }

    /// Add a device without a driver, e.g. a physical NIC or loopback.
    ///
    /// The device starts administratively down with no addresses.
    pub fn add_device(
        &self,
        name: &str,
        hw_addr: EthernetAddress,
        header_ops: Option<Arc<dyn HeaderOps>>,
    ) -> Result<DeviceId, HostError> {
        let id = self.insert(
            name,
            Link {
                hw_addr,
                header_ops,
                driver: None,
            },
            NeighParms::new(AddressFamily::Inet),
        )?;
        debug!(%id, name, "Device added");
        Ok(id)
    }

    /// Add an Ethernet device with its own header builder.
    pub fn add_ethernet(
        &self,
        name: &str,
        hw_addr: EthernetAddress,
    ) -> Result<DeviceId, HostError> {
        let id = self.add_device(name, hw_addr, None)?;
        let ops: Arc<dyn HeaderOps> = Arc::new(EthernetHeaderOps::new(id, hw_addr));
        if let Some(link) = lock(&self.links).get_mut(&id) {
            link.header_ops = Some(ops);
        }
        Ok(id)
    }

    /// Change the administrative state, notifying the driver if there is one.
    pub fn set_admin_state(&self, id: DeviceId, up: bool) -> bool {
        {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            let Some(dev) = table.iter_mut().find(|dev| dev.id == id) else {
                return false;
            };
            if dev.up == up {
                return true;
            }
            dev.up = up;
        }

        if let Some(driver) = self.driver(id) {
            if up {
                driver.open();
            } else {
                driver.stop();
            }
        }
        true
    }

    /// Append an IPv4 address; the first one added is the primary.
    pub fn add_address(&self, id: DeviceId, addr: Ipv4Net) -> bool {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        match table.iter_mut().find(|dev| dev.id == id) {
            Some(dev) => {
                dev.addresses.push(addr);
                true
            }
            None => false,
        }
    }

    pub fn device(&self, id: DeviceId) -> Option<DeviceView> {
        self.read().iter().find(|dev| dev.id == id).cloned()
    }

    pub fn device_by_name(&self, name: &str) -> Option<DeviceView> {
        self.read().iter().find(|dev| dev.name == name).cloned()
    }

    pub fn driver(&self, id: DeviceId) -> Option<Arc<dyn NetDeviceOps>> {
        lock(&self.links).get(&id).and_then(|link| link.driver.clone())
    }

    /// Link parameters of a device; devices without a driver are Ethernet.
    pub fn link_params(&self, id: DeviceId) -> Option<LinkParams> {
        let links = lock(&self.links);
        let link = links.get(&id)?;
        Some(match &link.driver {
            Some(driver) => driver.link_params(),
            None => LinkParams::ETHERNET,
        })
    }

    /// Resolve `addr` through the IPv4 neighbour table of `id`.
    ///
    /// Returns the entry and the number of solicitations it sends.
    pub fn neighbour_lookup(&self, id: DeviceId, addr: Ipv4Addr) -> Option<(Neighbour, u32)> {
        let mut tables = lock(&self.neighbours);
        let table = tables.get_mut(&id)?;
        let n = table.resolve(addr).clone();
        Some((n, table.solicitations(&addr)))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames that reached a device without a driver, oldest first.
    pub fn take_transmitted(&self) -> Vec<Frame> {
        std::mem::take(&mut *lock(&self.transmitted))
    }

    /// Frames handed to the local receive path, oldest first.
    pub fn take_delivered(&self) -> Vec<Frame> {
        std::mem::take(&mut *lock(&self.delivered))
    }

    pub fn events(&self) -> Vec<HostEvent> {
        lock(&self.events).clone()
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDirectory for MemoryHost {
    type Guard<'a> = TableGuard<'a>;

    fn read(&self) -> TableGuard<'_> {
        TableGuard(self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn link_by_name(&self, name: &str) -> Option<LinkDevice> {
        let id = self.read().iter().find(|dev| dev.name == name)?.id;
        let link = lock(&self.links).get(&id)?.clone();
        let hw_addr = match &link.driver {
            Some(driver) => driver.hw_addr(),
            None => link.hw_addr,
        };

        Some(LinkDevice {
            id,
            name: name.to_string(),
            hw_addr,
            header_ops: link.header_ops,
        })
    }
}

impl DeviceRegistrar for MemoryHost {
    fn register(&self, dev: Arc<dyn NetDeviceOps>) -> Result<DeviceId, HostError> {
        let name = dev.name().to_string();
        let mut parms = NeighParms::new(AddressFamily::Inet);
        dev.neigh_setup(&mut parms);
        let header_ops: Option<Arc<dyn HeaderOps>> = dev
            .header_ops()
            .is_some()
            .then(|| Arc::new(DriverHeaderOps(dev.clone())) as Arc<dyn HeaderOps>);

        let id = self.insert(
            &name,
            Link {
                hw_addr: dev.hw_addr(),
                header_ops,
                driver: Some(dev),
            },
            parms,
        )?;

        debug!(%id, name = %name, "Device registered");
        lock(&self.events).push(HostEvent::Registered { id, name });
        Ok(id)
    }

    fn unregister(&self, id: DeviceId) {
        let removed = {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            let pos = table.iter().position(|dev| dev.id == id);
            pos.map(|pos| table.remove(pos))
        };
        let Some(view) = removed else {
            return;
        };

        let link = lock(&self.links).remove(&id);
        lock(&self.neighbours).remove(&id);
        if view.up
            && let Some(driver) = link.and_then(|link| link.driver)
        {
            driver.stop();
        }

        debug!(%id, name = %view.name, "Device unregistered");
        lock(&self.events).push(HostEvent::Unregistered {
            id,
            name: view.name,
        });
    }
}

impl PacketTransport for MemoryHost {
    fn queue_xmit(&self, frame: Frame) {
        match self.driver(frame.dev()) {
            Some(driver) => driver.start_xmit(frame),
            None => {
                trace!(dev = %frame.dev(), len = frame.len(), "Frame transmitted");
                lock(&self.transmitted).push(frame);
            }
        }
    }

    fn deliver(&self, frame: Frame) {
        trace!(dev = %frame.dev(), len = frame.len(), "Frame delivered");
        lock(&self.delivered).push(frame);
    }
}
