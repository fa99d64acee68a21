//! Load the machine's network interfaces into a [`MemoryHost`].

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use smoltcp::wire::EthernetAddress;
use tracing::{debug, warn};

use super::memory::MemoryHost;

/// Interface as reported by `getifaddrs`, merged across address families.
#[derive(Debug, Default)]
struct SystemInterface {
    name: String,
    up: bool,
    loopback: bool,
    hw_addr: Option<[u8; 6]>,
    addresses: Vec<Ipv4Net>,
}

fn entry<'a>(interfaces: &'a mut Vec<SystemInterface>, name: &str) -> &'a mut SystemInterface {
    match interfaces.iter().position(|iface| iface.name == name) {
        Some(pos) => &mut interfaces[pos],
        None => {
            interfaces.push(SystemInterface {
                name: name.to_string(),
                ..Default::default()
            });
            let last = interfaces.len() - 1;
            &mut interfaces[last]
        }
    }
}

/// Copy every interface of the running system into `host`.
///
/// Loopback interfaces are added without a header builder; everything else
/// is treated as Ethernet. Returns the number of interfaces added.
pub fn load_interfaces(host: &MemoryHost) -> nix::Result<usize> {
    let mut interfaces: Vec<SystemInterface> = Vec::new();

    for ifaddr in getifaddrs()? {
        let iface = entry(&mut interfaces, &ifaddr.interface_name);
        iface.up = ifaddr.flags.contains(InterfaceFlags::IFF_UP);
        iface.loopback = ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK);

        let Some(address) = ifaddr.address else {
            continue;
        };
        if let Some(link) = address.as_link_addr() {
            iface.hw_addr = link.addr().or(iface.hw_addr);
            continue;
        }
        if let Some(sin) = address.as_sockaddr_in() {
            let mask = ifaddr
                .netmask
                .as_ref()
                .and_then(|mask| mask.as_sockaddr_in())
                .map(|mask| mask.ip())
                .unwrap_or(Ipv4Addr::BROADCAST);
            match ipnet::ipv4_mask_to_prefix(mask).and_then(|len| Ipv4Net::new(sin.ip(), len)) {
                Ok(net) => iface.addresses.push(net),
                Err(e) => warn!(iface = %iface.name, mask = %mask, error = %e, "Skipping address"),
            }
        }
    }

    let mut added = 0;
    for iface in interfaces {
        let hw_addr = EthernetAddress(iface.hw_addr.unwrap_or_default());
        let result = if iface.loopback {
            host.add_device(&iface.name, hw_addr, None)
        } else {
            host.add_ethernet(&iface.name, hw_addr)
        };

        let id = match result {
            Ok(id) => id,
            Err(e) => {
                warn!(iface = %iface.name, error = %e, "Skipping interface");
                continue;
            }
        };
        for addr in &iface.addresses {
            host.add_address(id, *addr);
        }
        host.set_admin_state(id, iface.up);

        debug!(
            iface = %iface.name,
            up = iface.up,
            addresses = iface.addresses.len(),
            "Loaded system interface"
        );
        added += 1;
    }

    Ok(added)
}
