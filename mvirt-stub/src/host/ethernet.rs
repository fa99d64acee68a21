//! Ethernet header construction for physical uplinks.

use smoltcp::wire::{
    ETHERNET_HEADER_LEN, EthernetAddress, EthernetFrame, EthernetProtocol, EthernetRepr,
};

use super::{DeviceId, HeaderError, HeaderOps, LinkHeader};
use crate::frame::Frame;

/// 802.3 frames carry the payload length where Ethernet II carries the type.
const ETH_P_802_3: u16 = 0x0001;
const ETH_P_802_2: u16 = 0x0004;

const UNRESOLVED: EthernetAddress = EthernetAddress([0; 6]);

/// Ethernet header builder bound to one device.
#[derive(Debug, Clone)]
pub struct EthernetHeaderOps {
    dev: DeviceId,
    hw_addr: EthernetAddress,
}

impl EthernetHeaderOps {
    pub fn new(dev: DeviceId, hw_addr: EthernetAddress) -> Self {
        Self { dev, hw_addr }
    }

    fn check_owner(&self, frame: &Frame) -> Result<(), HeaderError> {
        if frame.dev() != self.dev {
            return Err(HeaderError::ForeignDevice {
                expected: self.dev,
                actual: frame.dev(),
            });
        }
        Ok(())
    }
}

impl HeaderOps for EthernetHeaderOps {
    fn create(&self, frame: &mut Frame, header: &LinkHeader) -> Result<usize, HeaderError> {
        self.check_owner(frame)?;

        let ethertype = match header.ethertype {
            EthernetProtocol::Unknown(ETH_P_802_3) | EthernetProtocol::Unknown(ETH_P_802_2) => {
                let len = u16::try_from(header.len)
                    .map_err(|_| HeaderError::LengthOverflow(header.len))?;
                EthernetProtocol::Unknown(len)
            }
            other => other,
        };
        let repr = EthernetRepr {
            src_addr: header.src.unwrap_or(self.hw_addr),
            dst_addr: header.dst.unwrap_or(UNRESOLVED),
            ethertype,
        };

        let mut eth = EthernetFrame::new_unchecked(frame.push_front(ETHERNET_HEADER_LEN));
        repr.emit(&mut eth);

        if header.dst.is_none() {
            return Err(HeaderError::Unresolved);
        }
        Ok(ETHERNET_HEADER_LEN)
    }

    fn rebuild(&self, frame: &mut Frame) -> Result<(), HeaderError> {
        self.check_owner(frame)?;

        let eth = EthernetFrame::new_checked(frame.data()).map_err(|_| HeaderError::Truncated)?;
        if eth.dst_addr() == UNRESOLVED {
            return Err(HeaderError::Unresolved);
        }
        Ok(())
    }
}
