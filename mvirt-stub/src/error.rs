//! Error types for stub setup and device configuration.

use std::collections::TryReserveError;

use smoltcp::wire::EthernetAddress;
use thiserror::Error;

use crate::host::HostError;

/// Broad class of a [`StubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unresolvable uplink, or an unusable configuration value.
    Configuration,
    /// Endpoint table allocation or device registration failed.
    ResourceExhaustion,
    /// A hardware address change was refused.
    AddressAssignment,
}

/// Stub errors.
#[derive(Debug, Error)]
pub enum StubError {
    #[error("uplink device name is required")]
    MissingUplink,

    #[error("invalid stub count: {0} (must be at least 1)")]
    InvalidCount(usize),

    #[error("bad uplink device name: {0}")]
    UplinkNotFound(String),

    #[error("failed to allocate table for {count} stubs")]
    TableAllocation {
        count: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("failed to register stub #{index}: {source}")]
    Registration {
        index: usize,
        #[source]
        source: HostError,
    },

    #[error("invalid hardware address: {0}")]
    InvalidHardwareAddress(EthernetAddress),
}

impl StubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StubError::MissingUplink
            | StubError::InvalidCount(_)
            | StubError::UplinkNotFound(_) => ErrorKind::Configuration,
            StubError::TableAllocation { .. } | StubError::Registration { .. } => {
                ErrorKind::ResourceExhaustion
            }
            StubError::InvalidHardwareAddress(_) => ErrorKind::AddressAssignment,
        }
    }
}

pub type Result<T> = std::result::Result<T, StubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(StubError::MissingUplink.kind(), ErrorKind::Configuration);
        assert_eq!(StubError::InvalidCount(0).kind(), ErrorKind::Configuration);
        assert_eq!(
            StubError::UplinkNotFound("eth9".to_string()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            StubError::Registration {
                index: 2,
                source: HostError::TableFull,
            }
            .kind(),
            ErrorKind::ResourceExhaustion
        );
        assert_eq!(
            StubError::InvalidHardwareAddress(EthernetAddress::BROADCAST).kind(),
            ErrorKind::AddressAssignment
        );
    }

    #[test]
    fn test_error_display() {
        let err = StubError::UplinkNotFound("eth9".to_string());
        assert_eq!(err.to_string(), "bad uplink device name: eth9");

        let err = StubError::Registration {
            index: 3,
            source: HostError::NameInUse("stub3".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "failed to register stub #3: device name already in use: stub3"
        );
    }
}
