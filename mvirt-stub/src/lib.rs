//! Stub pseudo devices multiplexed over one physical uplink.
//!
//! A [`StubRegistry`] binds N virtual Ethernet devices ("stubs") to an
//! existing host device. Frames sent on a stub leave through the uplink;
//! frames received on the uplink are assigned to a device by destination
//! address ([`InboundClassifier`]). Header construction and neighbour
//! resolution are borrowed from the uplink.

pub mod classifier;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod header;
pub mod host;
pub mod neighbor;
pub mod registry;
pub mod uplink;

pub use classifier::{Classification, InboundClassifier, Match};
pub use config::{Delivery, StubConfig};
pub use endpoint::{Endpoint, TxStats};
pub use error::{ErrorKind, Result, StubError};
pub use frame::Frame;
pub use host::memory::MemoryHost;
pub use registry::StubRegistry;
pub use uplink::Uplink;
