//! Stub registry: the set of stubs bound to one uplink.
//!
//! Stubs are created in bulk when the registry is initialized and removed
//! in bulk when it shuts down. Initialization is all-or-nothing: if any
//! stub fails to register, the ones already registered are removed again
//! in reverse order before the error is returned.

use std::sync::Arc;

use smoltcp::wire::EthernetAddress;
use tracing::{debug, info, warn};

use crate::classifier::InboundClassifier;
use crate::config::StubConfig;
use crate::endpoint::{Endpoint, random_hw_addr};
use crate::error::{Result, StubError};
use crate::host::{
    DeviceDirectory, DeviceId, DeviceRegistrar, HostStack, NetDeviceOps, PacketTransport,
};
use crate::uplink::Uplink;

/// A stub and the id the host registered it under.
struct Registered {
    id: DeviceId,
    endpoint: Arc<Endpoint>,
}

/// Stubs bound to a single uplink.
pub struct StubRegistry<H: HostStack + 'static> {
    host: Arc<H>,
    config: StubConfig,
    uplink: Arc<Uplink>,
    stubs: Vec<Registered>,
}

impl<H: HostStack + 'static> StubRegistry<H> {
    /// Resolve the uplink and register `config.count` stubs on it.
    pub fn initialize(config: StubConfig, host: Arc<H>) -> Result<Self> {
        config.validate()?;

        let link = host
            .link_by_name(&config.uplink)
            .ok_or_else(|| StubError::UplinkNotFound(config.uplink.clone()))?;
        let transport: Arc<dyn PacketTransport> = host.clone();
        let uplink = Arc::new(Uplink::new(link, transport));

        let mut stubs = Vec::new();
        stubs
            .try_reserve_exact(config.count)
            .map_err(|source| StubError::TableAllocation {
                count: config.count,
                source,
            })?;

        for index in 0..config.count {
            match Self::create_one(&config, &*host, &uplink, &stubs, index) {
                Ok(stub) => stubs.push(stub),
                Err(e) => {
                    warn!(index, error = %e, "Stub setup failed, rolling back");
                    Self::rollback(&*host, &mut stubs);
                    return Err(e);
                }
            }
        }

        info!(
            count = config.count,
            uplink = %uplink.name(),
            "Stubs registered on uplink"
        );

        Ok(Self {
            host,
            config,
            uplink,
            stubs,
        })
    }

    fn create_one(
        config: &StubConfig,
        host: &H,
        uplink: &Arc<Uplink>,
        created: &[Registered],
        index: usize,
    ) -> Result<Registered> {
        let hw_addr = unique_hw_addr(created);
        let endpoint = Arc::new(Endpoint::new(
            index,
            config.stub_name(index),
            hw_addr,
            Arc::clone(uplink),
            config.debug,
        ));

        let id = host
            .register(endpoint.clone())
            .map_err(|source| StubError::Registration { index, source })?;

        debug!(%id, stub = %endpoint.name(), mac = %hw_addr, "Stub registered");
        Ok(Registered { id, endpoint })
    }

    /// Unregister partially created stubs, newest first.
    fn rollback(host: &H, created: &mut Vec<Registered>) {
        while let Some(stub) = created.pop() {
            debug!(id = %stub.id, stub = %stub.endpoint.name(), "Rolling back stub");
            host.unregister(stub.id);
        }
    }

    /// Unregister every stub in index order.
    fn teardown(&mut self) {
        for stub in self.stubs.drain(..) {
            debug!(id = %stub.id, stub = %stub.endpoint.name(), "Unregistering stub");
            self.host.unregister(stub.id);
        }
    }

    /// Remove every stub from the host.
    pub fn shutdown(mut self) {
        let count = self.stubs.len();
        self.teardown();
        info!(count, uplink = %self.uplink.name(), "Stubs unregistered");
    }

    pub fn config(&self) -> &StubConfig {
        &self.config
    }

    pub fn uplink(&self) -> &Arc<Uplink> {
        &self.uplink
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    pub fn endpoint(&self, index: usize) -> Option<&Arc<Endpoint>> {
        self.stubs.get(index).map(|stub| &stub.endpoint)
    }

    /// Host id of the stub at `index`.
    pub fn device_id(&self, index: usize) -> Option<DeviceId> {
        self.stubs.get(index).map(|stub| stub.id)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.stubs.iter().map(|stub| &stub.endpoint)
    }

    /// Classifier for frames arriving on this registry's uplink.
    pub fn classifier(&self) -> InboundClassifier<H> {
        InboundClassifier::new(Arc::clone(&self.host), self.config.delivery, self.config.debug)
    }
}

impl<H: HostStack + 'static> Drop for StubRegistry<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Random address not used by any stub created so far.
fn unique_hw_addr(created: &[Registered]) -> EthernetAddress {
    loop {
        let candidate = random_hw_addr();
        if !created.iter().any(|stub| stub.endpoint.hw_addr() == candidate) {
            return candidate;
        }
    }
}
