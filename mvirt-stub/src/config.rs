//! Startup configuration for a stub registry.

use crate::error::{Result, StubError};

/// Default number of stubs created on the uplink.
pub const DEFAULT_STUB_COUNT: usize = 1;

/// Default name prefix; stubs are named `stub0`, `stub1`, ...
pub const DEFAULT_NAME_PREFIX: &str = "stub";

/// What the classifier does with a frame once an owner has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Delivery {
    /// Drop every classified frame after recording its owner.
    #[default]
    Discard,
    /// Hand frames with an owner to the host's receive path.
    Forward,
}

/// Stub registry configuration.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Name of the device all stubs are bound to.
    pub uplink: String,
    /// Number of stubs to create.
    pub count: usize,
    /// Emit per-frame trace messages.
    pub debug: bool,
    /// Stub name prefix.
    pub name_prefix: String,
    /// Post-classification delivery policy.
    pub delivery: Delivery,
}

impl StubConfig {
    pub fn new(uplink: impl Into<String>) -> Self {
        Self {
            uplink: uplink.into(),
            count: DEFAULT_STUB_COUNT,
            debug: false,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            delivery: Delivery::default(),
        }
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Check values that do not depend on the host.
    pub fn validate(&self) -> Result<()> {
        if self.uplink.is_empty() {
            return Err(StubError::MissingUplink);
        }
        if self.count == 0 {
            return Err(StubError::InvalidCount(self.count));
        }
        Ok(())
    }

    /// Name of the stub at `index`.
    pub fn stub_name(&self, index: usize) -> String {
        format!("{}{}", self.name_prefix, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = StubConfig::new("eth0");
        assert_eq!(config.uplink, "eth0");
        assert_eq!(config.count, 1);
        assert!(!config.debug);
        assert_eq!(config.delivery, Delivery::Discard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_uplink() {
        let err = StubConfig::new("").validate().unwrap_err();
        assert!(matches!(err, StubError::MissingUplink));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_zero_count() {
        let err = StubConfig::new("eth0").count(0).validate().unwrap_err();
        assert!(matches!(err, StubError::InvalidCount(0)));
    }

    #[test]
    fn test_stub_name() {
        let config = StubConfig::new("eth0").name_prefix("veth");
        assert_eq!(config.stub_name(0), "veth0");
        assert_eq!(config.stub_name(12), "veth12");
    }
}
