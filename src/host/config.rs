//! Host configuration.

use std::time::Duration;

use crate::core::{
    DEFAULT_ACL_FRAGMENT_SIZE, DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_POLL_TIMEOUT,
    DEFAULT_READ_BUFFER_SIZE, DEFAULT_RESET_TIMEOUT, DEFAULT_SERVER_MTU,
    DEFAULT_TX_QUEUE_CAPACITY, HostError, HostResult, MAX_ACL_PAYLOAD,
};

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Transport poll timeout. Bounds how long either loop takes to notice
    /// cancellation.
    pub poll_timeout: Duration,

    /// How long `start` waits for the controller reset to complete.
    pub reset_timeout: Duration,

    /// Outbound frame queue depth.
    pub tx_queue_capacity: usize,

    /// Application event queue depth.
    pub event_queue_capacity: usize,

    /// Payload bytes per outbound ACL fragment (`1..=251`).
    pub acl_fragment_size: usize,

    /// ATT MTU offered by the default attribute server.
    pub server_mtu: u16,

    /// Read loop receive buffer size.
    pub read_buffer_size: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            tx_queue_capacity: DEFAULT_TX_QUEUE_CAPACITY,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            acl_fragment_size: DEFAULT_ACL_FRAGMENT_SIZE,
            server_mtu: DEFAULT_SERVER_MTU,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl HostConfig {
    /// Check the configuration for values the host cannot run with.
    pub fn validate(&self) -> HostResult<()> {
        if self.poll_timeout.is_zero() {
            return Err(HostError::Config("poll timeout must be non-zero".into()));
        }
        if self.reset_timeout.is_zero() {
            return Err(HostError::Config("reset timeout must be non-zero".into()));
        }
        if self.tx_queue_capacity == 0 || self.event_queue_capacity == 0 {
            return Err(HostError::Config("queue capacity must be non-zero".into()));
        }
        if !(1..=MAX_ACL_PAYLOAD).contains(&self.acl_fragment_size) {
            return Err(HostError::Config(format!(
                "ACL fragment size {} outside 1..={MAX_ACL_PAYLOAD}",
                self.acl_fragment_size
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(HostError::Config("read buffer size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`HostConfig`].
#[derive(Debug)]
pub struct HostConfigBuilder {
    config: HostConfig,
}

impl HostConfigBuilder {
    /// Create a builder starting from the defaults.
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
        }
    }

    /// Set the transport poll timeout.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    /// Set the reset handshake timeout.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    /// Set the outbound queue depth.
    pub fn tx_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.tx_queue_capacity = capacity;
        self
    }

    /// Set the event queue depth.
    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.event_queue_capacity = capacity;
        self
    }

    /// Set the per-fragment ACL payload size.
    pub fn acl_fragment_size(mut self, size: usize) -> Self {
        self.config.acl_fragment_size = size;
        self
    }

    /// Set the ATT MTU offered by the default server.
    pub fn server_mtu(mut self, mtu: u16) -> Self {
        self.config.server_mtu = mtu;
        self
    }

    /// Set the read loop receive buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> HostResult<HostConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for HostConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.reset_timeout, Duration::from_millis(2000));
        assert_eq!(config.tx_queue_capacity, 16);
        assert_eq!(config.acl_fragment_size, 251);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = HostConfigBuilder::new()
            .poll_timeout(Duration::from_millis(10))
            .tx_queue_capacity(4)
            .acl_fragment_size(27)
            .server_mtu(64)
            .build()
            .unwrap();
        assert_eq!(config.poll_timeout, Duration::from_millis(10));
        assert_eq!(config.tx_queue_capacity, 4);
        assert_eq!(config.acl_fragment_size, 27);
        assert_eq!(config.server_mtu, 64);
        assert_eq!(config.event_queue_capacity, 32);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(matches!(
            HostConfigBuilder::new().acl_fragment_size(0).build(),
            Err(HostError::Config(_))
        ));
        assert!(HostConfigBuilder::new().acl_fragment_size(252).build().is_err());
        assert!(HostConfigBuilder::new().tx_queue_capacity(0).build().is_err());
        assert!(HostConfigBuilder::new().poll_timeout(Duration::ZERO).build().is_err());
    }
}
