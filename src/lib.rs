//! # ble-host
//!
//! Bluetooth Low Energy host coordinator.
//!
//! Owns the single byte stream to an HCI controller and splits it into
//! three logical channels:
//!
//! - **Commands**: GAP operations encoded as HCI commands and written in order
//! - **Events**: controller events driving the GAP state machine
//! - **Data**: ACL fragments reassembled into L2CAP SDUs and routed to ATT
//!
//! A read loop and a write loop run on dedicated threads. Application code
//! talks to both through bounded queues and never touches the transport
//! after [`Host::start`].
//!
//! ## Feature Flags
//!
//! - `async` (default): [`host::EventStream`] for tokio consumers
//! - `log`: forward `tracing` events to the `log` facade
//!
//! ## Modules
//!
//! - [`core`]: Traits, constants, and error types
//! - [`hci`]: Packet framing, commands, and events
//! - [`gap`]: Advertising configuration and the GAP state machine
//! - [`l2cap`]: SDU reassembly and ACL fragmentation
//! - [`att`]: Minimal attribute server and PDU helpers
//! - [`queue`]: Bounded blocking queue and thread tracking
//! - [`transport`]: Readiness types and an in-memory controller
//! - [`host`]: The coordinator itself
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use ble_host::prelude::*;
//!
//! let (transport, controller) = MemoryTransport::new();
//! controller.acknowledge_commands();
//!
//! let host = Host::new(transport, HostConfig::default()).unwrap();
//! host.start().unwrap();
//!
//! host.start_advertising(&AdvertisingConfig::with_name("sensor")).unwrap();
//! assert_eq!(
//!     host.next_event_timeout(Duration::from_secs(2)),
//!     Some(GapEvent::AdvertisingStarted)
//! );
//!
//! host.stop();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod att;
pub mod core;
pub mod gap;
pub mod hci;
pub mod host;
pub mod l2cap;
pub mod queue;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::att::AttServer;
    pub use crate::core::{AttributeServer, HostError, HostResult, Transport};
    pub use crate::gap::{AdvertisingConfig, GapEvent, GapState};
    pub use crate::hci::{ConnHandle, Event};
    pub use crate::host::{Host, HostConfig, HostConfigBuilder, HostPhase, StatsSnapshot};
    pub use crate::transport::{ControllerHandle, Interest, MemoryTransport, Readiness};

    #[cfg(feature = "async")]
    pub use crate::host::EventStream;
}

// Re-export commonly used items at crate root
pub use crate::core::{AttributeServer, HostError, HostResult, Transport};
pub use crate::host::{Host, HostConfig, HostConfigBuilder, HostPhase};
