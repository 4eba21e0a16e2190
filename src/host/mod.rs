//! Host coordinator.
//!
//! [`Host`] turns one duplex transport into independent command, event and
//! data flows:
//!
//! ```text
//!   application threads
//!     │  start_advertising / send_data        ▲ next_event
//!     ▼                                       │
//! ┌──────────────┐                    ┌──────────────┐
//! │ outbound     │                    │ event queue  │
//! │ frame queue  │◄── ATT responses ──┤              │
//! └──────┬───────┘    reactive cmds   └──────▲───────┘
//!        │                                   │
//!   write loop (ble-host-tx)         read loop (ble-host-rx)
//!        │                            GAP · L2CAP · ATT
//!        ▼                                   │
//! ┌─────────────────────────────────────────────────────┐
//! │                     Transport                       │
//! └─────────────────────────────────────────────────────┘
//! ```

mod config;
#[cfg(feature = "async")]
mod events;
#[allow(clippy::module_inception)]
mod host;
mod read_loop;
mod stats;
mod write_loop;

#[cfg(test)]
mod tests;

pub use config::{HostConfig, HostConfigBuilder};
#[cfg(feature = "async")]
pub use events::EventStream;
pub use host::{Host, HostPhase, READ_LOOP_THREAD, WRITE_LOOP_THREAD};
pub use stats::{HostStats, StatsSnapshot};
