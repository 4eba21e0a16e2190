//! Generic Access Profile: advertising and the connection state machine.
//!
//! [`Gap`] is a pure state machine. It consumes decoded [`Event`](crate::hci::Event)s
//! and API requests, and exposes two FIFOs the host drains: HCI commands for
//! the controller and [`GapEvent`]s for the application.

mod advertising;
mod state;

pub use advertising::{AdvertisingConfig, MAX_ADV_INTERVAL, MIN_ADV_INTERVAL};
pub use state::{Gap, GapEvent, GapState};
