//! Host Controller Interface layer.
//!
//! - **Framing**: [`PacketType`], [`Frame`], [`AclHeader`]
//! - **Commands**: [`Command`] encoding into outbound frames
//! - **Events**: [`Event`] decoding of controller events
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        GAP / L2CAP / ATT                │
//! ├─────────────────────────────────────────┤
//! │              HCI                        │  ← This module
//! │   commands, events, ACL framing         │
//! ├─────────────────────────────────────────┤
//! │     Transport (UART, USB, VHCI)         │
//! └─────────────────────────────────────────┘
//! ```

mod command;
mod event;
mod packet;

pub use command::{AdvParams, AdvType, Command, Opcode};
pub use event::{Event, LeConnection, Role, code, status};
pub use packet::{AclHeader, BoundaryFlag, ConnHandle, Frame, PacketType};
