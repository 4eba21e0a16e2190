//! Transport layer.
//!
//! The host reaches the controller through the [`Transport`](crate::core::Transport)
//! trait. This module holds the poll vocabulary shared by every transport and
//! an in-process [`MemoryTransport`] that stands in for a controller.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Host read / write loops         │
//! ├─────────────────────────────────────────┤
//! │            Transport                    │  ← This module
//! │   read, write, poll(interest, timeout)  │
//! ├─────────────────────────────────────────┤
//! │     Controller (UART, USB, VHCI)        │
//! └─────────────────────────────────────────┘
//! ```

mod memory;

pub use memory::{ControllerHandle, MemoryTransport};

/// Conditions a poll waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    /// Wait for a packet to read.
    pub readable: bool,
    /// Wait for room to write.
    pub writable: bool,
}

impl Interest {
    /// Readable only.
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };

    /// Writable only.
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
    };

    /// Either condition.
    pub const BOTH: Self = Self {
        readable: true,
        writable: true,
    };
}

/// Conditions reported by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// A packet can be read.
    pub readable: bool,
    /// A frame can be written.
    pub writable: bool,
}

impl Readiness {
    /// Check if any condition is set.
    pub fn is_ready(&self) -> bool {
        self.readable || self.writable
    }
}
