//! Collaborator traits for the BLE host.
//!
//! The host never talks to hardware or to an attribute database directly.
//! It drives a [`Transport`] for bytes and hands ATT requests to an
//! [`AttributeServer`].

use std::io;
use std::time::Duration;

use crate::hci::ConnHandle;
use crate::transport::{Interest, Readiness};

/// Byte-oriented link to the controller (UART, USB, VHCI, socket).
///
/// Both host loops share one transport, so every method takes `&self`.
/// Implementations handle their own interior locking.
///
/// # Requirements
///
/// - `read` and `write` MUST NOT block; "nothing now" is
///   [`io::ErrorKind::WouldBlock`]
/// - `read` returns exactly one HCI packet, indicator byte first
/// - `poll` MUST return within `timeout`
pub trait Transport: Send + Sync + 'static {
    /// Read one packet into `buf`, returning its length.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one frame, returning the number of bytes accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for any of the requested conditions.
    fn poll(&self, interest: Interest, timeout: Duration) -> io::Result<Readiness>;
}

/// Attribute protocol server.
///
/// Owned by the read loop; only that thread ever calls it.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// impl AttributeServer for Echo {
///     fn handle_pdu(&mut self, _: ConnHandle, req: &[u8], rsp: &mut [u8]) -> Option<usize> {
///         rsp[..req.len()].copy_from_slice(req);
///         Some(req.len())
///     }
/// }
/// ```
pub trait AttributeServer: Send + 'static {
    /// Handle one request PDU from `handle`.
    ///
    /// Writes a response into `response` and returns its length, or
    /// returns `None` when the PDU needs no answer.
    fn handle_pdu(&mut self, handle: ConnHandle, request: &[u8], response: &mut [u8])
    -> Option<usize>;

    /// Called when a link goes away so per-connection state can be dropped.
    fn on_disconnect(&mut self, handle: ConnHandle) {
        let _ = handle;
    }
}
