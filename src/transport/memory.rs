//! In-process transport backed by two packet FIFOs.
//!
//! [`MemoryTransport`] is the host side; [`ControllerHandle`] plays the
//! controller. Packets keep their boundaries: each `read` yields exactly one
//! injected packet, and each `write` records exactly one frame.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use super::{Interest, Readiness};
use crate::core::{HCI_COMMAND_PKT, Transport};
use crate::hci::{Event, Opcode, status};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

struct Pipe {
    /// Controller to host.
    inbound: VecDeque<Vec<u8>>,
    /// Host to controller.
    written: Vec<Vec<u8>>,
    writable: bool,
    responder: Option<Responder>,
}

struct Shared {
    pipe: Mutex<Pipe>,
    changed: Condvar,
}

impl Shared {
    fn notify(&self) {
        self.changed.notify_all();
    }
}

/// Host side of an in-memory controller link.
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Controller side of a [`MemoryTransport`].
#[derive(Clone)]
pub struct ControllerHandle {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// Create a linked transport and controller handle.
    ///
    /// The transport starts writable with nothing to read.
    pub fn new() -> (Self, ControllerHandle) {
        let shared = Arc::new(Shared {
            pipe: Mutex::new(Pipe {
                inbound: VecDeque::new(),
                written: Vec::new(),
                writable: true,
                responder: None,
            }),
            changed: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ControllerHandle { shared },
        )
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pipe = self.shared.pipe.lock();
        f.debug_struct("MemoryTransport")
            .field("inbound", &pipe.inbound.len())
            .field("written", &pipe.written.len())
            .field("writable", &pipe.writable)
            .finish()
    }
}

impl Transport for MemoryTransport {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.shared.pipe.lock();
        let Some(packet) = pipe.inbound.pop_front() else {
            return Err(io::ErrorKind::WouldBlock.into());
        };
        if packet.len() > buf.len() {
            warn!(len = packet.len(), buf = buf.len(), "receive buffer too small, packet discarded");
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "packet larger than receive buffer",
            ));
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = self.shared.pipe.lock();
        if !pipe.writable {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        trace!(len = buf.len(), "controller received frame");
        pipe.written.push(buf.to_vec());

        if let Some(mut responder) = pipe.responder.take() {
            let replies = responder(buf);
            pipe.inbound.extend(replies);
            pipe.responder = Some(responder);
        }
        drop(pipe);
        self.shared.notify();
        Ok(buf.len())
    }

    fn poll(&self, interest: Interest, timeout: Duration) -> io::Result<Readiness> {
        let deadline = Instant::now() + timeout;
        let mut pipe = self.shared.pipe.lock();
        loop {
            let ready = Readiness {
                readable: interest.readable && !pipe.inbound.is_empty(),
                writable: interest.writable && pipe.writable,
            };
            if ready.is_ready() {
                return Ok(ready);
            }
            if self.shared.changed.wait_until(&mut pipe, deadline).timed_out() {
                return Ok(Readiness {
                    readable: interest.readable && !pipe.inbound.is_empty(),
                    writable: interest.writable && pipe.writable,
                });
            }
        }
    }
}

impl ControllerHandle {
    /// Queue a raw packet (indicator byte first) for the host to read.
    pub fn inject(&self, packet: impl Into<Vec<u8>>) {
        self.shared.pipe.lock().inbound.push_back(packet.into());
        self.shared.notify();
    }

    /// Queue an encoded event for the host to read.
    pub fn inject_event(&self, event: &Event) {
        self.inject(event.to_packet());
    }

    /// Packets queued but not yet read by the host.
    pub fn pending_inbound(&self) -> usize {
        self.shared.pipe.lock().inbound.len()
    }

    /// Copy of every frame the host has written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.pipe.lock().written.clone()
    }

    /// Take the frames written so far, clearing the record.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.shared.pipe.lock().written)
    }

    /// Block until at least `count` frames have been written or `timeout`
    /// elapses. Returns whether the count was reached.
    pub fn wait_for_written(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pipe = self.shared.pipe.lock();
        while pipe.written.len() < count {
            if self.shared.changed.wait_until(&mut pipe, deadline).timed_out() {
                return pipe.written.len() >= count;
            }
        }
        true
    }

    /// Block until the host has read every injected packet or `timeout`
    /// elapses.
    pub fn wait_for_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_inbound() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Accept or refuse writes. A refusing transport never polls writable.
    pub fn set_writable(&self, writable: bool) {
        self.shared.pipe.lock().writable = writable;
        self.shared.notify();
    }

    /// React to every written frame with zero or more injected packets.
    ///
    /// The responder runs inside `write`, before the host sees the write
    /// complete.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.shared.pipe.lock().responder = Some(Box::new(responder));
    }

    /// Answer every HCI command with a successful Command Complete.
    pub fn acknowledge_commands(&self) {
        self.set_responder(|frame| match frame {
            [HCI_COMMAND_PKT, lo, hi, ..] => vec![
                Event::CommandComplete {
                    num_hci_packets: 1,
                    opcode: Opcode::from_raw(u16::from_le_bytes([*lo, *hi])),
                    status: status::SUCCESS,
                }
                .to_packet(),
            ],
            _ => Vec::new(),
        });
    }
}

impl fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerHandle").finish_non_exhaustive()
    }
}
