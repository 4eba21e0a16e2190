//! The host coordinator: lifecycle and application API.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::config::HostConfig;
use super::stats::{HostStats, StatsSnapshot};
use super::{read_loop, write_loop};
use crate::att::{self, AttServer};
use crate::core::{
    AttributeServer, GapError, HCI_EVENT_PKT, HostError, HostResult, L2CAP_CID_ATT, Transport,
};
use crate::gap::{AdvertisingConfig, Gap, GapEvent, GapState};
use crate::hci::{Command, ConnHandle, Event, Frame, Opcode, status};
use crate::l2cap;
use crate::queue::{PacketQueue, TaskTracker};
use crate::transport::Interest;

/// Read loop thread name.
pub const READ_LOOP_THREAD: &str = "ble-host-rx";

/// Write loop thread name.
pub const WRITE_LOOP_THREAD: &str = "ble-host-tx";

/// Lifecycle phase of a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostPhase {
    /// Constructed, loops not started.
    Created = 0,
    /// Both loops running.
    Running = 1,
    /// `stop` in progress.
    Stopping = 2,
    /// Loops joined, queues closed.
    Stopped = 3,
}

impl HostPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// State shared by the application API and both loops.
pub(crate) struct Shared<T> {
    pub(crate) transport: T,
    pub(crate) config: HostConfig,
    /// Outbound frames, drained by the write loop.
    pub(crate) tx: PacketQueue<Frame>,
    /// Application events, filled by the read loop.
    pub(crate) events: Arc<PacketQueue<GapEvent>>,
    /// Wakes async event consumers.
    #[cfg(feature = "async")]
    pub(crate) event_ready: Arc<tokio::sync::Notify>,
    pub(crate) gap: Mutex<Gap>,
    pub(crate) cancel: AtomicBool,
    pub(crate) stats: HostStats,
}

impl<T> Shared<T> {
    /// Wake async consumers after events were queued or the queue closed.
    pub(crate) fn wake_event_waiters(&self) {
        #[cfg(feature = "async")]
        self.event_ready.notify_waiters();
    }

    fn close_queues(&self) {
        self.tx.close();
        self.events.close();
        self.wake_event_waiters();
    }
}

enum Lifecycle<A> {
    Created(A),
    Running(TaskTracker),
    Stopped,
}

/// BLE host coordinator.
///
/// Owns the transport, runs a read loop and a write loop on two background
/// threads, and exposes a thread-safe API. Share it between threads with
/// `Arc<Host<_>>`.
///
/// # Example
///
/// ```ignore
/// use ble_host::prelude::*;
///
/// let host = Host::new(transport, HostConfig::default())?;
/// host.start()?;
/// host.start_advertising(&AdvertisingConfig::with_name("sensor"))?;
///
/// while let Some(event) = host.next_event() {
///     match event {
///         GapEvent::Connected(conn) => host.notify(conn.handle, 0x0003, b"hi")?,
///         GapEvent::Disconnected { .. } => break,
///         _ => {}
///     }
/// }
/// host.stop();
/// ```
pub struct Host<T: Transport, A: AttributeServer = AttServer> {
    pub(super) shared: Arc<Shared<T>>,
    lifecycle: Mutex<Lifecycle<A>>,
    phase: AtomicU8,
}

impl<T: Transport> Host<T, AttServer> {
    /// Create a host with the default attribute server.
    pub fn new(transport: T, config: HostConfig) -> HostResult<Self> {
        let att = AttServer::new(config.server_mtu);
        Self::with_attribute_server(transport, config, att)
    }
}

impl<T: Transport, A: AttributeServer> Host<T, A> {
    /// Create a host dispatching ATT traffic to `att`.
    pub fn with_attribute_server(transport: T, config: HostConfig, att: A) -> HostResult<Self> {
        config.validate()?;
        let shared = Shared {
            transport,
            tx: PacketQueue::new(config.tx_queue_capacity),
            events: Arc::new(PacketQueue::new(config.event_queue_capacity)),
            #[cfg(feature = "async")]
            event_ready: Arc::new(tokio::sync::Notify::new()),
            gap: Mutex::new(Gap::new()),
            cancel: AtomicBool::new(false),
            stats: HostStats::default(),
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
            lifecycle: Mutex::new(Lifecycle::Created(att)),
            phase: AtomicU8::new(HostPhase::Created as u8),
        })
    }

    /// Reset the controller and start both loops.
    ///
    /// Fails with [`HostError::ResetTimeout`] or [`HostError::ResetFailed`]
    /// if the handshake does not complete, leaving the host in `Created` so
    /// the call can be retried.
    pub fn start(&self) -> HostResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        let att = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Created(att) => att,
            running @ Lifecycle::Running(_) => {
                *lifecycle = running;
                return Err(HostError::AlreadyRunning);
            }
            Lifecycle::Stopped => return Err(HostError::Stopped),
        };

        if let Err(err) = self.reset_controller() {
            warn!(%err, "controller reset failed");
            *lifecycle = Lifecycle::Created(att);
            return Err(err);
        }

        self.shared.cancel.store(false, Ordering::Release);
        let tracker = TaskTracker::new();
        if let Err(err) = self.spawn_loops(&tracker, att) {
            warn!(%err, "failed to spawn host loops");
            self.shutdown(&tracker);
            self.set_phase(HostPhase::Stopped);
            return Err(err.into());
        }

        *lifecycle = Lifecycle::Running(tracker);
        self.set_phase(HostPhase::Running);
        info!("host started");
        Ok(())
    }

    fn spawn_loops(&self, tracker: &TaskTracker, att: A) -> io::Result<()> {
        let shared = Arc::clone(&self.shared);
        tracker.spawn(READ_LOOP_THREAD, move || read_loop::run(shared, att))?;
        let shared = Arc::clone(&self.shared);
        tracker.spawn(WRITE_LOOP_THREAD, move || write_loop::run(shared))
    }

    /// Stop both loops and close the queues.
    ///
    /// Safe to call from any thread, any number of times. Events already
    /// queued stay readable until drained.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(tracker) => {
                self.set_phase(HostPhase::Stopping);
                debug!("stopping host");
                self.shutdown(&tracker);
                self.set_phase(HostPhase::Stopped);
                info!("host stopped");
            }
            Lifecycle::Created(_) => {
                self.shared.close_queues();
                self.set_phase(HostPhase::Stopped);
                debug!("host stopped before start");
            }
            Lifecycle::Stopped => {}
        }
    }

    fn shutdown(&self, tracker: &TaskTracker) {
        self.shared.cancel.store(true, Ordering::Release);
        self.shared.close_queues();
        tracker.wait();
    }

    /// Send HCI_Reset straight to the transport and wait for its Command
    /// Complete. Runs before the loops exist, so nothing else touches the
    /// transport.
    fn reset_controller(&self) -> HostResult<()> {
        let config = &self.shared.config;
        let deadline = Instant::now() + config.reset_timeout;

        let frame = Command::Reset.encode()?;
        loop {
            let wait = remaining(deadline).ok_or(HostError::ResetTimeout(config.reset_timeout))?;
            let ready = self
                .shared
                .transport
                .poll(Interest::WRITABLE, wait.min(config.poll_timeout))?;
            if !ready.writable {
                continue;
            }
            match self.shared.transport.write(frame.as_bytes()) {
                Ok(n) if n == frame.len() => break,
                Ok(n) => {
                    warn!(written = n, len = frame.len(), "partial reset write");
                    break;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err.into()),
            }
        }
        debug!("reset sent");

        let mut buf = vec![0u8; config.read_buffer_size];
        loop {
            let wait = remaining(deadline).ok_or(HostError::ResetTimeout(config.reset_timeout))?;
            let ready = self
                .shared
                .transport
                .poll(Interest::READABLE, wait.min(config.poll_timeout))?;
            if !ready.readable {
                continue;
            }
            let len = match self.shared.transport.read(&mut buf) {
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => {
                    debug!(%err, "read failed during reset");
                    continue;
                }
            };
            let packet = &buf[..len];
            if packet.first() != Some(&HCI_EVENT_PKT) {
                trace!(len, "discarding non-event packet during reset");
                continue;
            }

            let event = match Event::decode(&packet[1..]) {
                Ok(event) => event,
                Err(err) => {
                    debug!(%err, "discarding malformed event during reset");
                    continue;
                }
            };
            match event {
                Event::CommandComplete {
                    opcode, status: code, ..
                } if opcode == Opcode::RESET => {
                    if code != status::SUCCESS {
                        return Err(HostError::ResetFailed(code));
                    }
                    self.shared.gap.lock().handle_event(&event);
                    debug!("controller reset complete");
                    return Ok(());
                }
                Event::CommandStatus {
                    opcode, status: code, ..
                } if opcode == Opcode::RESET && code != status::SUCCESS => {
                    return Err(HostError::ResetFailed(code));
                }
                other => trace!(event = ?other, "discarding event during reset"),
            }
        }
    }

    fn set_phase(&self, phase: HostPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> HostPhase {
        HostPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Check if both loops are running.
    pub fn is_running(&self) -> bool {
        self.phase() == HostPhase::Running
    }

    fn ensure_running(&self) -> HostResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(HostError::NotRunning)
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Wait for the next application event.
    ///
    /// Returns `None` once the host is stopped and every queued event has
    /// been taken.
    pub fn next_event(&self) -> Option<GapEvent> {
        self.shared.events.recv()
    }

    /// Take the next application event if one is queued.
    pub fn try_next_event(&self) -> Option<GapEvent> {
        self.shared.events.try_recv().ok()
    }

    /// Wait at most `timeout` for the next application event.
    pub fn next_event_timeout(&self, timeout: Duration) -> Option<GapEvent> {
        self.shared.events.recv_timeout(timeout).ok()
    }

    /// Async view of the event queue.
    #[cfg(feature = "async")]
    pub fn event_stream(&self) -> super::EventStream {
        super::EventStream::new(
            Arc::clone(&self.shared.events),
            Arc::clone(&self.shared.event_ready),
        )
    }

    // =========================================================================
    // GAP
    // =========================================================================

    /// Start advertising with `config`.
    pub fn start_advertising(&self, config: &AdvertisingConfig) -> HostResult<()> {
        self.drive_gap(|gap| gap.start_advertising(config))
    }

    /// Stop advertising.
    pub fn stop_advertising(&self) -> HostResult<()> {
        self.drive_gap(Gap::stop_advertising)
    }

    /// Terminate the connection `handle` with HCI `reason`.
    pub fn disconnect(&self, handle: ConnHandle, reason: u8) -> HostResult<()> {
        self.drive_gap(|gap| gap.disconnect(handle, reason))
    }

    /// Apply `op` under the GAP lock, then enqueue the commands it produced
    /// once the lock is released.
    ///
    /// If a concurrent `stop` closes the queue first, this returns
    /// [`HostError::NotRunning`] with the GAP transition already applied and
    /// its commands unsent.
    fn drive_gap<F>(&self, op: F) -> HostResult<()>
    where
        F: FnOnce(&mut Gap) -> Result<(), GapError>,
    {
        self.ensure_running()?;
        let commands: Vec<Command> = {
            let mut gap = self.shared.gap.lock();
            op(&mut *gap)?;
            std::iter::from_fn(|| gap.next_command()).collect()
        };
        for command in commands {
            let frame = command.encode()?;
            trace!(opcode = ?command.opcode(), "queueing command");
            self.shared
                .tx
                .send(frame)
                .map_err(|_| HostError::NotRunning)?;
        }
        Ok(())
    }

    /// Current link state.
    pub fn state(&self) -> GapState {
        self.shared.gap.lock().state()
    }

    /// Handle of the current connection.
    pub fn connection_handle(&self) -> Option<ConnHandle> {
        self.shared.gap.lock().connection_handle()
    }

    // =========================================================================
    // Data
    // =========================================================================

    /// Send `payload` as one L2CAP SDU on `channel`.
    ///
    /// Blocks until the outbound queue has room for every fragment, which
    /// are then queued back to back. An SDU with more fragments than the
    /// queue capacity is queued as room frees up. An empty payload sends
    /// nothing.
    pub fn send_data(&self, handle: ConnHandle, channel: u16, payload: &[u8]) -> HostResult<()> {
        self.ensure_running()?;
        let fragments = l2cap::fragments(
            handle,
            channel,
            payload,
            self.shared.config.acl_fragment_size,
        )?;

        self.shared
            .tx
            .send_all(fragments)
            .map_err(|_| HostError::NotRunning)?;
        trace!(%handle, channel, len = payload.len(), "SDU queued");
        Ok(())
    }

    /// Send a Handle Value Notification.
    pub fn notify(&self, handle: ConnHandle, attr_handle: u16, value: &[u8]) -> HostResult<()> {
        self.send_data(handle, L2CAP_CID_ATT, &att::notification(attr_handle, value))
    }

    /// Send a Handle Value Indication.
    pub fn indicate(&self, handle: ConnHandle, attr_handle: u16, value: &[u8]) -> HostResult<()> {
        self.send_data(handle, L2CAP_CID_ATT, &att::indication(attr_handle, value))
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.shared.config
    }

    /// Snapshot of the loop counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Log phase, link state, queue depths and counters.
    pub fn log_status(&self) {
        let s = self.stats();
        info!(
            phase = ?self.phase(),
            state = ?self.state(),
            tx_queued = self.shared.tx.len(),
            events_queued = self.shared.events.len(),
            packets_read = s.packets_read,
            frames_written = s.frames_written,
            decode_errors = s.decode_errors,
            ignored = s.ignored_packets,
            partial_writes = s.partial_writes,
            write_errors = s.write_errors,
            dropped_commands = s.dropped_commands,
            dropped_events = s.dropped_events,
            dropped_att = s.dropped_att_responses,
            "host status"
        );
    }
}

fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|d| !d.is_zero())
}

impl<T: Transport, A: AttributeServer> Drop for Host<T, A> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: Transport, A: AttributeServer> fmt::Debug for Host<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("phase", &self.phase())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
