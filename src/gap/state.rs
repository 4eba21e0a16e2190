//! Connection state machine.
//!
//! Consumes decoded controller events, tracks the link, produces the HCI
//! commands that drive advertising and disconnection, and surfaces
//! application events. The machine performs no I/O: callers drain
//! [`Gap::next_command`] and [`Gap::next_event`] after every mutation.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::advertising::AdvertisingConfig;
use crate::core::GapError;
use crate::hci::{Command, ConnHandle, Event, LeConnection, Opcode, status};

/// Link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapState {
    /// Neither advertising nor connected.
    #[default]
    Idle,
    /// Advertising requested or active.
    Advertising,
    /// Connected to a peer.
    Connected,
    /// Disconnect requested, waiting for the controller.
    Disconnecting,
}

/// Application-visible events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapEvent {
    /// Controller confirmed advertising is on.
    AdvertisingStarted,
    /// Advertising ended (stopped, or timed out).
    AdvertisingStopped,
    /// A peer connected.
    Connected(LeConnection),
    /// A connection attempt failed.
    ConnectionFailed {
        /// HCI status code.
        status: u8,
    },
    /// The connection ended.
    Disconnected {
        /// Handle of the ended connection.
        handle: ConnHandle,
        /// HCI reason code.
        reason: u8,
    },
    /// The controller rejected a command.
    CommandFailed {
        /// Rejected command.
        opcode: Opcode,
        /// HCI status code.
        status: u8,
    },
}

/// GAP peripheral state machine.
#[derive(Debug, Default)]
pub struct Gap {
    state: GapState,
    connection: Option<LeConnection>,
    /// Active advertising configuration, kept for restart on disconnect.
    advertising: Option<AdvertisingConfig>,
    /// Outstanding advertise-enable commands, oldest first.
    adv_enables: VecDeque<bool>,
    commands: VecDeque<Command>,
    events: VecDeque<GapEvent>,
}

impl Gap {
    /// Create an idle state machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current link state.
    pub fn state(&self) -> GapState {
        self.state
    }

    /// Handle of the current connection.
    pub fn connection_handle(&self) -> Option<ConnHandle> {
        self.connection.map(|c| c.handle)
    }

    /// Parameters of the current connection.
    pub fn connection(&self) -> Option<&LeConnection> {
        self.connection.as_ref()
    }

    /// Next command to send to the controller.
    pub fn next_command(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    /// Next application event.
    pub fn next_event(&mut self) -> Option<GapEvent> {
        self.events.pop_front()
    }

    /// Check if commands are waiting to be drained.
    pub fn has_pending_commands(&self) -> bool {
        !self.commands.is_empty()
    }

    /// Begin advertising with `config`.
    pub fn start_advertising(&mut self, config: &AdvertisingConfig) -> Result<(), GapError> {
        if self.state != GapState::Idle {
            return Err(GapError::InvalidState(self.state));
        }
        config.validate()?;
        self.queue_advertising(config.clone());
        Ok(())
    }

    /// Stop advertising.
    pub fn stop_advertising(&mut self) -> Result<(), GapError> {
        if self.state != GapState::Advertising {
            return Err(GapError::InvalidState(self.state));
        }
        self.commands.push_back(Command::LeSetAdvertiseEnable(false));
        self.adv_enables.push_back(false);
        self.advertising = None;
        self.state = GapState::Idle;
        Ok(())
    }

    /// Terminate the connection identified by `handle`.
    pub fn disconnect(&mut self, handle: ConnHandle, reason: u8) -> Result<(), GapError> {
        if self.state != GapState::Connected {
            return Err(GapError::InvalidState(self.state));
        }
        if self.connection_handle() != Some(handle) {
            return Err(GapError::UnknownConnection(handle.raw()));
        }
        self.commands.push_back(Command::Disconnect { handle, reason });
        self.state = GapState::Disconnecting;
        Ok(())
    }

    fn queue_advertising(&mut self, config: AdvertisingConfig) {
        self.commands
            .push_back(Command::LeSetAdvertisingParameters(config.params()));
        self.commands
            .push_back(Command::LeSetAdvertisingData(config.adv_data.clone()));
        self.commands
            .push_back(Command::LeSetScanResponseData(config.scan_response.clone()));
        self.commands.push_back(Command::LeSetAdvertiseEnable(true));
        self.adv_enables.push_back(true);
        self.advertising = Some(config);
        self.state = GapState::Advertising;
    }

    /// Apply one controller event.
    pub fn handle_event(&mut self, event: &Event) {
        trace!(?event, state = ?self.state, "gap event");
        match *event {
            Event::CommandComplete { opcode, status, .. } => self.on_command_complete(opcode, status),
            Event::CommandStatus { status, opcode, .. } => {
                if status == status::SUCCESS {
                    return;
                }
                if opcode == Opcode::DISCONNECT && self.state == GapState::Disconnecting {
                    self.state = GapState::Connected;
                }
                self.events.push_back(GapEvent::CommandFailed { opcode, status });
            }
            Event::LeConnectionComplete(conn) => self.on_connection_complete(conn),
            Event::DisconnectionComplete {
                status,
                handle,
                reason,
            } => self.on_disconnection_complete(status, handle, reason),
            Event::NumberOfCompletedPackets { .. } | Event::Unknown { .. } => {}
        }
    }

    fn on_command_complete(&mut self, opcode: Opcode, status: u8) {
        if opcode == Opcode::RESET {
            if status == status::SUCCESS {
                debug!("controller reset, link state cleared");
                *self = Self::default();
            }
            return;
        }

        if opcode == Opcode::LE_SET_ADV_ENABLE {
            let enabling = self.adv_enables.pop_front();
            if status != status::SUCCESS {
                if enabling == Some(true) && self.state == GapState::Advertising {
                    self.state = GapState::Idle;
                    self.advertising = None;
                }
                self.events.push_back(GapEvent::CommandFailed { opcode, status });
                return;
            }
            match enabling {
                Some(true) => self.events.push_back(GapEvent::AdvertisingStarted),
                Some(false) => self.events.push_back(GapEvent::AdvertisingStopped),
                None => {}
            }
            return;
        }

        if status != status::SUCCESS {
            self.events.push_back(GapEvent::CommandFailed { opcode, status });
        }
    }

    fn on_connection_complete(&mut self, conn: LeConnection) {
        if conn.status == status::SUCCESS {
            debug!(handle = %conn.handle, "connected");
            // Legacy advertising stops once a connection is made.
            self.adv_enables.clear();
            self.connection = Some(conn);
            self.state = GapState::Connected;
            self.events.push_back(GapEvent::Connected(conn));
            return;
        }

        if self.state == GapState::Advertising {
            self.state = GapState::Idle;
            self.advertising = None;
        }
        if conn.status == status::ADVERTISING_TIMEOUT {
            self.events.push_back(GapEvent::AdvertisingStopped);
        } else {
            self.events
                .push_back(GapEvent::ConnectionFailed { status: conn.status });
        }
    }

    fn on_disconnection_complete(&mut self, status: u8, handle: ConnHandle, reason: u8) {
        if self.connection_handle() != Some(handle) {
            trace!(%handle, "disconnection for unknown handle");
            return;
        }
        if status != status::SUCCESS {
            if self.state == GapState::Disconnecting {
                self.state = GapState::Connected;
            }
            self.events.push_back(GapEvent::CommandFailed {
                opcode: Opcode::DISCONNECT,
                status,
            });
            return;
        }

        debug!(%handle, reason, "disconnected");
        self.connection = None;
        self.state = GapState::Idle;
        self.events.push_back(GapEvent::Disconnected { handle, reason });

        if let Some(config) = self.advertising.take() {
            if config.restart_on_disconnect {
                debug!("restarting advertising");
                self.queue_advertising(config);
            }
        }
    }
}
