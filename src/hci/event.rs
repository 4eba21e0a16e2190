//! HCI event decoding.
//!
//! Wire format (after the 0x04 indicator):
//! ```text
//! +0  Event code (1 byte)
//! +1  Parameter length (1 byte)
//! +2  Parameters
//! ```
//!
//! Only the events the connection state machine consumes are decoded in full;
//! everything else surfaces as [`Event::Unknown`].

use super::command::Opcode;
use super::packet::ConnHandle;
use crate::core::{HCI_EVENT_HEADER_SIZE, HCI_EVENT_PKT, HciError};

/// HCI event codes.
pub mod code {
    /// Disconnection Complete.
    pub const DISCONNECTION_COMPLETE: u8 = 0x05;
    /// Command Complete.
    pub const COMMAND_COMPLETE: u8 = 0x0E;
    /// Command Status.
    pub const COMMAND_STATUS: u8 = 0x0F;
    /// Number Of Completed Packets.
    pub const NUMBER_OF_COMPLETED_PACKETS: u8 = 0x13;
    /// LE Meta event.
    pub const LE_META: u8 = 0x3E;

    /// LE Connection Complete subevent.
    pub const LE_CONNECTION_COMPLETE: u8 = 0x01;
    /// LE Enhanced Connection Complete subevent.
    pub const LE_ENHANCED_CONNECTION_COMPLETE: u8 = 0x0A;
}

/// HCI status / error codes (Vol 1 Part F).
pub mod status {
    /// Success.
    pub const SUCCESS: u8 = 0x00;
    /// Unknown Connection Identifier.
    pub const UNKNOWN_CONNECTION_ID: u8 = 0x02;
    /// Command Disallowed.
    pub const COMMAND_DISALLOWED: u8 = 0x0C;
    /// Remote User Terminated Connection.
    pub const REMOTE_USER_TERMINATED: u8 = 0x13;
    /// Connection Terminated By Local Host.
    pub const LOCAL_HOST_TERMINATED: u8 = 0x16;
    /// Advertising Timeout.
    pub const ADVERTISING_TIMEOUT: u8 = 0x3C;
}

/// Local role on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Local device initiated the connection.
    Central,
    /// Local device was advertising.
    Peripheral,
}

impl Role {
    fn from_byte(byte: u8) -> Result<Self, HciError> {
        match byte {
            0x00 => Ok(Self::Central),
            0x01 => Ok(Self::Peripheral),
            _ => Err(HciError::InvalidParameter("connection role")),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::Central => 0x00,
            Self::Peripheral => 0x01,
        }
    }
}

/// Parameters of an LE connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeConnection {
    /// Completion status.
    pub status: u8,
    /// Connection handle.
    pub handle: ConnHandle,
    /// Local role.
    pub role: Role,
    /// Peer address type.
    pub peer_address_type: u8,
    /// Peer address (little-endian as on the wire).
    pub peer_address: [u8; 6],
    /// Connection interval, units of 1.25 ms.
    pub interval: u16,
    /// Peripheral latency.
    pub latency: u16,
    /// Supervision timeout, units of 10 ms.
    pub supervision_timeout: u16,
}

/// Decoded controller event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A command finished.
    CommandComplete {
        /// Commands the controller can accept now.
        num_hci_packets: u8,
        /// Opcode of the completed command.
        opcode: Opcode,
        /// First return parameter (status), success if absent.
        status: u8,
    },
    /// A command was accepted or rejected, completion follows later.
    CommandStatus {
        /// Status.
        status: u8,
        /// Commands the controller can accept now.
        num_hci_packets: u8,
        /// Opcode of the command.
        opcode: Opcode,
    },
    /// A connection was terminated.
    DisconnectionComplete {
        /// Status.
        status: u8,
        /// Terminated connection.
        handle: ConnHandle,
        /// Reason code.
        reason: u8,
    },
    /// LE connection established or failed.
    LeConnectionComplete(LeConnection),
    /// Controller freed ACL buffers.
    NumberOfCompletedPackets {
        /// `(handle, completed packets)` pairs.
        completed: Vec<(ConnHandle, u16)>,
    },
    /// Any event this host does not interpret.
    Unknown {
        /// Event code.
        code: u8,
    },
}

fn need(params: &[u8], len: usize) -> Result<(), HciError> {
    if params.len() < len {
        return Err(HciError::TooShort {
            expected: len,
            actual: params.len(),
        });
    }
    Ok(())
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

impl Event {
    /// Decode an event from the bytes following the indicator.
    pub fn decode(bytes: &[u8]) -> Result<Self, HciError> {
        need(bytes, HCI_EVENT_HEADER_SIZE)?;
        let event_code = bytes[0];
        let declared = bytes[1] as usize;
        let params = &bytes[HCI_EVENT_HEADER_SIZE..];
        if params.len() != declared {
            return Err(HciError::LengthMismatch {
                declared,
                actual: params.len(),
            });
        }

        match event_code {
            code::COMMAND_COMPLETE => {
                need(params, 3)?;
                Ok(Event::CommandComplete {
                    num_hci_packets: params[0],
                    opcode: Opcode::from_raw(le16(params, 1)),
                    status: params.get(3).copied().unwrap_or(status::SUCCESS),
                })
            }
            code::COMMAND_STATUS => {
                need(params, 4)?;
                Ok(Event::CommandStatus {
                    status: params[0],
                    num_hci_packets: params[1],
                    opcode: Opcode::from_raw(le16(params, 2)),
                })
            }
            code::DISCONNECTION_COMPLETE => {
                need(params, 4)?;
                Ok(Event::DisconnectionComplete {
                    status: params[0],
                    handle: ConnHandle::new(le16(params, 1)),
                    reason: params[3],
                })
            }
            code::NUMBER_OF_COMPLETED_PACKETS => {
                need(params, 1)?;
                let count = params[0] as usize;
                need(params, 1 + count * 4)?;
                let completed = params[1..1 + count * 4]
                    .chunks_exact(4)
                    .map(|c| (ConnHandle::new(le16(c, 0)), le16(c, 2)))
                    .collect();
                Ok(Event::NumberOfCompletedPackets { completed })
            }
            code::LE_META => {
                need(params, 1)?;
                Self::decode_le_meta(params[0], &params[1..])
            }
            other => Ok(Event::Unknown { code: other }),
        }
    }

    fn decode_le_meta(subevent: u8, p: &[u8]) -> Result<Self, HciError> {
        // Enhanced variant inserts two resolvable private addresses before
        // the interval fields.
        let timing_at = match subevent {
            code::LE_CONNECTION_COMPLETE => 11,
            code::LE_ENHANCED_CONNECTION_COMPLETE => 23,
            _ => return Ok(Event::Unknown { code: code::LE_META }),
        };
        need(p, timing_at + 7)?;

        let mut peer_address = [0u8; 6];
        peer_address.copy_from_slice(&p[5..11]);
        Ok(Event::LeConnectionComplete(LeConnection {
            status: p[0],
            handle: ConnHandle::new(le16(p, 1)),
            role: Role::from_byte(p[3])?,
            peer_address_type: p[4],
            peer_address,
            interval: le16(p, timing_at),
            latency: le16(p, timing_at + 2),
            supervision_timeout: le16(p, timing_at + 4),
        }))
    }

    /// Encode as a controller would send it, indicator byte included.
    ///
    /// Used by controller simulators such as
    /// [`MemoryTransport`](crate::transport::MemoryTransport).
    pub fn to_packet(&self) -> Vec<u8> {
        let mut params = Vec::new();
        let event_code = match self {
            Event::CommandComplete {
                num_hci_packets,
                opcode,
                status,
            } => {
                params.push(*num_hci_packets);
                params.extend_from_slice(&opcode.raw().to_le_bytes());
                params.push(*status);
                code::COMMAND_COMPLETE
            }
            Event::CommandStatus {
                status,
                num_hci_packets,
                opcode,
            } => {
                params.push(*status);
                params.push(*num_hci_packets);
                params.extend_from_slice(&opcode.raw().to_le_bytes());
                code::COMMAND_STATUS
            }
            Event::DisconnectionComplete {
                status,
                handle,
                reason,
            } => {
                params.push(*status);
                params.extend_from_slice(&handle.raw().to_le_bytes());
                params.push(*reason);
                code::DISCONNECTION_COMPLETE
            }
            Event::LeConnectionComplete(c) => {
                params.push(code::LE_CONNECTION_COMPLETE);
                params.push(c.status);
                params.extend_from_slice(&c.handle.raw().to_le_bytes());
                params.push(c.role.as_byte());
                params.push(c.peer_address_type);
                params.extend_from_slice(&c.peer_address);
                params.extend_from_slice(&c.interval.to_le_bytes());
                params.extend_from_slice(&c.latency.to_le_bytes());
                params.extend_from_slice(&c.supervision_timeout.to_le_bytes());
                // central clock accuracy
                params.push(0);
                code::LE_META
            }
            Event::NumberOfCompletedPackets { completed } => {
                params.push(completed.len() as u8);
                for (handle, count) in completed {
                    params.extend_from_slice(&handle.raw().to_le_bytes());
                    params.extend_from_slice(&count.to_le_bytes());
                }
                code::NUMBER_OF_COMPLETED_PACKETS
            }
            Event::Unknown { code } => *code,
        };

        let mut packet = Vec::with_capacity(3 + params.len());
        packet.push(HCI_EVENT_PKT);
        packet.push(event_code);
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        packet
    }
}
