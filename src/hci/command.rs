//! HCI command encoding.
//!
//! Wire format:
//! ```text
//! +0  Indicator (0x01)
//! +1  Opcode (2 bytes LE16, OGF << 10 | OCF)
//! +3  Parameter length (1 byte)
//! +4  Parameters
//! ```

use std::fmt;

use super::packet::{ConnHandle, Frame};
use crate::core::{HCI_COMMAND_PKT, HciError, MAX_ADV_DATA_LEN};

/// HCI command opcode.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(u16);

impl Opcode {
    /// HCI_Disconnect (link control).
    pub const DISCONNECT: Self = Self::new(0x01, 0x0006);
    /// HCI_Reset (controller & baseband).
    pub const RESET: Self = Self::new(0x03, 0x0003);
    /// HCI_LE_Set_Advertising_Parameters.
    pub const LE_SET_ADV_PARAMS: Self = Self::new(0x08, 0x0006);
    /// HCI_LE_Set_Advertising_Data.
    pub const LE_SET_ADV_DATA: Self = Self::new(0x08, 0x0008);
    /// HCI_LE_Set_Scan_Response_Data.
    pub const LE_SET_SCAN_RSP_DATA: Self = Self::new(0x08, 0x0009);
    /// HCI_LE_Set_Advertising_Enable.
    pub const LE_SET_ADV_ENABLE: Self = Self::new(0x08, 0x000A);

    /// Build an opcode from group and command fields.
    pub const fn new(ogf: u8, ocf: u16) -> Self {
        Self(((ogf as u16) << 10) | (ocf & 0x03FF))
    }

    /// Wrap a raw opcode value.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw opcode value.
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opcode({:#06x})", self.0)
    }
}

/// Advertising PDU type for legacy advertising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AdvType {
    /// Connectable, scannable, undirected.
    #[default]
    ConnectableUndirected = 0x00,
    /// Scannable, undirected.
    ScannableUndirected = 0x02,
    /// Non-connectable, undirected.
    NonConnectableUndirected = 0x03,
}

/// Legacy advertising parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvParams {
    /// Minimum interval, units of 0.625 ms.
    pub interval_min: u16,
    /// Maximum interval, units of 0.625 ms.
    pub interval_max: u16,
    /// PDU type.
    pub adv_type: AdvType,
    /// Own address type (0 = public, 1 = random).
    pub own_address_type: u8,
    /// Channel map bitmask (bits 0..=2 = channels 37..=39).
    pub channel_map: u8,
    /// Filter policy.
    pub filter_policy: u8,
}

/// Commands the host issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reset the controller.
    Reset,
    /// Terminate a connection.
    Disconnect {
        /// Connection to terminate.
        handle: ConnHandle,
        /// Reason code sent to the peer.
        reason: u8,
    },
    /// Configure legacy advertising.
    LeSetAdvertisingParameters(AdvParams),
    /// Set advertising payload (at most 31 bytes).
    LeSetAdvertisingData(Vec<u8>),
    /// Set scan response payload (at most 31 bytes).
    LeSetScanResponseData(Vec<u8>),
    /// Enable or disable advertising.
    LeSetAdvertiseEnable(bool),
}

impl Command {
    /// Opcode of this command.
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Reset => Opcode::RESET,
            Command::Disconnect { .. } => Opcode::DISCONNECT,
            Command::LeSetAdvertisingParameters(_) => Opcode::LE_SET_ADV_PARAMS,
            Command::LeSetAdvertisingData(_) => Opcode::LE_SET_ADV_DATA,
            Command::LeSetScanResponseData(_) => Opcode::LE_SET_SCAN_RSP_DATA,
            Command::LeSetAdvertiseEnable(_) => Opcode::LE_SET_ADV_ENABLE,
        }
    }

    /// Encode into an outbound frame, indicator byte included.
    pub fn encode(&self) -> Result<Frame, HciError> {
        let mut params = [0u8; 32];
        let param_len = match self {
            Command::Reset => 0,
            Command::Disconnect { handle, reason } => {
                params[..2].copy_from_slice(&handle.raw().to_le_bytes());
                params[2] = *reason;
                3
            }
            Command::LeSetAdvertisingParameters(p) => {
                if p.interval_min > p.interval_max {
                    return Err(HciError::InvalidParameter("interval_min > interval_max"));
                }
                if p.channel_map & 0b111 == 0 {
                    return Err(HciError::InvalidParameter("empty channel map"));
                }
                params[0..2].copy_from_slice(&p.interval_min.to_le_bytes());
                params[2..4].copy_from_slice(&p.interval_max.to_le_bytes());
                params[4] = p.adv_type as u8;
                params[5] = p.own_address_type;
                // peer address type + peer address stay zero (undirected)
                params[13] = p.channel_map & 0b111;
                params[14] = p.filter_policy;
                15
            }
            Command::LeSetAdvertisingData(data) | Command::LeSetScanResponseData(data) => {
                if data.len() > MAX_ADV_DATA_LEN {
                    return Err(HciError::InvalidParameter("advertising data longer than 31 bytes"));
                }
                params[0] = data.len() as u8;
                params[1..1 + data.len()].copy_from_slice(data);
                1 + MAX_ADV_DATA_LEN
            }
            Command::LeSetAdvertiseEnable(enable) => {
                params[0] = u8::from(*enable);
                1
            }
        };

        let mut frame = Frame::new();
        frame.push(HCI_COMMAND_PKT)?;
        frame.extend_from_slice(&self.opcode().raw().to_le_bytes())?;
        frame.push(param_len as u8)?;
        frame.extend_from_slice(&params[..param_len])?;
        Ok(frame)
    }
}
