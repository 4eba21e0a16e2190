//! ATT PDU layout and the handful of encoders the host needs.
//!
//! ```text
//! +0  Opcode (1 byte)
//! +1  Parameters (up to MTU - 1)
//! ```

/// ATT opcodes.
pub mod opcode {
    /// Error Response.
    pub const ERROR_RSP: u8 = 0x01;
    /// Exchange MTU Request.
    pub const EXCHANGE_MTU_REQ: u8 = 0x02;
    /// Exchange MTU Response.
    pub const EXCHANGE_MTU_RSP: u8 = 0x03;
    /// Find Information Request.
    pub const FIND_INFO_REQ: u8 = 0x04;
    /// Read By Type Request.
    pub const READ_BY_TYPE_REQ: u8 = 0x08;
    /// Read Request.
    pub const READ_REQ: u8 = 0x0A;
    /// Read By Group Type Request.
    pub const READ_BY_GROUP_TYPE_REQ: u8 = 0x10;
    /// Write Request.
    pub const WRITE_REQ: u8 = 0x12;
    /// Write Response.
    pub const WRITE_RSP: u8 = 0x13;
    /// Handle Value Notification.
    pub const HANDLE_VALUE_NTF: u8 = 0x1B;
    /// Handle Value Indication.
    pub const HANDLE_VALUE_IND: u8 = 0x1D;
    /// Handle Value Confirmation.
    pub const HANDLE_VALUE_CFM: u8 = 0x1E;
    /// Write Command.
    pub const WRITE_CMD: u8 = 0x52;

    /// Bit set on every command opcode.
    pub const COMMAND_FLAG: u8 = 0x40;
}

/// ATT error codes.
pub mod error {
    /// Invalid Handle.
    pub const INVALID_HANDLE: u8 = 0x01;
    /// Invalid PDU.
    pub const INVALID_PDU: u8 = 0x04;
    /// Request Not Supported.
    pub const REQUEST_NOT_SUPPORTED: u8 = 0x06;
    /// Attribute Not Found.
    pub const ATTRIBUTE_NOT_FOUND: u8 = 0x0A;
    /// Unlikely Error.
    pub const UNLIKELY_ERROR: u8 = 0x0E;
}

/// Length of an Error Response PDU.
pub const ERROR_RSP_LEN: usize = 5;

/// Check if a client-sent `op` expects a response from the server.
///
/// Commands, notifications, indications, confirmations and responses do not.
pub fn expects_response(op: u8) -> bool {
    if op & opcode::COMMAND_FLAG != 0 {
        return false;
    }
    !matches!(
        op,
        0x01 | 0x03
            | 0x05
            | 0x07
            | 0x09
            | 0x0B
            | 0x0D
            | 0x0F
            | 0x11
            | 0x13
            | 0x17
            | 0x19
            | opcode::HANDLE_VALUE_NTF
            | opcode::HANDLE_VALUE_IND
            | opcode::HANDLE_VALUE_CFM
            | 0x21
            | 0x23
    )
}

fn handle_value(op: u8, attr_handle: u16, value: &[u8]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(3 + value.len());
    pdu.push(op);
    pdu.extend_from_slice(&attr_handle.to_le_bytes());
    pdu.extend_from_slice(value);
    pdu
}

/// Handle Value Notification PDU.
pub fn notification(attr_handle: u16, value: &[u8]) -> Vec<u8> {
    handle_value(opcode::HANDLE_VALUE_NTF, attr_handle, value)
}

/// Handle Value Indication PDU.
pub fn indication(attr_handle: u16, value: &[u8]) -> Vec<u8> {
    handle_value(opcode::HANDLE_VALUE_IND, attr_handle, value)
}

/// Write an Error Response into `buf`, returning its length.
///
/// Returns `None` if `buf` is shorter than [`ERROR_RSP_LEN`].
pub fn error_response(request: u8, attr_handle: u16, code: u8, buf: &mut [u8]) -> Option<usize> {
    let out = buf.get_mut(..ERROR_RSP_LEN)?;
    let [lo, hi] = attr_handle.to_le_bytes();
    out.copy_from_slice(&[opcode::ERROR_RSP, request, lo, hi, code]);
    Some(ERROR_RSP_LEN)
}

/// Write an Exchange MTU Response into `buf`, returning its length.
pub fn exchange_mtu_response(mtu: u16, buf: &mut [u8]) -> Option<usize> {
    let out = buf.get_mut(..3)?;
    let [lo, hi] = mtu.to_le_bytes();
    out.copy_from_slice(&[opcode::EXCHANGE_MTU_RSP, lo, hi]);
    Some(3)
}
