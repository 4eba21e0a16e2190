//! Protocol constants and host defaults.
//!
//! Wire values come from the Bluetooth Core specification (Vol 4 Part E for
//! HCI, Vol 3 Part A for L2CAP, Vol 3 Part F for ATT) and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// HCI PACKET INDICATORS (Vol 4 Part A, UART transport)
// =============================================================================

/// HCI command packet.
pub const HCI_COMMAND_PKT: u8 = 0x01;

/// HCI ACL data packet.
pub const HCI_ACL_DATA_PKT: u8 = 0x02;

/// HCI synchronous (SCO) data packet.
pub const HCI_SYNC_DATA_PKT: u8 = 0x03;

/// HCI event packet.
pub const HCI_EVENT_PKT: u8 = 0x04;

/// HCI isochronous data packet.
pub const HCI_ISO_DATA_PKT: u8 = 0x05;

// =============================================================================
// HEADER SIZES
// =============================================================================

/// Packet indicator size.
pub const PACKET_INDICATOR_SIZE: usize = 1;

/// Command header size (opcode + parameter length).
pub const HCI_COMMAND_HEADER_SIZE: usize = 3;

/// Event header size (event code + parameter length).
pub const HCI_EVENT_HEADER_SIZE: usize = 2;

/// ACL data header size (handle/flags + data length).
pub const ACL_HEADER_SIZE: usize = 4;

/// Basic L2CAP header size (length + channel id).
pub const L2CAP_HEADER_SIZE: usize = 4;

/// Largest LE ACL payload a controller accepts (LE Data Length Extension).
pub const MAX_ACL_PAYLOAD: usize = 251;

/// Largest command or event parameter block.
pub const MAX_HCI_PARAMS: usize = 255;

/// Outbound frame capacity.
///
/// Covers the largest ACL fragment (indicator + ACL header + L2CAP header +
/// 251 bytes of payload); a command frame needs at most 259 bytes.
pub const MAX_FRAME_LEN: usize =
    PACKET_INDICATOR_SIZE + ACL_HEADER_SIZE + L2CAP_HEADER_SIZE + MAX_ACL_PAYLOAD;

/// Largest legacy advertising / scan response payload.
pub const MAX_ADV_DATA_LEN: usize = 31;

// =============================================================================
// L2CAP CHANNEL IDS (Vol 3 Part A, 2.1)
// =============================================================================

/// Attribute protocol fixed channel.
pub const L2CAP_CID_ATT: u16 = 0x0004;

/// LE signaling fixed channel.
pub const L2CAP_CID_LE_SIGNAL: u16 = 0x0005;

/// Security manager fixed channel.
pub const L2CAP_CID_SMP: u16 = 0x0006;

/// Largest SDU the reassembler accepts.
pub const MAX_SDU_LEN: usize = 1024;

// =============================================================================
// ATT (Vol 3 Part F)
// =============================================================================

/// Default ATT MTU on LE links.
pub const ATT_DEFAULT_MTU: u16 = 23;

/// Largest ATT MTU the default server will negotiate.
pub const ATT_MAX_MTU: u16 = 517;

// =============================================================================
// HOST DEFAULTS
// =============================================================================

/// Transport poll timeout. Bounds cancellation latency of both loops.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// How long `start` waits for the reset Command Complete.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_millis(2000);

/// Outbound frame queue depth.
pub const DEFAULT_TX_QUEUE_CAPACITY: usize = 16;

/// Application event queue depth.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 32;

/// Per-fragment payload used when fragmenting outbound SDUs.
pub const DEFAULT_ACL_FRAGMENT_SIZE: usize = MAX_ACL_PAYLOAD;

/// ATT MTU offered by the default attribute server.
pub const DEFAULT_SERVER_MTU: u16 = 247;

/// Read loop receive buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 512;
