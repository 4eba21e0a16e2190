//! HCI packet framing.
//!
//! Packet type classification, the fixed-capacity outbound [`Frame`], and the
//! ACL data header.

use std::fmt;

use crate::core::{
    ACL_HEADER_SIZE, FrameError, HCI_ACL_DATA_PKT, HCI_COMMAND_PKT, HCI_EVENT_PKT,
    HCI_ISO_DATA_PKT, HCI_SYNC_DATA_PKT, HciError, MAX_FRAME_LEN,
};

/// HCI packet type indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Host to controller command.
    Command = HCI_COMMAND_PKT,
    /// ACL (connection) data.
    AclData = HCI_ACL_DATA_PKT,
    /// Synchronous (voice) data.
    SyncData = HCI_SYNC_DATA_PKT,
    /// Controller to host event.
    Event = HCI_EVENT_PKT,
    /// Isochronous data.
    IsoData = HCI_ISO_DATA_PKT,
}

impl PacketType {
    /// Parse a packet type from its indicator byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            HCI_COMMAND_PKT => Some(Self::Command),
            HCI_ACL_DATA_PKT => Some(Self::AclData),
            HCI_SYNC_DATA_PKT => Some(Self::SyncData),
            HCI_EVENT_PKT => Some(Self::Event),
            HCI_ISO_DATA_PKT => Some(Self::IsoData),
            _ => None,
        }
    }

    /// Indicator byte for this packet type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Connection handle (12 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle(u16);

impl ConnHandle {
    /// Largest valid handle value.
    pub const MAX: u16 = 0x0EFF;

    /// Create a handle, masking to 12 bits.
    pub const fn new(raw: u16) -> Self {
        Self(raw & 0x0FFF)
    }

    /// Raw handle value.
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// ACL packet boundary flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BoundaryFlag {
    /// First fragment, non-automatically-flushable (host to controller).
    FirstNonFlushable = 0b00,
    /// Continuing fragment.
    Continuing = 0b01,
    /// First fragment, automatically flushable.
    FirstFlushable = 0b10,
    /// Complete PDU (not used on LE).
    Complete = 0b11,
}

impl BoundaryFlag {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::FirstNonFlushable,
            0b01 => Self::Continuing,
            0b10 => Self::FirstFlushable,
            _ => Self::Complete,
        }
    }

    /// Check if this flag starts a new SDU.
    pub fn is_start(self) -> bool {
        !matches!(self, Self::Continuing)
    }
}

/// ACL data header.
///
/// Wire format (4 bytes):
/// ```text
/// +----------------------+----------------+
/// | Handle|PB|BC         | Data length    |
/// | 2 bytes (LE16)       | 2 bytes (LE16) |
/// +----------------------+----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclHeader {
    /// Connection handle.
    pub handle: ConnHandle,
    /// Packet boundary flag.
    pub boundary: BoundaryFlag,
    /// Broadcast flag (always 0 on LE).
    pub broadcast: u8,
    /// Payload length following the header.
    pub length: u16,
}

impl AclHeader {
    /// Create a point-to-point header.
    pub fn new(handle: ConnHandle, boundary: BoundaryFlag, length: u16) -> Self {
        Self {
            handle,
            boundary,
            broadcast: 0,
            length,
        }
    }

    /// Serialize to 4 bytes.
    pub fn to_bytes(&self) -> [u8; ACL_HEADER_SIZE] {
        let word = self.handle.raw()
            | (u16::from(self.boundary as u8) << 12)
            | (u16::from(self.broadcast & 0b11) << 14);
        let [a, b] = word.to_le_bytes();
        let [c, d] = self.length.to_le_bytes();
        [a, b, c, d]
    }

    /// Parse a header from the bytes after the packet indicator.
    ///
    /// Returns the header and its payload; the payload length must match the
    /// declared length exactly.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), HciError> {
        if bytes.len() < ACL_HEADER_SIZE {
            return Err(HciError::TooShort {
                expected: ACL_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let word = u16::from_le_bytes([bytes[0], bytes[1]]);
        let length = u16::from_le_bytes([bytes[2], bytes[3]]);
        let payload = &bytes[ACL_HEADER_SIZE..];
        if payload.len() != length as usize {
            return Err(HciError::LengthMismatch {
                declared: length as usize,
                actual: payload.len(),
            });
        }

        let header = Self {
            handle: ConnHandle::new(word),
            boundary: BoundaryFlag::from_bits((word >> 12) as u8),
            broadcast: ((word >> 14) & 0b11) as u8,
            length,
        };
        Ok((header, payload))
    }
}

/// Outbound frame: indicator byte plus packet, copied by value into queues.
#[derive(Clone)]
pub struct Frame {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    /// Frame capacity in bytes.
    pub const CAPACITY: usize = MAX_FRAME_LEN;

    /// Create an empty frame.
    pub fn new() -> Self {
        Self {
            buf: [0u8; MAX_FRAME_LEN],
            len: 0,
        }
    }

    /// Create a frame holding a copy of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut frame = Self::new();
        frame.extend_from_slice(bytes)?;
        Ok(frame)
    }

    /// Append bytes, failing if the frame would exceed its capacity.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        let end = self.len + bytes.len();
        if end > MAX_FRAME_LEN {
            return Err(FrameError::Overflow {
                len: end,
                capacity: MAX_FRAME_LEN,
            });
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<(), FrameError> {
        self.extend_from_slice(&[byte])
    }

    /// Frame contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Number of bytes in the frame.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Packet type of the first byte, if any.
    pub fn packet_type(&self) -> Option<PacketType> {
        self.as_bytes().first().copied().and_then(PacketType::from_byte)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("type", &self.packet_type())
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_roundtrip() {
        for byte in 0x01..=0x05 {
            let ty = PacketType::from_byte(byte).unwrap();
            assert_eq!(ty.as_byte(), byte);
        }
        assert_eq!(PacketType::from_byte(0x00), None);
        assert_eq!(PacketType::from_byte(0xFF), None);
    }

    #[test]
    fn test_conn_handle_masks_flags() {
        assert_eq!(ConnHandle::new(0x2040).raw(), 0x0040);
        assert_eq!(ConnHandle::new(0x0EFF).raw(), ConnHandle::MAX);
    }

    #[test]
    fn test_acl_header_parse() {
        // handle 0x0040, PB = first flushable, 5 bytes
        let bytes = hex::decode("4020050001020304ff").unwrap();
        let (header, payload) = AclHeader::parse(&bytes).unwrap();
        assert_eq!(header.handle, ConnHandle::new(0x40));
        assert_eq!(header.boundary, BoundaryFlag::FirstFlushable);
        assert_eq!(header.length, 5);
        assert_eq!(payload, &[0x01, 0x02, 0x03, 0x04, 0xff]);
    }

    #[test]
    fn test_acl_header_bytes() {
        let header = AclHeader::new(ConnHandle::new(0x0001), BoundaryFlag::Continuing, 0x00fb);
        assert_eq!(header.to_bytes(), [0x01, 0x10, 0xfb, 0x00]);
    }

    #[test]
    fn test_acl_header_errors() {
        assert!(matches!(
            AclHeader::parse(&[0x40, 0x20]),
            Err(HciError::TooShort { expected: 4, actual: 2 })
        ));
        assert!(matches!(
            AclHeader::parse(&[0x40, 0x20, 0x03, 0x00, 0xaa]),
            Err(HciError::LengthMismatch { declared: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_frame_capacity() {
        let mut frame = Frame::new();
        assert!(frame.is_empty());
        frame.extend_from_slice(&[0u8; MAX_FRAME_LEN]).unwrap();
        assert_eq!(frame.len(), Frame::CAPACITY);

        let err = frame.push(0).unwrap_err();
        assert_eq!(
            err,
            FrameError::Overflow {
                len: MAX_FRAME_LEN + 1,
                capacity: MAX_FRAME_LEN
            }
        );
        assert_eq!(frame.len(), Frame::CAPACITY);
    }

    #[test]
    fn test_frame_packet_type() {
        let frame = Frame::from_slice(&[0x01, 0x03, 0x0c, 0x00]).unwrap();
        assert_eq!(frame.packet_type(), Some(PacketType::Command));
        assert_eq!(Frame::new().packet_type(), None);
    }
}
