//! Logical Link Control and Adaptation Protocol.
//!
//! Only LE fixed channels in basic mode are handled: inbound ACL fragments
//! are stitched into SDUs by the [`Reassembler`], and outbound SDUs are cut
//! into ACL frames by [`fragments`].

mod fragment;
mod reassembly;

pub use fragment::{Fragments, fragments};
pub use reassembly::{Reassembler, Sdu};

use crate::core::{L2CAP_HEADER_SIZE, L2capError};

/// Basic L2CAP header.
///
/// Wire format (4 bytes):
/// ```text
/// +----------------+----------------+
/// | SDU length     | Channel ID     |
/// | 2 bytes (LE16) | 2 bytes (LE16) |
/// +----------------+----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2capHeader {
    /// Length of the information payload.
    pub length: u16,
    /// Destination channel.
    pub channel: u16,
}

impl L2capHeader {
    /// Serialize to 4 bytes.
    pub fn to_bytes(&self) -> [u8; L2CAP_HEADER_SIZE] {
        let [a, b] = self.length.to_le_bytes();
        let [c, d] = self.channel.to_le_bytes();
        [a, b, c, d]
    }

    /// Parse the header at the start of a first fragment.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), L2capError> {
        if bytes.len() < L2CAP_HEADER_SIZE {
            return Err(L2capError::TooShort {
                expected: L2CAP_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let header = Self {
            length: u16::from_le_bytes([bytes[0], bytes[1]]),
            channel: u16::from_le_bytes([bytes[2], bytes[3]]),
        };
        Ok((header, &bytes[L2CAP_HEADER_SIZE..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::L2CAP_CID_ATT;

    #[test]
    fn test_header_bytes() {
        let header = L2capHeader {
            length: 0x0258,
            channel: L2CAP_CID_ATT,
        };
        assert_eq!(header.to_bytes(), [0x58, 0x02, 0x04, 0x00]);

        let (parsed, rest) = L2capHeader::parse(&[0x03, 0x00, 0x04, 0x00, 0xaa]).unwrap();
        assert_eq!(parsed.length, 3);
        assert_eq!(parsed.channel, L2CAP_CID_ATT);
        assert_eq!(rest, &[0xaa]);
    }

    #[test]
    fn test_header_too_short() {
        assert_eq!(
            L2capHeader::parse(&[0x01, 0x00]),
            Err(L2capError::TooShort {
                expected: 4,
                actual: 2
            })
        );
    }
}
