//! Outbound SDU fragmentation.

use super::L2capHeader;
use crate::core::{FrameError, HCI_ACL_DATA_PKT, L2CAP_HEADER_SIZE, L2capError, MAX_ACL_PAYLOAD};
use crate::hci::{AclHeader, BoundaryFlag, ConnHandle, Frame};

/// Split `payload` into ACL frames for `channel` on `handle`.
///
/// Each frame carries at most `max_fragment_payload` bytes of `payload`; the
/// first one is also prefixed with the L2CAP header. An empty payload yields
/// no frames.
pub fn fragments(
    handle: ConnHandle,
    channel: u16,
    payload: &[u8],
    max_fragment_payload: usize,
) -> Result<Fragments<'_>, L2capError> {
    if max_fragment_payload == 0 || max_fragment_payload > MAX_ACL_PAYLOAD {
        return Err(L2capError::InvalidFragmentSize(max_fragment_payload));
    }
    let length = u16::try_from(payload.len())
        .map_err(|_| L2capError::SduTooLarge(payload.len()))?;

    Ok(Fragments {
        handle,
        header: L2capHeader { length, channel },
        payload,
        max: max_fragment_payload,
        offset: 0,
    })
}

/// Iterator over the ACL frames of one outbound SDU.
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    handle: ConnHandle,
    header: L2capHeader,
    payload: &'a [u8],
    max: usize,
    offset: usize,
}

impl Fragments<'_> {
    fn frame(&self, chunk: &[u8], first: bool) -> Result<Frame, FrameError> {
        let (boundary, prefix) = if first {
            (BoundaryFlag::FirstNonFlushable, L2CAP_HEADER_SIZE)
        } else {
            (BoundaryFlag::Continuing, 0)
        };
        // chunk <= 251 so this always fits in a u16 and in the frame
        let acl = AclHeader::new(self.handle, boundary, (prefix + chunk.len()) as u16);

        let mut frame = Frame::new();
        frame.push(HCI_ACL_DATA_PKT)?;
        frame.extend_from_slice(&acl.to_bytes())?;
        if first {
            frame.extend_from_slice(&self.header.to_bytes())?;
        }
        frame.extend_from_slice(chunk)?;
        Ok(frame)
    }
}

impl Iterator for Fragments<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.offset >= self.payload.len() {
            return None;
        }
        let end = (self.offset + self.max).min(self.payload.len());
        let frame = self.frame(&self.payload[self.offset..end], self.offset == 0);
        self.offset = end;
        frame.ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.payload.len() - self.offset).div_ceil(self.max);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Fragments<'_> {}
