//! Inbound SDU reassembly.

use std::collections::HashMap;

use tracing::{trace, warn};

use super::L2capHeader;
use crate::core::{L2capError, MAX_SDU_LEN};
use crate::hci::{AclHeader, ConnHandle};

/// A complete L2CAP SDU.
///
/// Borrows either the read buffer (unfragmented) or the reassembler's
/// scratch, so it must be consumed before the next packet is fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sdu<'a> {
    /// Connection the SDU arrived on.
    pub handle: ConnHandle,
    /// Destination channel.
    pub channel: u16,
    /// Information payload, L2CAP header stripped.
    pub data: &'a [u8],
}

#[derive(Debug)]
struct Partial {
    channel: u16,
    expected: usize,
    data: Vec<u8>,
}

/// Per-connection reassembly of ACL fragments into SDUs.
#[derive(Debug, Default)]
pub struct Reassembler {
    partials: HashMap<ConnHandle, Partial>,
    complete: Vec<u8>,
}

impl Reassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one ACL fragment.
    ///
    /// Returns the SDU once its declared length has arrived, `None` while
    /// fragments are still pending. A start fragment drops any partial SDU
    /// left over on the same handle. Errors discard the fragment, and for
    /// overflow the partial SDU as well.
    pub fn feed<'a>(
        &'a mut self,
        header: &AclHeader,
        payload: &'a [u8],
    ) -> Result<Option<Sdu<'a>>, L2capError> {
        let handle = header.handle;

        if header.boundary.is_start() {
            if let Some(stale) = self.partials.remove(&handle) {
                warn!(
                    %handle,
                    received = stale.data.len(),
                    expected = stale.expected,
                    "dropping incomplete SDU"
                );
            }

            let (l2cap, body) = L2capHeader::parse(payload)?;
            let expected = usize::from(l2cap.length);
            if expected > MAX_SDU_LEN {
                return Err(L2capError::SduTooLarge(expected));
            }
            if body.len() > expected {
                return Err(L2capError::Overflow {
                    declared: expected,
                    received: body.len(),
                });
            }
            if body.len() == expected {
                return Ok(Some(Sdu {
                    handle,
                    channel: l2cap.channel,
                    data: body,
                }));
            }

            trace!(%handle, expected, received = body.len(), "SDU start");
            let mut data = Vec::with_capacity(expected);
            data.extend_from_slice(body);
            self.partials.insert(
                handle,
                Partial {
                    channel: l2cap.channel,
                    expected,
                    data,
                },
            );
            return Ok(None);
        }

        let Some(partial) = self.partials.get_mut(&handle) else {
            return Err(L2capError::UnexpectedContinuation(handle.raw()));
        };
        let received = partial.data.len() + payload.len();
        if received > partial.expected {
            let declared = partial.expected;
            self.partials.remove(&handle);
            return Err(L2capError::Overflow { declared, received });
        }
        partial.data.extend_from_slice(payload);
        if received < partial.expected {
            return Ok(None);
        }

        let Some(done) = self.partials.remove(&handle) else {
            return Ok(None);
        };
        self.complete = done.data;
        Ok(Some(Sdu {
            handle,
            channel: done.channel,
            data: &self.complete,
        }))
    }

    /// Forget any partial SDU on `handle`.
    pub fn discard(&mut self, handle: ConnHandle) {
        self.partials.remove(&handle);
    }

    /// Number of connections with a partial SDU pending.
    pub fn pending(&self) -> usize {
        self.partials.len()
    }
}
