//! Write loop: outbound queue → transport.
//!
//! Sole writer of the transport once the host is running.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use tracing::{debug, trace, warn};

use super::host::Shared;
use super::stats::HostStats;
use crate::core::Transport;
use crate::transport::Interest;

/// Run until the outbound queue is closed and drained, or cancellation is
/// seen while waiting for the transport.
pub(crate) fn run<T: Transport>(shared: Arc<Shared<T>>) {
    debug!("write loop started");
    while let Some(frame) = shared.tx.recv() {
        if !wait_writable(&shared) {
            debug!("write loop cancelled with frame pending");
            break;
        }

        // Best effort: retries belong to the transport driver.
        match shared.transport.write(frame.as_bytes()) {
            Ok(n) if n == frame.len() => {
                trace!(len = n, kind = ?frame.packet_type(), "frame written");
                HostStats::incr(&shared.stats.frames_written);
            }
            Ok(n) => {
                warn!(written = n, len = frame.len(), "partial write");
                HostStats::incr(&shared.stats.partial_writes);
            }
            Err(err) => {
                warn!(%err, len = frame.len(), "write failed");
                HostStats::incr(&shared.stats.write_errors);
            }
        }
    }
    debug!("write loop exited");
}

/// Poll until the transport is writable. Returns `false` on cancellation.
///
/// Cancellation is checked after each poll, so frames queued before `stop`
/// still go out while the link stays writable.
fn wait_writable<T: Transport>(shared: &Shared<T>) -> bool {
    let poll_timeout = shared.config.poll_timeout;
    loop {
        match shared.transport.poll(Interest::WRITABLE, poll_timeout) {
            Ok(ready) if ready.writable => return true,
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "poll failed");
                thread::sleep(poll_timeout);
            }
        }
        if shared.cancel.load(Ordering::Acquire) {
            return false;
        }
    }
}
