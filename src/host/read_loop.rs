//! Read loop: transport → GAP / L2CAP → ATT.
//!
//! The only writer of the reassembler and the attribute server. Never blocks
//! except inside the bounded transport poll; every enqueue is non-blocking
//! and a full queue drops the newest item.

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use tracing::{debug, trace, warn};

use super::host::Shared;
use super::stats::HostStats;
use crate::core::{
    ATT_MAX_MTU, AttributeServer, L2CAP_CID_ATT, L2CAP_CID_LE_SIGNAL, L2CAP_CID_SMP, Transport,
    TrySendError,
};
use crate::hci::{AclHeader, ConnHandle, Event, PacketType, status};
use crate::l2cap::{self, Reassembler};
use crate::transport::Interest;

struct ReadLoop<T, A> {
    shared: Arc<Shared<T>>,
    att: A,
    reassembler: Reassembler,
    /// ATT response scratch.
    response: Vec<u8>,
}

/// Run until the cancel flag is raised.
pub(crate) fn run<T: Transport, A: AttributeServer>(shared: Arc<Shared<T>>, att: A) {
    let mut buf = vec![0u8; shared.config.read_buffer_size];
    let mut rx = ReadLoop {
        shared,
        att,
        reassembler: Reassembler::new(),
        response: vec![0u8; usize::from(ATT_MAX_MTU)],
    };
    debug!("read loop started");

    let poll_timeout = rx.shared.config.poll_timeout;
    while !rx.shared.cancel.load(Ordering::Acquire) {
        match rx.shared.transport.poll(Interest::READABLE, poll_timeout) {
            Ok(ready) if ready.readable => {}
            Ok(_) => continue,
            Err(err) => {
                debug!(%err, "poll failed");
                thread::sleep(poll_timeout);
                continue;
            }
        }

        let len = match rx.shared.transport.read(&mut buf) {
            Ok(0) => continue,
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) => {
                debug!(%err, "read failed");
                continue;
            }
        };
        HostStats::incr(&rx.shared.stats.packets_read);
        rx.dispatch(&buf[..len]);
    }
    debug!("read loop exited");
}

impl<T: Transport, A: AttributeServer> ReadLoop<T, A> {
    fn dispatch(&mut self, packet: &[u8]) {
        let Some((&indicator, body)) = packet.split_first() else {
            return;
        };
        match PacketType::from_byte(indicator) {
            Some(PacketType::Event) => self.on_event(body),
            Some(PacketType::AclData) => self.on_acl(body),
            other => {
                trace!(indicator, kind = ?other, "ignoring packet");
                HostStats::incr(&self.shared.stats.ignored_packets);
            }
        }
    }

    fn on_event(&mut self, body: &[u8]) {
        let event = match Event::decode(body) {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "dropping malformed event");
                HostStats::incr(&self.shared.stats.decode_errors);
                return;
            }
        };
        trace!(?event, "controller event");

        if let Event::DisconnectionComplete {
            status: status::SUCCESS,
            handle,
            ..
        } = event
        {
            self.att.on_disconnect(handle);
            self.reassembler.discard(handle);
        }

        let (commands, events) = {
            let mut gap = self.shared.gap.lock();
            gap.handle_event(&event);
            let commands: Vec<_> = std::iter::from_fn(|| gap.next_command()).collect();
            let events: Vec<_> = std::iter::from_fn(|| gap.next_event()).collect();
            (commands, events)
        };

        for command in commands {
            let frame = match command.encode() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, opcode = ?command.opcode(), "dropping unencodable command");
                    continue;
                }
            };
            match self.shared.tx.try_send(frame) {
                Ok(()) => trace!(opcode = ?command.opcode(), "reactive command queued"),
                Err(TrySendError::Full(_)) => {
                    warn!(opcode = ?command.opcode(), "outbound queue full, dropping command");
                    HostStats::incr(&self.shared.stats.dropped_commands);
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }

        let mut queued = false;
        for event in events {
            match self.shared.events.try_send(event) {
                Ok(()) => queued = true,
                Err(TrySendError::Full(event)) => {
                    warn!(?event, "event queue full, dropping event");
                    HostStats::incr(&self.shared.stats.dropped_events);
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        if queued {
            self.shared.wake_event_waiters();
        }
    }

    fn on_acl(&mut self, body: &[u8]) {
        let (header, payload) = match AclHeader::parse(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "dropping malformed ACL packet");
                HostStats::incr(&self.shared.stats.decode_errors);
                return;
            }
        };

        let sdu = match self.reassembler.feed(&header, payload) {
            Ok(Some(sdu)) => sdu,
            Ok(None) => return,
            Err(err) => {
                warn!(%err, handle = %header.handle, "dropping ACL fragment");
                HostStats::incr(&self.shared.stats.decode_errors);
                return;
            }
        };

        match sdu.channel {
            L2CAP_CID_ATT => {
                let handle = sdu.handle;
                let Some(len) = self.att.handle_pdu(handle, sdu.data, &mut self.response) else {
                    return;
                };
                let len = len.min(self.response.len());
                self.send_response(handle, len);
            }
            L2CAP_CID_LE_SIGNAL | L2CAP_CID_SMP => {
                trace!(channel = sdu.channel, handle = %sdu.handle, "unhandled fixed channel");
                HostStats::incr(&self.shared.stats.ignored_packets);
            }
            channel => {
                trace!(channel, handle = %sdu.handle, "unknown channel");
                HostStats::incr(&self.shared.stats.ignored_packets);
            }
        }
    }

    /// Fragment an ATT response onto the outbound queue without blocking.
    ///
    /// The fragments are queued back to back, or not at all when the queue
    /// lacks room for every one of them.
    fn send_response(&self, handle: ConnHandle, len: usize) {
        let stats = &self.shared.stats;
        let fragments = match l2cap::fragments(
            handle,
            L2CAP_CID_ATT,
            &self.response[..len],
            self.shared.config.acl_fragment_size,
        ) {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(%err, "cannot fragment ATT response");
                HostStats::incr(&stats.dropped_att_responses);
                return;
            }
        };

        match self.shared.tx.try_send_all(fragments) {
            Ok(()) => trace!(%handle, len, "ATT response queued"),
            Err(TrySendError::Full(fragments)) => {
                warn!(%handle, needed = fragments.len(), "outbound queue full, dropping ATT response");
                HostStats::incr(&stats.dropped_att_responses);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
