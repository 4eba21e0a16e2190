//! Host counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by the host loops.
#[derive(Debug, Default)]
pub struct HostStats {
    pub(crate) packets_read: AtomicU64,
    pub(crate) decode_errors: AtomicU64,
    pub(crate) ignored_packets: AtomicU64,
    pub(crate) frames_written: AtomicU64,
    pub(crate) partial_writes: AtomicU64,
    pub(crate) write_errors: AtomicU64,
    pub(crate) dropped_commands: AtomicU64,
    pub(crate) dropped_events: AtomicU64,
    pub(crate) dropped_att_responses: AtomicU64,
}

/// Point-in-time copy of [`HostStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Packets read from the transport.
    pub packets_read: u64,
    /// Packets dropped because they failed to decode.
    pub decode_errors: u64,
    /// Packets of a type or channel the host does not handle.
    pub ignored_packets: u64,
    /// Frames fully written to the transport.
    pub frames_written: u64,
    /// Writes that accepted fewer bytes than the frame held.
    pub partial_writes: u64,
    /// Writes that failed.
    pub write_errors: u64,
    /// Reactive commands dropped on a full outbound queue.
    pub dropped_commands: u64,
    /// Application events dropped on a full event queue.
    pub dropped_events: u64,
    /// ATT response fragments dropped on a full outbound queue.
    pub dropped_att_responses: u64,
}

impl HostStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            packets_read: load(&self.packets_read),
            decode_errors: load(&self.decode_errors),
            ignored_packets: load(&self.ignored_packets),
            frames_written: load(&self.frames_written),
            partial_writes: load(&self.partial_writes),
            write_errors: load(&self.write_errors),
            dropped_commands: load(&self.dropped_commands),
            dropped_events: load(&self.dropped_events),
            dropped_att_responses: load(&self.dropped_att_responses),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = HostStats::default();
        HostStats::incr(&stats.frames_written);
        HostStats::incr(&stats.frames_written);
        HostStats::incr(&stats.dropped_events);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_written, 2);
        assert_eq!(snap.dropped_events, 1);
        assert_eq!(snap.packets_read, 0);
    }
}
