//! Request Record: in-flight work descriptor (spec.md §3). Created at
//! admission, mutated by the dispatcher (admit), the worker (fill
//! reply), the reaper (clear worker handle, bump timestamp), and
//! destroyed by the table sweeper.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::packet::Packet;

/// §9's fork-per-request → task-per-request redesign: a live worker is
/// a cancellable tokio task rather than a child process. `abort` lets
/// the watchdog in [`crate::core::request_table::RequestTable::admit`]
/// cancel a task that has exceeded `MAX_REQUEST_TIME` without waiting
/// for it to notice.
pub enum WorkerHandle {
    None,
    Task(JoinHandle<()>),
}

impl WorkerHandle {
    pub fn is_none(&self) -> bool {
        matches!(self, WorkerHandle::None)
    }

    /// Aborts the task if one is running. A no-op otherwise.
    pub fn abort(&self) {
        if let WorkerHandle::Task(handle) = self {
            handle.abort();
        }
    }
}

/// In-flight work descriptor. Invariant (spec.md §3): a record with
/// `worker_handle == WorkerHandle::None` is either freshly admitted and
/// awaiting inline execution, or a completed record eligible for
/// cleanup after `CLEANUP_DELAY` seconds of the reaper having cleared it.
pub struct RequestRecord {
    pub packet: Packet,
    pub reply: Option<Packet>,
    pub proxy: Option<Packet>,
    pub secret: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub worker_handle: WorkerHandle,
    pub finished: bool,
}

impl RequestRecord {
    pub fn new(packet: Packet, secret: Vec<u8>) -> Self {
        Self {
            packet,
            reply: None,
            proxy: None,
            secret,
            timestamp: Utc::now(),
            worker_handle: WorkerHandle::None,
            finished: false,
        }
    }

    /// `(src_ip, id, authenticator)` dedup key used by
    /// [`crate::core::request_table::RequestTable::admit`].
    pub fn dedup_key(&self) -> (std::net::Ipv4Addr, u32) {
        (*self.packet.src.ip(), self.packet.id)
    }

    pub fn vector_matches(&self, other: &[u8; 16]) -> bool {
        self.packet.authenticator == *other
    }

    /// Marks the record finished: sends `reply` if present (the caller
    /// is expected to actually put it on the wire) and flips
    /// `finished`. Mirrors spec.md §4.4's `respond`.
    pub fn respond(&mut self, reply: Option<Packet>) {
        self.reply = reply;
        self.finished = true;
    }

    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.timestamp).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::SocketLabel;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn packet(ip: Ipv4Addr, id: u32) -> Packet {
        let mut p = Packet::empty(SocketLabel::Auth);
        p.src = SocketAddrV4::new(ip, 1812);
        p.id = id;
        p
    }

    #[test]
    fn fresh_record_has_no_worker_and_is_unfinished() {
        let record = RequestRecord::new(packet(Ipv4Addr::new(10, 0, 0, 1), 7), vec![]);
        assert!(record.worker_handle.is_none());
        assert!(!record.finished);
    }

    #[test]
    fn respond_marks_finished_and_stores_reply() {
        let mut record = RequestRecord::new(packet(Ipv4Addr::new(10, 0, 0, 1), 7), vec![]);
        record.respond(Some(packet(Ipv4Addr::new(10, 0, 0, 1), 7)));
        assert!(record.finished);
        assert!(record.reply.is_some());
    }
}
