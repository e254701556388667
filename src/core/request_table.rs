//! Request Table: a linked collection of Request Records (spec.md
//! §3/§4.3). The legacy singly-linked list rooted at `first_request` is
//! realized here as a `Vec<RequestRecord>` — an Open Question resolved
//! in DESIGN.md: admission order, sweep order and the invariant that no
//! two live records share `(src_ip, id, vector)` all survive the switch
//! to a `Vec`, and Rust gives us bounds-checked iteration for free
//! where the original needed manual `prev`/`cur` pointer juggling.

use std::net::Ipv4Addr;

use chrono::Utc;
use log::{debug, trace, warn};

use super::packet::Packet;
use super::request::{RequestRecord, WorkerHandle};

/// Retention window after worker completion during which
/// retransmissions replay the cached reply (spec.md glossary).
pub const CLEANUP_DELAY_SECS: i64 = 5;
/// Worker watchdog horizon (spec.md glossary).
pub const MAX_REQUEST_TIME_SECS: i64 = 30;
/// Upper bound on live Request Records (spec.md glossary).
pub const MAX_REQUESTS: usize = 256;

/// Result of [`RequestTable::admit`].
pub enum AdmitOutcome {
    /// `new` was appended; dispatch it to a handler.
    Accepted,
    /// A live record already holds this `(src_ip, id, vector)` tuple.
    /// `Some(reply)` means a cached reply exists and should be
    /// retransmitted verbatim; `None` means silently drop.
    Duplicate(Option<Packet>),
    /// The table is at or over [`MAX_REQUESTS`]; drop and log.
    Overload,
}

#[derive(Default)]
pub struct RequestTable {
    records: Vec<RequestRecord>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Implements spec.md §4.3's `admit` operation verbatim, modulo the
    /// `busy` flag: that flag existed to defer reaper mutation while a
    /// signal-handler-driven reaper might run concurrently with
    /// admission. In the single-task dispatcher model here the reaper
    /// only ever runs between main-loop iterations, never inside
    /// `admit`, so there is nothing to defer against.
    pub fn admit(&mut self, new: RequestRecord) -> AdmitOutcome {
        let now = Utc::now();
        let new_key = new.dedup_key();

        let mut i = 0;
        while i < self.records.len() {
            let stale = self.records[i].worker_handle.is_none()
                && (now - self.records[i].timestamp).num_seconds() >= CLEANUP_DELAY_SECS;
            if stale {
                trace!(
                    "sweeping retired request {:?} (age >= {}s)",
                    self.records[i].dedup_key(),
                    CLEANUP_DELAY_SECS
                );
                self.records.remove(i);
                continue;
            }

            if self.records[i].dedup_key() == new_key {
                if self.records[i].vector_matches(&new.packet.authenticator) {
                    let reply = self.records[i].reply.clone();
                    debug!("duplicate request {new_key:?}, {}", if reply.is_some() {
                        "retransmitting cached reply"
                    } else {
                        "dropping silently (no reply cached yet)"
                    });
                    return AdmitOutcome::Duplicate(reply);
                }

                // Same (src_ip, id), different vector: an id collision
                // rather than a true retransmission.
                if self.records[i].finished {
                    self.records[i].worker_handle.abort();
                    self.records[i].worker_handle = WorkerHandle::None;
                    self.records[i].timestamp =
                        now - chrono::Duration::seconds(CLEANUP_DELAY_SECS);
                    // Restart the check at this position: the record
                    // just became sweep-eligible.
                    continue;
                }
                // Keep it and keep scanning; the new record may still
                // collide with something further down the table.
                i += 1;
                continue;
            }

            if !self.records[i].worker_handle.is_none()
                && (now - self.records[i].timestamp).num_seconds() >= MAX_REQUEST_TIME_SECS
            {
                warn!(
                    "worker for request {:?} exceeded {}s, terminating",
                    self.records[i].dedup_key(),
                    MAX_REQUEST_TIME_SECS
                );
                self.records[i].worker_handle.abort();
                self.records[i].worker_handle = WorkerHandle::None;
            }

            i += 1;
        }

        if self.records.len() > MAX_REQUESTS {
            warn!("request table overload, rejecting {new_key:?}");
            return AdmitOutcome::Overload;
        }

        self.records.push(new);
        AdmitOutcome::Accepted
    }

    /// Applies a worker's completion, reported via the message-passing
    /// reaper (spec.md §9's redesign of the signal-driven reaper).
    /// Finds the matching record by `(src_ip, id)`, fills the reply,
    /// clears the worker handle and bumps `timestamp` so the record
    /// becomes sweep-eligible after `CLEANUP_DELAY_SECS`.
    pub fn complete(&mut self, key: (Ipv4Addr, u32), reply: Option<Packet>) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.dedup_key() == key)
        {
            record.respond(reply);
            record.worker_handle = WorkerHandle::None;
            record.timestamp = Utc::now();
        }
    }

    /// Attaches a task handle to the record just accepted, so the
    /// watchdog in a later `admit` call can abort it if it overruns.
    pub fn set_worker(&mut self, key: (Ipv4Addr, u32), handle: WorkerHandle) {
        if let Some(record) = self.records.iter_mut().find(|r| r.dedup_key() == key) {
            record.worker_handle = handle;
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: (Ipv4Addr, u32)) -> Option<&RequestRecord> {
        self.records.iter().find(|r| r.dedup_key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::SocketLabel;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn packet(ip: Ipv4Addr, id: u32, vector: [u8; 16]) -> Packet {
        let mut p = Packet::empty(SocketLabel::Auth);
        p.src = SocketAddrV4::new(ip, 1812);
        p.id = id;
        p.authenticator = vector;
        p
    }

    #[test]
    fn duplicate_tuple_before_any_reply_is_rejected_and_table_size_is_unchanged() {
        let mut table = RequestTable::new();
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let vector = [7u8; 16];
        assert!(matches!(
            table.admit(RequestRecord::new(packet(ip, 7, vector), vec![])),
            AdmitOutcome::Accepted
        ));
        assert!(matches!(
            table.admit(RequestRecord::new(packet(ip, 7, vector), vec![])),
            AdmitOutcome::Duplicate(None)
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn cached_reply_is_retransmitted_verbatim_within_the_cleanup_window() {
        let mut table = RequestTable::new();
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let vector = [7u8; 16];
        table.admit(RequestRecord::new(packet(ip, 7, vector), vec![]));

        let reply = packet(ip, 7, vector);
        table.complete((ip, 7), Some(reply.clone()));

        match table.admit(RequestRecord::new(packet(ip, 7, vector), vec![])) {
            AdmitOutcome::Duplicate(Some(cached)) => {
                assert_eq!(cached.id, reply.id);
                assert_eq!(cached.authenticator, reply.authenticator);
            }
            _ => panic!("expected a cached duplicate reply"),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn overload_rejects_once_past_max_requests() {
        let mut table = RequestTable::new();
        for i in 0..=MAX_REQUESTS {
            let outcome = table.admit(RequestRecord::new(
                packet(Ipv4Addr::new(10, 0, 0, 1), i as u32, [i as u8; 16]),
                vec![],
            ));
            if i < MAX_REQUESTS {
                assert!(matches!(outcome, AdmitOutcome::Accepted), "index {i}");
            }
        }
        let outcome = table.admit(RequestRecord::new(
            packet(Ipv4Addr::new(10, 0, 0, 1), 99999, [9u8; 16]),
            vec![],
        ));
        assert!(matches!(outcome, AdmitOutcome::Overload));
    }
}
