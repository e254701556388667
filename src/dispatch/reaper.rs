//! Message-passing reaper (spec.md §9's redesign of the signal-driven
//! reaper + `busy` flag). Every worker task — spawned or inline — sends
//! one [`WorkerExit`] down this channel on completion; the dispatcher
//! drains it non-blockingly at the top of each main-loop iteration
//! (spec.md §4.5) and folds each exit into the
//! [`crate::core::request_table::RequestTable`].

use std::net::Ipv4Addr;

use log::trace;
use tokio::sync::mpsc;

use crate::core::packet::Packet;
use crate::core::request_table::RequestTable;

/// One worker's outcome: which record it was running for, and the
/// reply to cache (if any) so a retransmission within `CLEANUP_DELAY`
/// can replay it verbatim.
pub struct WorkerExit {
    pub key: (Ipv4Addr, u32),
    pub reply: Option<Packet>,
}

pub fn channel() -> (mpsc::UnboundedSender<WorkerExit>, mpsc::UnboundedReceiver<WorkerExit>) {
    mpsc::unbounded_channel()
}

/// Drains every exit notification currently queued, applying each to
/// `table`. Never blocks: an empty channel returns immediately.
pub fn drain(receiver: &mut mpsc::UnboundedReceiver<WorkerExit>, table: &mut RequestTable) {
    while let Ok(exit) = receiver.try_recv() {
        trace!("reaping worker for {:?}", exit.key);
        table.complete(exit.key, exit.reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::SocketLabel;
    use crate::core::request::RequestRecord;
    use std::net::SocketAddrV4;

    #[test]
    fn drain_applies_every_queued_exit_to_the_table() {
        let (tx, mut rx) = channel();
        let ip = Ipv4Addr::new(10, 0, 0, 1);

        let mut table = RequestTable::new();
        let mut packet = Packet::empty(SocketLabel::Auth);
        packet.src = SocketAddrV4::new(ip, 1812);
        packet.id = 5;
        table.admit(RequestRecord::new(packet, vec![]));

        tx.send(WorkerExit { key: (ip, 5), reply: None }).unwrap();
        drop(tx);

        drain(&mut rx, &mut table);
        assert!(table.get((ip, 5)).unwrap().finished);
    }
}
