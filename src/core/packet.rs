//! The wire-level packet representation shared by every codec and by
//! the dispatcher. A `Packet` is produced by a codec's `decode` and
//! consumed by its `encode`; between those two points the dispatcher
//! only ever looks at `code`, `id`, `authenticator`, the socket
//! addresses, and `vps`.

use std::net::SocketAddrV4;

use super::avp::Avp;
use super::dhcp_header::DhcpHeader;

/// Which of the three bound sockets produced (or should carry) a
/// packet. spec.md's "socket handle" field is realized as this label
/// rather than a raw file descriptor: the dispatcher only ever needs
/// to know which of the three sockets is involved, for classification
/// (spec.md §4.1) and for sending the reply back out the same socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketLabel {
    Auth,
    Acct,
    Proxy,
    /// The DHCP listener. Not one of the three RADIUS sockets spec.md
    /// §4.1's main loop enumerates, but packets received on it feed the
    /// same [`crate::core::request_table::RequestTable`] via the
    /// `code`-space bridge (spec.md glossary).
    Dhcp,
}

/// RADIUS-space message codes this crate's dispatcher classifies
/// against (spec.md §4.1). The DHCP codec produces codes starting at
/// [`DHCP_CODE_OFFSET`], keeping the two code spaces disjoint so they
/// can share one request table without colliding.
pub mod code {
    pub const AUTH_REQUEST: u32 = 1;
    pub const AUTH_ACK: u32 = 2;
    pub const AUTH_REJECT: u32 = 3;
    pub const ACCT_REQUEST: u32 = 4;
    pub const ACCT_RESPONSE: u32 = 5;
    pub const PASSWORD_REQUEST: u32 = 7;
}

/// DHCP packet codes live at `DHCP_CODE_OFFSET + message_type`, a
/// disjoint namespace from the RADIUS codes in [`code`]. This is the
/// "pragmatic bridge" spec.md §9 calls out by name: it lets DHCP and
/// RADIUS requests share one [`crate::core::request_table::RequestTable`].
pub const DHCP_CODE_OFFSET: u32 = 1000;

/// One in-flight wire packet: inbound request or outbound reply.
#[derive(Debug, Clone)]
pub struct Packet {
    pub code: u32,
    /// 16-bit RADIUS id or 32-bit DHCP xid, widened to `u32` uniformly.
    pub id: u32,
    /// 16-byte dedup key. For RADIUS this is the real authenticator;
    /// for DHCP it is synthesized from `chaddr` + message type
    /// (spec.md §4.2) so both protocols can dedup through the same
    /// request table.
    pub authenticator: [u8; 16],
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub socket: SocketLabel,
    pub data: Vec<u8>,
    pub vps: Vec<Avp>,
    /// Present only for packets produced or consumed by the DHCP codec;
    /// `None` for RADIUS packets.
    pub dhcp_header: Option<DhcpHeader>,
}

impl Packet {
    pub fn empty(socket: SocketLabel) -> Self {
        Self {
            code: 0,
            id: 0,
            authenticator: [0; 16],
            src: SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0),
            dst: SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0),
            socket,
            data: Vec::new(),
            vps: Vec::new(),
            dhcp_header: None,
        }
    }

    pub fn is_dhcp(&self) -> bool {
        self.code >= DHCP_CODE_OFFSET
    }

    pub fn find(&self, attribute: u32) -> Option<&Avp> {
        self.vps.iter().find(|v| v.attribute == attribute)
    }

    pub fn find_all(&self, attribute: u32) -> impl Iterator<Item = &Avp> {
        self.vps.iter().filter(move |v| v.attribute == attribute)
    }
}

/// A simple PacketType boundary so the hook pipeline (grounded in
/// `hooks::hook_registry`) can be generic over what it carries while
/// this crate only ever instantiates it with [`Packet`].
pub trait PacketType {
    fn empty() -> Self;
}

impl PacketType for Packet {
    fn empty() -> Self {
        Packet::empty(SocketLabel::Auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dhcp_codes_are_disjoint_from_radius_codes() {
        let mut p = Packet::empty(SocketLabel::Auth);
        p.code = DHCP_CODE_OFFSET + 1;
        assert!(p.is_dhcp());
        p.code = code::AUTH_REQUEST;
        assert!(!p.is_dhcp());
    }
}
