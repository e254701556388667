//! Response routing for DHCP replies (spec.md §4.2): which address a
//! reply gets unicast or broadcast to, derived from the *original*
//! request's header rather than anything in the reply itself.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::core::dhcp_header::DhcpHeader;
use crate::core::packet::Packet;

const BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;
const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;

/// `DHCP-Message-Type` value for NAK, used by routing rule 2. Defined
/// here rather than imported from [`super::message_type`] to avoid a
/// dependency cycle; it is the same constant as
/// [`super::message_type::MessageType::Nak`].
const NAK: u8 = 6;

/// Picks the destination address/port for a DHCP reply, and stamps
/// `reply`'s `src`/`dst` accordingly. First match wins (spec.md §4.2):
/// 1. Non-zero `giaddr` on the original request → send to `giaddr`.
/// 2. `code == NAK` → broadcast.
/// 3. Non-zero `ciaddr` on the original request → unicast to `ciaddr`.
/// 4. Broadcast flag set on the original request → broadcast.
/// 5. Destination still unspecified after the prior rules → broadcast.
/// 6. Otherwise → unicast to `yiaddr` (from the reply itself).
pub fn route_reply(request_header: &DhcpHeader, reply: &mut Packet) {
    let message_type = (reply.code - crate::core::packet::DHCP_CODE_OFFSET) as u8;

    let dest_ip = if !request_header.giaddr.is_unspecified() {
        request_header.giaddr
    } else if message_type == NAK {
        BROADCAST
    } else if !request_header.ciaddr.is_unspecified() {
        request_header.ciaddr
    } else if request_header.broadcast_requested() {
        BROADCAST
    } else {
        let yiaddr = reply
            .dhcp_header
            .as_ref()
            .map(|h| h.yiaddr)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        if yiaddr.is_unspecified() {
            BROADCAST
        } else {
            yiaddr
        }
    };

    // Source address is the original request's destination; ports swap.
    reply.src = SocketAddrV4::new(reply.dst.ip().to_owned(), DHCP_SERVER_PORT);
    reply.dst = SocketAddrV4::new(dest_ip, DHCP_CLIENT_PORT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{SocketLabel, DHCP_CODE_OFFSET};

    fn request_header() -> DhcpHeader {
        DhcpHeader::empty()
    }

    fn reply_packet(message_type: u8, yiaddr: Ipv4Addr) -> Packet {
        let mut reply = Packet::empty(SocketLabel::Auth);
        reply.code = DHCP_CODE_OFFSET + message_type as u32;
        reply.src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 67);
        reply.dst = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 68);
        let mut header = DhcpHeader::empty();
        header.yiaddr = yiaddr;
        reply.dhcp_header = Some(header);
        reply
    }

    #[test]
    fn non_zero_giaddr_wins_over_everything_else() {
        let mut original = request_header();
        original.giaddr = Ipv4Addr::new(192, 168, 1, 1);
        original.ciaddr = Ipv4Addr::new(192, 168, 1, 50);
        let mut reply = reply_packet(2, Ipv4Addr::new(192, 168, 1, 100));
        route_reply(&original, &mut reply);
        assert_eq!(*reply.dst.ip(), Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn nak_always_broadcasts() {
        let original = request_header();
        let mut reply = reply_packet(6, Ipv4Addr::UNSPECIFIED);
        route_reply(&original, &mut reply);
        assert_eq!(*reply.dst.ip(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn non_zero_ciaddr_is_unicast_when_no_giaddr_and_not_a_nak() {
        let mut original = request_header();
        original.ciaddr = Ipv4Addr::new(10, 1, 1, 5);
        let mut reply = reply_packet(5, Ipv4Addr::new(10, 1, 1, 5));
        route_reply(&original, &mut reply);
        assert_eq!(*reply.dst.ip(), Ipv4Addr::new(10, 1, 1, 5));
    }

    #[test]
    fn broadcast_flag_wins_when_ciaddr_and_giaddr_are_both_zero() {
        let mut original = request_header();
        original.flags = crate::core::dhcp_header::BROADCAST_FLAG;
        let mut reply = reply_packet(2, Ipv4Addr::new(10, 1, 1, 9));
        route_reply(&original, &mut reply);
        assert_eq!(*reply.dst.ip(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn falls_back_to_unicasting_the_offered_yiaddr() {
        let original = request_header();
        let mut reply = reply_packet(2, Ipv4Addr::new(10, 1, 1, 42));
        route_reply(&original, &mut reply);
        assert_eq!(*reply.dst.ip(), Ipv4Addr::new(10, 1, 1, 42));
    }

    #[test]
    fn broadcasts_when_yiaddr_is_also_unset() {
        let original = request_header();
        let mut reply = reply_packet(2, Ipv4Addr::UNSPECIFIED);
        route_reply(&original, &mut reply);
        assert_eq!(*reply.dst.ip(), Ipv4Addr::BROADCAST);
    }
}
