//! The BOOTP/DHCPv4 wire codec: spec.md §4.2's fixed 236-byte header,
//! the 4-byte magic cookie, and the options area this module hands off
//! to [`super::options`].
//!
//! There is no `frozenpeach-dev-core` DHCP codec to ground this on
//! directly (the teacher's DHCP parsing lived in the sibling
//! `frozenpeach-dev-dhcp` repo, which this pack does not carry
//! end-to-end); the byte-layout constants below come straight from RFC
//! 2131 §2 and are exercised by the tests at the bottom of this file.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::core::avp::{AttrValue, Avp};
use crate::core::dhcp_header::DhcpHeader;
use crate::core::dictionary::Dictionary;
use crate::core::errors::DecodeError;
use crate::core::hwaddr::HardwareAddress;
use crate::core::packet::{DHCP_CODE_OFFSET, Packet, SocketLabel};

use super::message_type::MessageType;
use super::options::{decode_options, encode_options, OPT_MESSAGE_TYPE};

const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const FIXED_HEADER_LEN: usize = 236;
const OPTIONS_OFFSET: usize = FIXED_HEADER_LEN + 4;
/// spec.md §4.2: datagrams shorter than this are rejected outright.
const MIN_FRAME_LEN: usize = 244;
/// 1500 (typical Ethernet MTU) minus 40 bytes of IP/UDP header.
const MAX_FRAME_LEN: usize = 1500 - 40;
/// The minimum total frame size a compliant encoder pads replies up to
/// (spec.md §4.2), well below the 576-byte IP datagram floor most
/// clients assume.
const MIN_ENCODED_LEN: usize = 300;
const MTU_FLOOR: u16 = 576;
const VENDOR_CLASS_IDENTIFIER_TAG: u8 = 60;
const MSFT98_VENDOR_CLASS: &str = "MSFT 98";

const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;

/// Decodes a raw BOOTP/DHCP datagram received on `src`/`dst` into a
/// [`Packet`]. `dict` resolves option tags to their array/type
/// metadata (spec.md §4.2); `DhcpDictionary` is the only implementation
/// this crate ships.
pub fn decode(
    dict: &dyn Dictionary,
    data: &[u8],
    src: SocketAddrV4,
    dst: SocketAddrV4,
    socket: SocketLabel,
) -> Result<Packet, DecodeError> {
    if data.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort {
            got: data.len(),
            min: MIN_FRAME_LEN,
        });
    }
    if data.len() > MAX_FRAME_LEN {
        return Err(DecodeError::TooLong {
            got: data.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let op = data[0];
    if op != BOOTREQUEST {
        return Err(DecodeError::BadHeader("op"));
    }
    let htype = data[1];
    if htype != 1 {
        return Err(DecodeError::BadHeader("htype"));
    }
    let hlen = data[2];
    if hlen != 6 {
        return Err(DecodeError::BadHeader("hlen"));
    }
    let hops = data[3];
    let xid = u32::from_be_bytes(data[4..8].try_into().unwrap());
    let secs = u16::from_be_bytes(data[8..10].try_into().unwrap());
    let flags = u16::from_be_bytes(data[10..12].try_into().unwrap());
    let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
    let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

    let mut chaddr_raw = [0u8; 16];
    chaddr_raw.copy_from_slice(&data[28..44]);
    let chaddr = HardwareAddress::new(chaddr_raw);

    let sname = trim_cstring(&data[44..108]);
    let file = trim_cstring(&data[108..236]);

    if data[236..240] != MAGIC_COOKIE {
        return Err(DecodeError::BadCookie);
    }
    // bytes 240..243: the first option must be Message-Type itself,
    // tag 53, length 1, value in [1, 7].
    if data[240] != OPT_MESSAGE_TYPE || data[241] != 1 {
        return Err(DecodeError::BadMessageType);
    }
    let message_type = MessageType::from_u8(data[242]).ok_or(DecodeError::BadMessageType)?;

    let mut vps = decode_options(dict, &data[OPTIONS_OFFSET..]);

    // Interface-MTU (26) below the floor is fatal; Maximum-DHCP-Message-Size
    // (57) below the floor is silently raised, and capped to the MTU if
    // the MTU is present and smaller.
    let mtu = find_short(&vps, 26);
    if let Some(value) = mtu {
        if value < MTU_FLOOR {
            return Err(DecodeError::BelowMtuFloor { option: 26, value });
        }
    }
    if let Some(avp) = vps.iter_mut().find(|a| a.is_dhcp() && a.dhcp_tag() == 57) {
        if let AttrValue::Short(mms) = &mut avp.value {
            if *mms < MTU_FLOOR {
                *mms = MTU_FLOOR;
            }
            if let Some(mtu) = mtu {
                if *mms > mtu {
                    *mms = mtu;
                }
            }
        }
    }

    let mut flags = flags;
    let mut header_bytes = data.to_vec();
    let vendor_class = vps
        .iter()
        .find(|a| a.is_dhcp() && a.dhcp_tag() == VENDOR_CLASS_IDENTIFIER_TAG)
        .and_then(|a| match &a.value {
            AttrValue::String(s) => Some(s.as_str()),
            _ => None,
        });
    if giaddr.is_unspecified()
        && message_type == MessageType::Request
        && vendor_class == Some(MSFT98_VENDOR_CLASS)
    {
        flags |= crate::core::dhcp_header::BROADCAST_FLAG;
        let flag_bytes = flags.to_be_bytes();
        header_bytes[10] = flag_bytes[0];
        header_bytes[11] = flag_bytes[1];
    }

    let header = DhcpHeader {
        htype,
        hlen,
        hops,
        secs,
        flags,
        ciaddr,
        yiaddr,
        siaddr,
        giaddr,
        chaddr,
        sname,
        file,
    };

    Ok(Packet {
        code: DHCP_CODE_OFFSET + message_type.as_u8() as u32,
        id: xid,
        authenticator: synthesize_dedup_vector(&chaddr, message_type),
        src,
        dst,
        socket,
        data: header_bytes,
        vps,
        dhcp_header: Some(header),
    })
}

fn find_short(vps: &[Avp], tag: u8) -> Option<u16> {
    vps.iter().find(|a| a.is_dhcp() && a.dhcp_tag() == tag).and_then(|a| match a.value {
        AttrValue::Short(v) => Some(v),
        _ => None,
    })
}

/// DHCP has no authenticator field to dedup on, so spec.md §4.2
/// synthesizes one from the client hardware address and message type:
/// distinct retransmissions of the same request hash identically,
/// while a DISCOVER and a REQUEST from the same client do not collide.
fn synthesize_dedup_vector(chaddr: &HardwareAddress, message_type: MessageType) -> [u8; 16] {
    let mut vector = [0u8; 16];
    vector[0..6].copy_from_slice(&chaddr.ethernet_bytes());
    vector[6] = message_type.as_u8();
    vector
}

/// Encodes `packet` back to wire bytes. `packet.dhcp_header` supplies
/// the fixed header fields; if absent (a reply built from scratch
/// without copying the request's header), zeroed defaults are used
/// except for fields the caller already set directly on `packet`, and
/// the xid is freshly randomized rather than copied from a
/// nonexistent original (spec.md §4.2).
pub fn encode(packet: &Packet) -> Vec<u8> {
    let had_header = packet.dhcp_header.is_some();
    let header = packet.dhcp_header.clone().unwrap_or_else(DhcpHeader::empty);
    let xid = if had_header { packet.id } else { rand::random() };

    let mut out = Vec::with_capacity(MIN_ENCODED_LEN);
    // This codec only ever encodes the server's reply (spec.md §4.2);
    // a client-role encoder would need opcode 1 (BOOTREQUEST) instead.
    out.push(BOOTREPLY);
    out.push(header.htype);
    out.push(header.hlen);
    out.push(header.hops);
    out.extend_from_slice(&xid.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // secs: always 0 on reply
    out.extend_from_slice(&header.flags.to_be_bytes());
    out.extend_from_slice(&header.ciaddr.octets());
    // yiaddr is the one header field a handler is expected to fill in;
    // siaddr/giaddr are always zero on a reply (spec.md §4.2).
    out.extend_from_slice(&header.yiaddr.octets());
    out.extend_from_slice(&Ipv4Addr::UNSPECIFIED.octets());
    out.extend_from_slice(&Ipv4Addr::UNSPECIFIED.octets());
    out.extend_from_slice(&header.chaddr.raw);
    // sname/file are legacy BOOTP fields this codec never populates on
    // reply; spec.md §4.2 calls for 192 bytes of zero padding here.
    out.resize(out.len() + 192, 0);
    out.extend_from_slice(&MAGIC_COOKIE);

    out.extend_from_slice(&encode_options(&packet.vps));

    if out.len() < MIN_ENCODED_LEN {
        out.resize(MIN_ENCODED_LEN, 0);
    }
    out
}

fn trim_cstring(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dictionary::DhcpDictionary;
    use std::net::Ipv4Addr;

    fn loopback(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    fn sample_discover() -> Vec<u8> {
        let mut buf = vec![0u8; 236];
        buf[0] = BOOTREQUEST;
        buf[1] = 1; // htype ethernet
        buf[2] = 6; // hlen
        buf[4..8].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        buf[28..34].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&[53, 1, 1]); // DHCP-Message-Type = DISCOVER
        buf.push(255); // end
        buf
    }

    #[test]
    fn decodes_a_discover_into_a_dhcp_coded_packet() {
        let dict = DhcpDictionary;
        let data = sample_discover();
        let packet = decode(&dict, &data, loopback(68), loopback(67), SocketLabel::Auth).unwrap();
        assert_eq!(packet.code, DHCP_CODE_OFFSET + 1);
        assert_eq!(packet.id, 0x1234_5678);
        assert!(packet.is_dhcp());
        assert_eq!(packet.dhcp_header.as_ref().unwrap().chaddr.ethernet_bytes(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn rejects_a_frame_with_a_bad_magic_cookie() {
        let dict = DhcpDictionary;
        let mut data = sample_discover();
        data[236] = 0;
        assert_eq!(
            decode(&dict, &data, loopback(68), loopback(67), SocketLabel::Auth).unwrap_err(),
            DecodeError::BadCookie
        );
    }

    #[test]
    fn rejects_a_frame_missing_the_message_type_option() {
        let dict = DhcpDictionary;
        let mut buf = vec![0u8; 236];
        buf[0] = BOOTREQUEST;
        buf[1] = 1;
        buf[2] = 6;
        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&[0, 0, 0, 255]); // pad, pad, pad, end -- no option 53
        assert_eq!(
            decode(&dict, &buf, loopback(68), loopback(67), SocketLabel::Auth).unwrap_err(),
            DecodeError::BadMessageType
        );
    }

    #[test]
    fn rejects_a_frame_shorter_than_244_bytes() {
        let dict = DhcpDictionary;
        let buf = vec![0u8; 100];
        assert_eq!(
            decode(&dict, &buf, loopback(68), loopback(67), SocketLabel::Auth).unwrap_err(),
            DecodeError::TooShort { got: 100, min: MIN_FRAME_LEN }
        );
    }

    #[test]
    fn encoding_without_an_original_header_uses_a_fresh_random_xid_rather_than_zero() {
        let mut packet = Packet::empty(SocketLabel::Dhcp);
        packet.code = DHCP_CODE_OFFSET + MessageType::Offer.as_u8() as u32;
        packet.id = 0; // no original request's xid to copy
        let encoded = encode(&packet);
        assert!(u32::from_be_bytes(encoded[4..8].try_into().unwrap()) != 0);
    }

    #[test]
    fn encoded_replies_are_padded_to_the_300_byte_floor() {
        let dict = DhcpDictionary;
        let data = sample_discover();
        let mut packet = decode(&dict, &data, loopback(68), loopback(67), SocketLabel::Auth).unwrap();
        packet.code = DHCP_CODE_OFFSET + MessageType::Offer.as_u8() as u32;
        let encoded = encode(&packet);
        assert!(encoded.len() >= MIN_ENCODED_LEN);
        assert_eq!(&encoded[236..240], &MAGIC_COOKIE);
    }

    #[test]
    fn mms_below_floor_is_silently_raised_rather_than_rejected() {
        let dict = DhcpDictionary;
        let mut buf = vec![0u8; 236];
        buf[0] = BOOTREQUEST;
        buf[1] = 1;
        buf[2] = 6;
        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&[53, 1, 1]);
        buf.extend_from_slice(&[57, 2, 0x00, 0x40]); // 64, below 576
        buf.push(255);
        let packet = decode(&dict, &buf, loopback(68), loopback(67), SocketLabel::Auth).unwrap();
        let mms = packet.find(crate::core::avp::DHCP_ATTR_OFFSET + 57).unwrap();
        assert_eq!(mms.value, AttrValue::Short(MTU_FLOOR));
    }

    #[test]
    fn mtu_below_floor_is_fatal() {
        let dict = DhcpDictionary;
        let mut buf = vec![0u8; 236];
        buf[0] = BOOTREQUEST;
        buf[1] = 1;
        buf[2] = 6;
        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&[53, 1, 1]);
        buf.extend_from_slice(&[26, 2, 0x00, 0x40]); // 64, below 576
        buf.push(255);
        assert_eq!(
            decode(&dict, &buf, loopback(68), loopback(67), SocketLabel::Auth).unwrap_err(),
            DecodeError::BelowMtuFloor { option: 26, value: 64 }
        );
    }

    #[test]
    fn msft98_vendor_class_forces_the_broadcast_bit_when_giaddr_is_zero() {
        let dict = DhcpDictionary;
        let mut buf = vec![0u8; 236];
        buf[0] = BOOTREQUEST;
        buf[1] = 1;
        buf[2] = 6;
        buf.extend_from_slice(&MAGIC_COOKIE);
        buf.extend_from_slice(&[53, 1, 3]); // REQUEST
        let vendor_class = b"MSFT 98";
        buf.push(60);
        buf.push(vendor_class.len() as u8);
        buf.extend_from_slice(vendor_class);
        buf.push(255);
        let packet = decode(&dict, &buf, loopback(68), loopback(67), SocketLabel::Auth).unwrap();
        assert!(packet.dhcp_header.unwrap().broadcast_requested());
        assert_eq!(packet.data[10] & 0x80, 0x80);
    }
}
