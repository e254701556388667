//! The wire-codec trait boundary spec.md §6 describes: both the DHCPv4
//! codec and the RADIUS codec are meant to satisfy the same
//! `decode`/`encode` contract, but only the DHCPv4 side ships a body
//! here — RADIUS packet layout is an external collaborator (spec.md
//! §1) this crate only defines the seam for.

use std::net::SocketAddrV4;

use crate::core::dictionary::DhcpDictionary;
use crate::core::errors::DecodeError;
use crate::core::packet::{Packet, SocketLabel};

/// A protocol's byte ↔ [`Packet`] translation, plus the authenticator
/// check the dispatcher runs before admission (spec.md §4.1 step 6).
/// `verify_authenticator` defaults to permissive because that check is
/// protocol-specific (DHCP has no authenticator to verify at all; a
/// real RADIUS implementation would run the RFC 2865 MD5 check here).
pub trait Codec: Send + Sync {
    fn decode(
        &self,
        data: &[u8],
        src: SocketAddrV4,
        dst: SocketAddrV4,
        socket: SocketLabel,
    ) -> Result<Packet, DecodeError>;

    fn encode(&self, packet: &Packet) -> Vec<u8>;

    fn verify_authenticator(&self, _packet: &Packet, _secret: &[u8]) -> bool {
        true
    }
}

/// The only [`Codec`] this crate actually implements. Stateless: the
/// DHCP option dictionary it delegates to ([`DhcpDictionary`]) carries
/// no per-instance configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct DhcpCodec;

impl Codec for DhcpCodec {
    fn decode(
        &self,
        data: &[u8],
        src: SocketAddrV4,
        dst: SocketAddrV4,
        socket: SocketLabel,
    ) -> Result<Packet, DecodeError> {
        crate::dhcp::codec::decode(&DhcpDictionary, data, src, dst, socket)
    }

    fn encode(&self, packet: &Packet) -> Vec<u8> {
        crate::dhcp::codec::encode(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn dhcp_codec_round_trips_through_the_trait_object() {
        let codec: &dyn Codec = &DhcpCodec;
        let mut buf = vec![0u8; 236];
        buf[0] = 1;
        buf[1] = 1;
        buf[2] = 6;
        buf.extend_from_slice(&[0x63, 0x82, 0x53, 0x63]);
        buf.extend_from_slice(&[53, 1, 1]);
        buf.push(255);

        let src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 68);
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 254), 67);
        let packet = codec.decode(&buf, src, dst, SocketLabel::Dhcp).unwrap();
        assert!(packet.is_dhcp());
        let encoded = codec.encode(&packet);
        assert!(encoded.len() >= 300);
    }
}
