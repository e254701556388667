//! DHCP message types (RFC 2131 §3, RFC 2132 §9.6) and the packet-code
//! bridge spec.md §4.2 describes: `code <- DHCP_CODE_OFFSET +
//! message_type` so DHCP packets live in a code space disjoint from
//! RADIUS codes while still sharing one request table.

use crate::core::avp::DHCP_ATTR_OFFSET;

/// The DHCP-Message-Type option tag (53), namespaced into the AVP
/// attribute space.
pub const DHCP_MSG_TYPE_ATTR: u32 = DHCP_ATTR_OFFSET + 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => MessageType::Discover,
            2 => MessageType::Offer,
            3 => MessageType::Request,
            4 => MessageType::Decline,
            5 => MessageType::Ack,
            6 => MessageType::Nak,
            7 => MessageType::Release,
            _ => return None,
        })
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_range_is_one_through_seven() {
        for v in 1u8..=7 {
            assert!(MessageType::from_u8(v).is_some());
        }
        assert!(MessageType::from_u8(0).is_none());
        assert!(MessageType::from_u8(8).is_none());
    }
}
