//! DHCP option parsing and serialization: spec.md §4.2's array and
//! aggregation semantics, the tag 0x3d (Client-Identifier) special
//! case, the Message-Type-first / Relay-Agent-Information-last sort
//! order, run coalescing, and the Option 82 nested TLV.

use log::{trace, warn};

use crate::core::avp::{AttrValue, Avp, DHCP_ATTR_OFFSET};
use crate::core::dictionary::{AttributeDef, Dictionary};

/// Circuit-ID / Remote-ID / other RFC 3046 Relay-Agent-Information
/// sub-options live in their own namespace slice so the generic
/// "coalesce consecutive AVPs with the same attribute id" encode rule
/// keeps each sub-option as a distinct wire entry while all of them
/// still sort after every plain DHCP option (§4.2 rule 2).
pub const DHCP_OPT82_ATTR_OFFSET: u32 = DHCP_ATTR_OFFSET + 0x1_0000;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_RELAY_AGENT_INFORMATION: u8 = 82;
pub const OPT_CLIENT_IDENTIFIER: u8 = 0x3d;
pub const OPT_PAD: u8 = 0;
pub const OPT_END: u8 = 255;
const MAX_OPTION_LEN: usize = 252;

pub fn opt82_sub_attr(sub_tag: u8) -> u32 {
    DHCP_OPT82_ATTR_OFFSET + sub_tag as u32
}

/// `DHCP_UNPACK_OPTION1` from spec.md §4.2/§9: recovers the Option 82
/// sub-tag an AVP's attribute id was packed with.
pub fn unpack_suboption(attribute: u32) -> u8 {
    (attribute - DHCP_OPT82_ATTR_OFFSET) as u8
}

fn array_width(attr_type: crate::core::avp::AttrType) -> Option<usize> {
    use crate::core::avp::AttrType::*;
    match attr_type {
        Byte => Some(1),
        Short => Some(2),
        Integer | Ipaddr | Date => Some(4),
        Ethernet | String | Octets => None,
    }
}

fn decode_fixed(attr_type: crate::core::avp::AttrType, bytes: &[u8]) -> Option<AttrValue> {
    use crate::core::avp::AttrType::*;
    match attr_type {
        Byte if bytes.len() == 1 => Some(AttrValue::Byte(bytes[0])),
        Short if bytes.len() == 2 => Some(AttrValue::Short(u16::from_be_bytes(bytes.try_into().ok()?))),
        Integer if bytes.len() == 4 => Some(AttrValue::Integer(u32::from_be_bytes(bytes.try_into().ok()?))),
        Ipaddr if bytes.len() == 4 => Some(AttrValue::Ipaddr(std::net::Ipv4Addr::new(
            bytes[0], bytes[1], bytes[2], bytes[3],
        ))),
        Date if bytes.len() == 4 => {
            let secs = u32::from_be_bytes(bytes.try_into().ok()?);
            Some(AttrValue::Date(
                chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0)?,
            ))
        }
        _ => None,
    }
}

/// Walks a raw options buffer (the bytes following the 4-byte magic
/// cookie) and produces the AVP list. `data` must already exclude the
/// cookie; parsing stops at a `0xff` end marker, buffer exhaustion, or
/// an unrecoverable overrun.
pub fn decode_options(dict: &dyn Dictionary, data: &[u8]) -> Vec<Avp> {
    let mut avps = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        let tag = data[i];
        if tag == OPT_PAD {
            i += 1;
            continue;
        }
        if tag == OPT_END {
            break;
        }
        if i + 1 >= data.len() {
            break;
        }
        let len = data[i + 1] as usize;
        if len > MAX_OPTION_LEN {
            warn!("option {tag} declared length {len} over the {MAX_OPTION_LEN}-byte cap, skipping");
            i += 2;
            continue;
        }
        let value_start = i + 2;
        if value_start + len > data.len() {
            warn!("option {tag} length {len} overruns the remaining buffer");
            break;
        }
        let value = &data[value_start..value_start + len];
        i = value_start + len;

        if tag == OPT_CLIENT_IDENTIFIER && len == 7 && value[0] == 1 {
            let bytes: [u8; 6] = value[1..7].try_into().unwrap();
            avps.push(Avp::dhcp(
                tag,
                AttrValue::Ethernet(crate::core::hwaddr::HardwareAddress::from_ethernet(bytes)),
            ));
            continue;
        }

        if tag == OPT_RELAY_AGENT_INFORMATION {
            avps.extend(decode_relay_agent_information(value));
            continue;
        }

        let def = match dict.lookup(tag) {
            Some(def) => def,
            None => {
                trace!("unknown DHCP option {tag}, skipping");
                continue;
            }
        };

        if def.array {
            if let Some(entries) = split_array(&def, value) {
                for entry in entries {
                    avps.push(Avp::dhcp(tag, entry));
                }
                continue;
            }
            // Non-divisible length: fall back to raw octets for the
            // whole value (spec.md §4.2).
            avps.push(Avp::dhcp(tag, AttrValue::Octets(value.to_vec())));
            continue;
        }

        if let Some(width) = def.attr_type.fixed_width() {
            if value.len() != width {
                avps.push(Avp::dhcp(tag, AttrValue::Octets(value.to_vec())));
                continue;
            }
        }

        let decoded = match def.attr_type {
            crate::core::avp::AttrType::String => {
                let s = String::from_utf8_lossy(value).trim_end_matches('\0').to_string();
                if s.is_empty() {
                    continue;
                }
                AttrValue::String(s)
            }
            crate::core::avp::AttrType::Octets => AttrValue::Octets(value.to_vec()),
            other => decode_fixed(other, value).unwrap_or_else(|| AttrValue::Octets(value.to_vec())),
        };
        avps.push(Avp::dhcp(tag, decoded));
    }

    avps
}

fn split_array(def: &AttributeDef, value: &[u8]) -> Option<Vec<AttrValue>> {
    let width = array_width(def.attr_type)?;
    if width == 0 || value.len() % width != 0 || value.is_empty() {
        return None;
    }
    let mut out = Vec::with_capacity(value.len() / width);
    for chunk in value.chunks(width) {
        out.push(decode_fixed(def.attr_type, chunk)?);
    }
    Some(out)
}

fn decode_relay_agent_information(value: &[u8]) -> Vec<Avp> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 1 < value.len() {
        let sub_tag = value[i];
        let sub_len = value[i + 1] as usize;
        let start = i + 2;
        if start + sub_len > value.len() {
            break;
        }
        out.push(Avp::new(
            opt82_sub_attr(sub_tag),
            AttrValue::Octets(value[start..start + sub_len].to_vec()),
        ));
        i = start + sub_len;
    }
    out
}

/// Ordering key used to sort AVPs before serialization (spec.md §4.2):
/// Message-Type first, Relay-Agent-Information (and its sub-options)
/// last, everything else by ascending attribute id.
fn sort_key(avp: &Avp) -> (u8, u32) {
    if avp.attribute >= DHCP_OPT82_ATTR_OFFSET {
        return (2, avp.attribute);
    }
    if avp.is_dhcp() && avp.dhcp_tag() == OPT_MESSAGE_TYPE {
        return (0, avp.attribute);
    }
    if avp.is_dhcp() && avp.dhcp_tag() == OPT_RELAY_AGENT_INFORMATION {
        return (2, avp.attribute);
    }
    (1, avp.attribute)
}

/// Serializes a packet's AVP list into a DHCP options buffer
/// (everything after the magic cookie, including the trailing `0xff
/// 0x00` end marker but excluding any further BOOTP padding).
pub fn encode_options(avps: &[Avp]) -> Vec<u8> {
    let mut sorted: Vec<&Avp> = avps.iter().filter(|a| a.is_dhcp() || a.attribute >= DHCP_OPT82_ATTR_OFFSET).collect();
    sorted.sort_by_key(|a| sort_key(a));

    let mut out = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let attribute = sorted[i].attribute;
        let mut run = vec![sorted[i]];
        let mut j = i + 1;
        while j < sorted.len() && sorted[j].attribute == attribute {
            run.push(sorted[j]);
            j += 1;
        }
        i = j;

        if attribute >= DHCP_OPT82_ATTR_OFFSET {
            encode_opt82_run(&run, &mut out);
            continue;
        }

        let tag = run[0].dhcp_tag();

        if tag == OPT_CLIENT_IDENTIFIER
            && run.len() == 1
            && run[0].attr_type() == crate::core::avp::AttrType::Ethernet
        {
            if let AttrValue::Ethernet(hw) = &run[0].value {
                let mut payload = vec![1u8];
                payload.extend_from_slice(&hw.ethernet_bytes());
                push_option(&mut out, tag, &payload);
                continue;
            }
        }

        let mut payload = Vec::new();
        let mut overflowed = false;
        for avp in &run {
            let bytes = avp.value.to_bytes();
            if payload.len() + bytes.len() > 255 {
                warn!("option {tag} run exceeds 255 bytes coalesced, dropping remaining entries");
                overflowed = true;
                break;
            }
            payload.extend_from_slice(&bytes);
        }
        if payload.is_empty() && overflowed {
            continue;
        }
        push_option(&mut out, tag, &payload);
    }

    out.push(OPT_END);
    out.push(0);
    out
}

fn encode_opt82_run(run: &[&Avp], out: &mut Vec<u8>) {
    for avp in run {
        let sub_tag = unpack_suboption(avp.attribute);
        let inner = avp.value.to_bytes();
        let mut payload = vec![sub_tag, inner.len() as u8];
        payload.extend_from_slice(&inner);
        push_option(out, OPT_RELAY_AGENT_INFORMATION, &payload);
    }
}

fn push_option(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dictionary::DhcpDictionary;

    #[test]
    fn message_type_sorts_first_and_relay_agent_last() {
        let avps = vec![
            Avp::dhcp(OPT_RELAY_AGENT_INFORMATION, AttrValue::Octets(vec![])),
            Avp::dhcp(55, AttrValue::Byte(1)),
            Avp::dhcp(OPT_MESSAGE_TYPE, AttrValue::Byte(1)),
        ];
        let encoded = encode_options(&avps);
        assert_eq!(encoded[0], OPT_MESSAGE_TYPE);
        assert_eq!(&encoded[encoded.len() - 2..], &[OPT_END, 0]);
    }

    #[test]
    fn parameter_request_list_decodes_as_three_byte_entries() {
        let dict = DhcpDictionary;
        let options = [55u8, 3, 1, 3, 6, OPT_END];
        let avps = decode_options(&dict, &options);
        let prl: Vec<_> = avps.iter().filter(|a| a.dhcp_tag() == 55).collect();
        assert_eq!(prl.len(), 3);
    }

    #[test]
    fn client_identifier_ethernet_round_trips_through_the_type_1_prefix() {
        let dict = DhcpDictionary;
        let options = [OPT_CLIENT_IDENTIFIER, 7, 1, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, OPT_END];
        let avps = decode_options(&dict, &options);
        let client_id = avps.iter().find(|a| a.dhcp_tag() == OPT_CLIENT_IDENTIFIER).unwrap();
        assert_eq!(client_id.attr_type(), crate::core::avp::AttrType::Ethernet);

        let encoded = encode_options(&[client_id.clone()]);
        assert_eq!(&encoded[0..2], &[OPT_CLIENT_IDENTIFIER, 7]);
        assert_eq!(encoded[2], 1);
    }

    #[test]
    fn option_82_round_trips_as_a_nested_tlv() {
        let avp = Avp::new(opt82_sub_attr(1), AttrValue::Octets(vec![0x01, 0x02, 0x03]));
        let encoded = encode_options(&[avp]);
        assert_eq!(encoded[0], OPT_RELAY_AGENT_INFORMATION);
        assert_eq!(encoded[1], 5); // inner length (2) + inner payload (3)
        assert_eq!(encoded[2], 1); // sub-tag
        assert_eq!(encoded[3], 3); // inner length

        let dict = DhcpDictionary;
        let decoded = decode_options(&dict, &encoded);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].attribute, opt82_sub_attr(1));
    }

    #[test]
    fn non_divisible_array_length_falls_back_to_raw_octets() {
        let dict = DhcpDictionary;
        let options = [55u8, 2, 1, 3, OPT_END]; // width 1, divisible actually; use ipaddr-array with odd length instead
        let avps = decode_options(&dict, &options);
        assert_eq!(avps.len(), 2);

        let bad_router = [3u8, 3, 10, 0, 0, OPT_END]; // Router is ipaddr[], width 4, length 3 not divisible
        let avps = decode_options(&dict, &bad_router);
        assert_eq!(avps[0].attr_type(), crate::core::avp::AttrType::Octets);
    }
}
