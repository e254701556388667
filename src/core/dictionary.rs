//! Dictionary lookup is a named external collaborator in spec.md's
//! component table ("Dictionary/attribute-name lookup") for anything
//! outside the DHCP option namespace the wire codec itself must
//! resolve to decode/encode. This module defines the trait boundary
//! and supplies the one concrete dictionary the codec in this crate
//! actually needs: DHCP options 0-82.

use super::avp::AttrType;

/// Static metadata about one attribute: whether the wire codec should
/// split its value into an array of fixed-width entries, its declared
/// type, and (for non-array attributes) its expected fixed width.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDef {
    pub name: &'static str,
    pub attr_type: AttrType,
    pub array: bool,
}

/// A dictionary resolves a wire tag to attribute metadata. The RADIUS
/// dictionary (vendor dictionaries, full attribute namespace) is an
/// external collaborator per spec.md §1 and is represented here only
/// as a trait: no implementation ships in this crate.
pub trait Dictionary {
    fn lookup(&self, tag: u8) -> Option<AttributeDef>;
}

/// Marker trait for the out-of-scope RADIUS dictionary boundary.
/// A production deployment supplies its own implementation backed by
/// `dictionary.radius` files; none is provided here.
pub trait RadiusDictionary: Dictionary {}

/// The DHCP option dictionary this crate's codec relies on to decide
/// array-splitting and type tagging (spec.md §4.2).
pub struct DhcpDictionary;

impl Dictionary for DhcpDictionary {
    fn lookup(&self, tag: u8) -> Option<AttributeDef> {
        use AttrType::*;
        let def = |name, attr_type, array| AttributeDef {
            name,
            attr_type,
            array,
        };
        Some(match tag {
            1 => def("Subnet-Mask", Ipaddr, false),
            2 => def("Time-Offset", Integer, false),
            3 => def("Router", Ipaddr, true),
            4 => def("Time-Server", Ipaddr, true),
            5 => def("Name-Server", Ipaddr, true),
            6 => def("Domain-Name-Server", Ipaddr, true),
            7 => def("Log-Server", Ipaddr, true),
            8 => def("Cookie-Server", Ipaddr, true),
            9 => def("LPR-Server", Ipaddr, true),
            10 => def("Impress-Server", Ipaddr, true),
            11 => def("Resource-Location-Server", Ipaddr, true),
            12 => def("Host-Name", String, false),
            13 => def("Boot-File-Size", Short, false),
            14 => def("Merit-Dump", String, false),
            15 => def("Domain-Name", String, false),
            16 => def("Swap-Server", Ipaddr, false),
            17 => def("Root-Path", String, false),
            18 => def("Extensions-Path", String, false),
            19 => def("IP-Forwarding", Byte, false),
            21 => def("Policy-Filter", Ipaddr, true),
            22 => def("Maximum-Datagram-Reassembly-Size", Short, false),
            23 => def("Default-IP-TTL", Byte, false),
            24 => def("Path-MTU-Aging-Timeout", Integer, false),
            26 => def("Interface-MTU", Short, false),
            28 => def("Broadcast-Address", Ipaddr, false),
            31 => def("Perform-Router-Discovery", Byte, false),
            33 => def("Static-Route", Ipaddr, true),
            35 => def("ARP-Cache-Timeout", Integer, false),
            40 => def("NIS-Domain", String, false),
            41 => def("NIS-Servers", Ipaddr, true),
            42 => def("NTP-Servers", Ipaddr, true),
            43 => def("Vendor-Specific-Information", Octets, false),
            50 => def("Requested-IP-Address", Ipaddr, false),
            51 => def("IP-Address-Lease-Time", Integer, false),
            52 => def("Option-Overload", Byte, false),
            53 => def("DHCP-Message-Type", Byte, false),
            54 => def("Server-Identifier", Ipaddr, false),
            55 => def("Parameter-Request-List", Byte, true),
            56 => def("Message", String, false),
            57 => def("Maximum-DHCP-Message-Size", Short, false),
            58 => def("Renewal-Time-Value", Integer, false),
            59 => def("Rebinding-Time-Value", Integer, false),
            60 => def("Vendor-Class-Identifier", String, false),
            61 => def("Client-Identifier", Octets, false),
            64 => def("NIS-Plus-Domain", String, false),
            65 => def("NIS-Plus-Servers", Ipaddr, true),
            66 => def("TFTP-Server-Name", String, false),
            67 => def("Bootfile-Name", String, false),
            82 => def("Relay-Agent-Information", Octets, false),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_is_a_single_byte_non_array() {
        let def = DhcpDictionary.lookup(53).unwrap();
        assert!(!def.array);
        assert_eq!(def.attr_type.fixed_width(), Some(1));
    }

    #[test]
    fn parameter_request_list_is_an_array_of_bytes() {
        let def = DhcpDictionary.lookup(55).unwrap();
        assert!(def.array);
    }

    #[test]
    fn unknown_tag_resolves_to_none() {
        assert!(DhcpDictionary.lookup(200).is_none());
    }
}
