//! Client hardware address storage. DHCP's `chaddr` field is 16 bytes
//! wide but only the first `hlen` bytes are meaningful; for the common
//! case of Ethernet (`htype == 1`, `hlen == 6`) those bytes parse as a
//! [`MacAddress`].

use mac_address::MacAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareAddress {
    pub address: MacAddress,
    pub is_mac_address: bool,
    pub raw: [u8; 16],
}

impl HardwareAddress {
    /// Builds a `HardwareAddress` from the raw 16-byte `chaddr` field.
    /// Trailing zero bytes (bytes 6..16 for an Ethernet address) are
    /// tolerated; the address only decodes as a MAC when exactly the
    /// first 6 bytes are non-trivially set and the rest are zero.
    pub fn new(raw: [u8; 16]) -> Self {
        let tail_is_zero = raw[6..].iter().all(|b| *b == 0);
        if tail_is_zero {
            let bytes: [u8; 6] = raw[0..6].try_into().unwrap();
            Self {
                address: MacAddress::new(bytes),
                is_mac_address: true,
                raw,
            }
        } else {
            Self {
                address: MacAddress::new([0; 6]),
                is_mac_address: false,
                raw,
            }
        }
    }

    pub fn from_ethernet(bytes: [u8; 6]) -> Self {
        let mut raw = [0u8; 16];
        raw[0..6].copy_from_slice(&bytes);
        Self {
            address: MacAddress::new(bytes),
            is_mac_address: true,
            raw,
        }
    }

    pub fn ethernet_bytes(&self) -> [u8; 6] {
        self.raw[0..6].try_into().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_address_round_trips() {
        let hw = HardwareAddress::from_ethernet([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert!(hw.is_mac_address);
        assert_eq!(hw.ethernet_bytes(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn non_ethernet_hardware_is_kept_raw() {
        let mut raw = [0u8; 16];
        raw[0] = 1;
        raw[10] = 7;
        let hw = HardwareAddress::new(raw);
        assert!(!hw.is_mac_address);
        assert_eq!(hw.raw, raw);
    }
}
