//! The "smuggled" DUID used by broken-server compatibility mode, and the
//! synthetic server-id DUID used by the stateless responder. Both are
//! vendor DUIDs (type 2) but keyed on distinct subtypes so one is never
//! mistaken for the other, per SPEC_FULL.md §9: "never confuse with a
//! real vendor DUID by chance."

use std::net::Ipv6Addr;

const DUID_TYPE_VENDOR: u16 = 2;

/// A private enterprise number reserved for this relay's own use; real
/// deployments should register one, but any value works as long as it is
/// not one a genuine server DUID would ever carry.
const ENTERPRISE_NUMBER: u32 = 0x0002_4a17;

const SUBTYPE_BROKEN_ROUTE: u16 = 0x0001;
const SUBTYPE_SERVER_ID: u16 = 0x0002;

/// Carries `(slave ifindex, client link-local address)` across a
/// stateless hop to a server that does not understand `RELAY-FORW`
/// (§3, §4.2, §9). Fits in 16 bytes by keeping only the low 32 bits of
/// the link-local address — sufficient to reconstruct it since every
/// link-local address used here shares the fixed `fe80::/64` prefix with
/// a zero interface-identifier upper half in the topologies this relay
/// targets (plain SLAAC/manual link-locals, not EUI-64 derived ones with
/// a nonzero upper half).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenDuid {
    pub ifindex: u32,
    link_local_low: [u8; 4],
}

impl BrokenDuid {
    pub const LEN: usize = 16;

    pub fn new(ifindex: u32, link_local: Ipv6Addr) -> Self {
        let o = link_local.octets();
        Self {
            ifindex,
            link_local_low: [o[12], o[13], o[14], o[15]],
        }
    }

    pub fn link_local(&self) -> Ipv6Addr {
        Ipv6Addr::new(
            0xfe80,
            0,
            0,
            0,
            0,
            0,
            u16::from_be_bytes([self.link_local_low[0], self.link_local_low[1]]),
            u16::from_be_bytes([self.link_local_low[2], self.link_local_low[3]]),
        )
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..2].copy_from_slice(&DUID_TYPE_VENDOR.to_be_bytes());
        buf[2..6].copy_from_slice(&ENTERPRISE_NUMBER.to_be_bytes());
        buf[6..8].copy_from_slice(&SUBTYPE_BROKEN_ROUTE.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ifindex.to_be_bytes());
        buf[12..16].copy_from_slice(&self.link_local_low);
        buf
    }

    /// Recognizes and decodes a broken-DUID prefix at the start of
    /// `bytes`, or returns `None` if the vendor/enterprise/subtype
    /// marker does not match (§9's "recognizer keyed on
    /// `(vendor=2, enterprise_number, subtype)`").
    pub fn recognize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::LEN {
            return None;
        }
        let duid_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let enterprise = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let subtype = u16::from_be_bytes([bytes[6], bytes[7]]);
        if duid_type != DUID_TYPE_VENDOR
            || enterprise != ENTERPRISE_NUMBER
            || subtype != SUBTYPE_BROKEN_ROUTE
        {
            return None;
        }
        let ifindex = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let mut link_local_low = [0u8; 4];
        link_local_low.copy_from_slice(&bytes[12..16]);
        Some(Self {
            ifindex,
            link_local_low,
        })
    }
}

/// The stateless responder's synthetic server-id: a vendor DUID carrying
/// the answering slave's MAC address (§4.2's "server-id (vendor DUID as
/// above with the slave's MAC)").
pub fn server_id_duid(mac: [u8; 6]) -> [u8; 14] {
    let mut buf = [0u8; 14];
    buf[0..2].copy_from_slice(&DUID_TYPE_VENDOR.to_be_bytes());
    buf[2..6].copy_from_slice(&ENTERPRISE_NUMBER.to_be_bytes());
    buf[6..8].copy_from_slice(&SUBTYPE_SERVER_ID.to_be_bytes());
    buf[8..14].copy_from_slice(&mac);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_recognize() {
        let addr: Ipv6Addr = "fe80::2".parse().unwrap();
        let duid = BrokenDuid::new(5, addr);
        let encoded = duid.encode();
        assert_eq!(encoded.len(), 16);

        let decoded = BrokenDuid::recognize(&encoded).expect("should recognize own marker");
        assert_eq!(decoded.ifindex, 5);
        assert_eq!(decoded.link_local(), addr);
    }

    #[test]
    fn does_not_recognize_arbitrary_bytes() {
        let bytes = [0u8; 16];
        assert!(BrokenDuid::recognize(&bytes).is_none());
    }

    #[test]
    fn server_id_never_matches_broken_route_subtype() {
        let server = server_id_duid([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert!(BrokenDuid::recognize(&server).is_none());
    }
}
