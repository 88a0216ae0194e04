//! Packet metadata seen by the fast path.

use fastpath_types::{FlowTuple, MacAddress, VlanId};

/// Parsed header fields of a packet offered to the fast path.
///
/// The engine never owns packet buffers; the driver hands in the decoded
/// header fields and applies the mutations (tag state, NAT rewrite, ToS,
/// mark) this struct carries back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub dst_mac: MacAddress,
    pub src_mac: MacAddress,
    /// 802.1Q tag currently on the frame, if any.
    pub vlan: Option<VlanId>,
    /// L3/L4 flow identity, when the frame carries a parseable IP header.
    pub tuple: Option<FlowTuple>,
    pub tos: u8,
    /// QoS classification mark, writable by the fast path.
    pub mark: u32,
    /// Frame length in bytes, for accounting.
    pub len: u32,
}

impl Packet {
    /// Creates L2-only packet metadata.
    pub fn l2(dst_mac: MacAddress, src_mac: MacAddress, len: u32) -> Self {
        Self {
            dst_mac,
            src_mac,
            vlan: None,
            tuple: None,
            tos: 0,
            mark: 0,
            len,
        }
    }

    /// Attaches an 802.1Q tag.
    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = Some(vlan);
        self
    }

    /// Attaches the L3/L4 flow identity.
    pub fn with_tuple(mut self, tuple: FlowTuple) -> Self {
        self.tuple = Some(tuple);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastpath_types::PROTO_TCP;
    use std::net::Ipv4Addr;

    #[test]
    fn test_builders() {
        let dst: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let src: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        let tuple = FlowTuple::v4(
            Ipv4Addr::new(10, 0, 0, 5),
            1234,
            Ipv4Addr::new(10, 0, 0, 9),
            80,
            PROTO_TCP,
        );

        let pkt = Packet::l2(dst, src, 64)
            .with_vlan(VlanId::new(100).unwrap())
            .with_tuple(tuple);

        assert_eq!(pkt.vlan.unwrap().as_u16(), 100);
        assert_eq!(pkt.tuple.unwrap(), tuple);
        assert_eq!(pkt.len, 64);
    }
}
