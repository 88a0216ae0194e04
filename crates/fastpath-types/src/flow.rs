//! 5-tuple flow identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// IP protocol number for TCP.
pub const PROTO_TCP: u8 = 6;

/// IP protocol number for UDP.
pub const PROTO_UDP: u8 = 17;

/// Protocol class a flow belongs to for suspend bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L4Class {
    Tcp,
    Udp,
    Other,
}

/// Flow identity for the IP connection cache.
///
/// Addresses are width-polymorphic through [`IpAddr`], so IPv4 and IPv6
/// flows share one key type. The tuple is plain data: construction never
/// fails and the fields are immutable once an entry is keyed by it.
///
/// Ordering is lexicographic over (src, dst, ports, protocol), which gives
/// the bulk table operations a stable inclusive-range meaning.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FlowTuple {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl FlowTuple {
    /// Creates a new flow tuple.
    pub const fn new(
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
        }
    }

    /// Convenience constructor for IPv4 flows.
    pub const fn v4(
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        Self::new(
            IpAddr::V4(src),
            IpAddr::V4(dst),
            src_port,
            dst_port,
            protocol,
        )
    }

    /// Returns the tuple for the reverse direction of the same flow.
    pub const fn reverse(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }

    /// Returns the protocol class used for suspend bookkeeping.
    pub const fn l4_class(&self) -> L4Class {
        match self.protocol {
            PROTO_TCP => L4Class::Tcp,
            PROTO_UDP => L4Class::Udp,
            _ => L4Class::Other,
        }
    }

    /// Returns true if both flow endpoints are IPv6.
    pub const fn is_ipv6(&self) -> bool {
        self.src_ip.is_ipv6() && self.dst_ip.is_ipv6()
    }

    /// Returns true if the tuple carries no usable flow identity.
    ///
    /// Unspecified addresses with zero ports cannot key a connection; the
    /// tables reject such tuples instead of caching them.
    pub fn is_null(&self) -> bool {
        self.src_ip.is_unspecified()
            && self.dst_ip.is_unspecified()
            && self.src_port == 0
            && self.dst_port == 0
    }
}

impl fmt::Display for FlowTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}
