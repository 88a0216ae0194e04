//! Common value types for the fastpath forwarding cache.
//!
//! This crate provides type-safe representations of the network primitives
//! the cache engine keys its tables with:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers (0 = untagged)
//! - [`FlowTuple`]: 5-tuple flow identity, IPv4/IPv6 polymorphic

mod flow;
mod mac;
mod vlan;

pub use flow::{FlowTuple, L4Class, PROTO_TCP, PROTO_UDP};
pub use mac::MacAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 0-4094)")]
    InvalidVlanId(u16),
}
