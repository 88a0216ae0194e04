//! IPC - per-5-tuple IP connection cache.
//!
//! Caches the L3/L4 forwarding decision for a classified flow: egress
//! interface, next-hop MACs, NAT rewrite, VLAN and PPP encapsulation
//! metadata, QoS mark and accounting state.

mod table;
mod types;

pub use table::IpcTable;
pub use types::{IpcEntry, IpcRequest, NatRewrite, PppSession};
