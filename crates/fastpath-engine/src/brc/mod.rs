//! BRC - per-MAC bridge cache.
//!
//! Caches the L2 forwarding decision for a destination MAC learned by the
//! owning bridge, together with the VLAN/action metadata the fast path
//! needs to put a matching frame on the wire without full stack traversal.

mod table;
mod types;

pub use table::BrcTable;
pub use types::{BrcEntry, BrcRequest};
