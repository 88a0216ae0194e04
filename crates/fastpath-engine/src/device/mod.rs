//! Device and VLAN registration bookkeeping.

mod registry;

pub use registry::{DeviceRegistry, TaggingMode, VlanBinding};

/// Opaque identity of a collaborator-owned network device.
///
/// The cache never owns or dereferences devices; it carries their ids the
/// way entries carry an egress interface, and resolves them against the
/// registry when it needs registration state.
pub type RawDeviceId = u64;
