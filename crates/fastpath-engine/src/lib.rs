//! fastpath - cut-through forwarding connection cache.
//!
//! A fast-path engine that sits beside a standard bridge/learning-table
//! implementation and lets matching traffic bypass full protocol-stack
//! processing. It keeps two kinds of flow state:
//!
//! - **BRC** entries: per-MAC bridge-cache decisions with VLAN/action
//!   metadata, fronted by a small direct-mapped hot cache.
//! - **IPC** entries: per-5-tuple connection-cache decisions carrying
//!   NAT, VLAN, PPP-encapsulation, QoS and accounting metadata.
//!
//! # Architecture
//!
//! ```text
//! [driver rx] ──> forward() ──> hot cache ──> BRC table ─┐
//!                     │                                  ├──> transmit()
//!                     └────────> IPC table ──────────────┘
//!
//! [learning-table GC] ──> brc_age() ──> Postpone / Cooling / Expire
//! ```
//!
//! The engine stays consistent with the owning bridge's aging logic: a
//! candidate-for-expiry MAC is first checked against the cache's liveness
//! counters, and a flow that has gone quiet triggers one ARP probe to
//! coax traffic back onto the fast path before the slow-path entry dies.
//!
//! Callers hold an [`engine::Handle`] (`Arc<dyn CacheEngine>`); attach
//! decides once whether that handle is the real engine or the disabled
//! null object, so call sites never branch on an enable flag.

// ============================================================================
// Core Modules
// ============================================================================

pub mod accounting;
pub mod action;
pub mod aging;
pub mod brc;
pub mod device;
pub mod engine;
pub mod error;
pub mod hot;
pub mod ipc;
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use accounting::ByteCounter;
pub use action::ActionFlags;
pub use aging::AgeVerdict;
pub use brc::{BrcEntry, BrcRequest, BrcTable};
pub use device::{DeviceRegistry, RawDeviceId, TaggingMode, VlanBinding};
pub use engine::{
    attach, attach_with, detach, Bitset32, CacheEngine, CacheGuard, ConfigHandler, DetachFn,
    DisabledEngine, EngineCallbacks, EngineConfig, EngineStatsSnapshot, FastPathEngine,
    ForwardDecision, ForwardHook, ForwardOutcome, Handle, SuspendMask,
};
pub use error::{CacheError, CacheResult, DropPacket};
pub use hot::{HotBank, HotCache, BRC_HOT_BANKS, BRC_HOT_SLOTS};
pub use ipc::{IpcEntry, IpcRequest, IpcTable, NatRewrite, PppSession};
pub use packet::Packet;

// Re-export the key types from the value-types crate.
pub use fastpath_types::{FlowTuple, L4Class, MacAddress, VlanId, PROTO_TCP, PROTO_UDP};
