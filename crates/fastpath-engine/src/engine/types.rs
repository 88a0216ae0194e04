//! Engine-facing types: configuration, statistics, suspend masks,
//! collaborator callbacks and the read bracket.

use crate::brc::BrcEntry;
use crate::device::RawDeviceId;
use crate::error::{CacheError, CacheResult};
use crate::ipc::IpcEntry;
use crate::packet::Packet;
use fastpath_types::{FlowTuple, MacAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLockReadGuard};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Instance name; attach is idempotent per name.
    pub name: String,
    /// Construct the real engine (true) or the disabled null object.
    pub enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "fastpath0".to_string(),
            enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn disabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: false,
        }
    }
}

/// A 32-bit set of independent suspend requestors for one protocol class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bitset32(u32);

impl Bitset32 {
    pub const fn empty() -> Self {
        Bitset32(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Bitset32(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn any(&self) -> bool {
        self.0 != 0
    }

    pub const fn test(&self, bit: u8) -> bool {
        self.0 & (1 << (bit & 31)) != 0
    }
}

impl fmt::Display for Bitset32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Suspend state, one bit set per protocol class.
///
/// The legacy wire form packs both classes into one 32-bit mask with even
/// bit positions reserved for TCP and odd positions for UDP. Internally
/// the two classes are separate fields, so overlap is unrepresentable;
/// the interleaved form exists only at the [`SuspendMask::from_wire`] /
/// [`SuspendMask::to_wire`] boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuspendMask {
    pub tcp: Bitset32,
    pub udp: Bitset32,
}

const WIRE_TCP_BITS: u32 = 0x5555_5555;
const WIRE_UDP_BITS: u32 = 0xaaaa_aaaa;

impl SuspendMask {
    /// Decodes the interleaved wire mask.
    ///
    /// A single call may carry requests for one class only; a mask with
    /// bits in both classes is ambiguous and rejected.
    pub fn from_wire(raw: u32) -> CacheResult<Self> {
        let tcp_raw = raw & WIRE_TCP_BITS;
        let udp_raw = raw & WIRE_UDP_BITS;
        if tcp_raw != 0 && udp_raw != 0 {
            return Err(CacheError::InvalidArgument(
                "suspend mask sets bits in both protocol classes".into(),
            ));
        }
        let mut tcp = 0u32;
        let mut udp = 0u32;
        for k in 0..16 {
            if tcp_raw & (1 << (2 * k)) != 0 {
                tcp |= 1 << k;
            }
            if udp_raw & (1 << (2 * k + 1)) != 0 {
                udp |= 1 << k;
            }
        }
        Ok(Self {
            tcp: Bitset32::from_bits(tcp),
            udp: Bitset32::from_bits(udp),
        })
    }

    /// Encodes the interleaved wire form.
    pub fn to_wire(&self) -> u32 {
        let mut raw = 0u32;
        for k in 0..16 {
            if self.tcp.bits() & (1 << k) != 0 {
                raw |= 1 << (2 * k);
            }
            if self.udp.bits() & (1 << k) != 0 {
                raw |= 1 << (2 * k + 1);
            }
        }
        raw
    }
}

/// Outcome of a cut-through forwarding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The packet was matched and handed to the transmit callback.
    Forwarded { txif: RawDeviceId },
    /// No usable cache entry; the caller runs the slow path.
    Miss,
}

/// Verdict of the registered forwarding hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardDecision {
    Continue,
    Drop,
}

/// The single registrable "may I forward this?" veto/observer.
pub trait ForwardHook: Send + Sync {
    fn inspect(&self, packet: &Packet, entry: &IpcEntry) -> ForwardDecision;
}

/// Primitives the engine consumes from its collaborators.
///
/// Runs in packet-arrival and sweep contexts; implementations must not
/// block.
pub trait EngineCallbacks: Send + Sync {
    /// Puts a fast-path-forwarded packet on the wire.
    fn transmit(&self, txif: RawDeviceId, packet: &Packet);

    /// Emits one ARP request toward `target` out of `via`.
    fn send_arp_request(&self, target: Ipv4Addr, via: RawDeviceId);
}

/// Collaborator-defined control-plane configuration handler.
///
/// The engine treats the payload as opaque in both directions.
pub trait ConfigHandler: Send + Sync {
    fn handle(&self, payload: &[u8]) -> Vec<u8>;
}

/// Forwarding and aging statistics.
#[derive(Debug, Default)]
pub(crate) struct EngineStats {
    pub hot_hits: AtomicU64,
    pub brc_hits: AtomicU64,
    pub ipc_hits: AtomicU64,
    pub misses: AtomicU64,
    pub drops: AtomicU64,
    pub arp_probes: AtomicU64,
}

impl EngineStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            brc_hits: self.brc_hits.load(Ordering::Relaxed),
            ipc_hits: self.ipc_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            arp_probes: self.arp_probes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub hot_hits: u64,
    pub brc_hits: u64,
    pub ipc_hits: u64,
    pub misses: u64,
    pub drops: u64,
    pub arp_probes: u64,
}

/// RAII read bracket over both tables.
///
/// Holding the guard pins the table contents for a multi-step read
/// sequence; no insert or delete can interleave until it drops. The guard
/// is the typestate replacement for a `lock_already_held` flag: lookups
/// made through it cannot re-enter the table locks. Mutating engine calls
/// take the write locks, so drop the guard before making them.
pub struct CacheGuard<'a> {
    brc: Option<RwLockReadGuard<'a, HashMap<MacAddress, Arc<BrcEntry>>>>,
    ipc: Option<RwLockReadGuard<'a, HashMap<FlowTuple, Arc<IpcEntry>>>>,
}

impl<'a> CacheGuard<'a> {
    pub(crate) fn new(
        brc: RwLockReadGuard<'a, HashMap<MacAddress, Arc<BrcEntry>>>,
        ipc: RwLockReadGuard<'a, HashMap<FlowTuple, Arc<IpcEntry>>>,
    ) -> Self {
        Self {
            brc: Some(brc),
            ipc: Some(ipc),
        }
    }

    /// Guard over nothing, handed out by the disabled engine.
    pub(crate) fn empty() -> Self {
        Self {
            brc: None,
            ipc: None,
        }
    }

    pub fn brc_lookup(&self, mac: &MacAddress) -> Option<&Arc<BrcEntry>> {
        self.brc.as_ref()?.get(mac)
    }

    pub fn ipc_lookup(&self, tuple: &FlowTuple) -> Option<&Arc<IpcEntry>> {
        self.ipc.as_ref()?.get(tuple)
    }

    pub fn brc_count(&self) -> usize {
        self.brc.as_ref().map_or(0, |m| m.len())
    }

    pub fn ipc_count(&self) -> usize {
        self.ipc.as_ref().map_or(0, |m| m.len())
    }
}
