//! Bridge-cache entry model.

use crate::accounting::{account, ByteCounter};
use crate::action::ActionFlags;
use crate::device::RawDeviceId;
use fastpath_types::{MacAddress, VlanId};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, Weak};

/// Parameters for creating or refreshing a bridge-cache entry.
#[derive(Debug, Clone)]
pub struct BrcRequest {
    pub mac: MacAddress,
    pub vlan: VlanId,
    pub txif: RawDeviceId,
    pub action: ActionFlags,
    /// Source IPv4 recorded for ARP re-probing after the flow cools down.
    pub src_ip: Option<Ipv4Addr>,
    /// Shared byte counter owned by the accounting subsystem.
    pub bytecnt: Option<Weak<ByteCounter>>,
}

impl BrcRequest {
    pub fn new(mac: MacAddress, vlan: VlanId, txif: RawDeviceId, action: ActionFlags) -> Self {
        Self {
            mac,
            vlan,
            txif,
            action,
            src_ip: None,
            bytecnt: None,
        }
    }

    pub fn with_src_ip(mut self, src_ip: Ipv4Addr) -> Self {
        self.src_ip = Some(src_ip);
        self
    }

    pub fn with_bytecnt(mut self, bytecnt: Weak<ByteCounter>) -> Self {
        self.bytecnt = Some(bytecnt);
        self
    }
}

/// Fields a re-learn event may rewrite in place.
#[derive(Debug)]
struct BrcState {
    vlan: VlanId,
    src_ip: Option<Ipv4Addr>,
    bytecnt: Weak<ByteCounter>,
}

/// A cached L2 forwarding decision, keyed by destination MAC.
///
/// Counters and the egress interface are atomics so the forward path can
/// touch an entry through a shared reference without the table lock. The
/// `dead` flag is raised under the table write lock before the entry is
/// unlinked, which is what keeps a racing hot-cache probe from handing out
/// an already-deleted entry.
#[derive(Debug)]
pub struct BrcEntry {
    mac: MacAddress,
    txif: AtomicU64,
    flags: AtomicU32,
    live: AtomicU32,
    hitting: AtomicU32,
    hits: AtomicU64,
    dead: AtomicBool,
    state: RwLock<BrcState>,
}

impl BrcEntry {
    pub(crate) fn new(req: BrcRequest) -> Self {
        Self {
            mac: req.mac,
            txif: AtomicU64::new(req.txif),
            flags: AtomicU32::new(req.action.bits()),
            live: AtomicU32::new(0),
            hitting: AtomicU32::new(0),
            hits: AtomicU64::new(0),
            dead: AtomicBool::new(false),
            state: RwLock::new(BrcState {
                vlan: req.vlan,
                src_ip: req.src_ip,
                bytecnt: req.bytecnt.unwrap_or_default(),
            }),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, BrcState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn txif(&self) -> RawDeviceId {
        self.txif.load(Ordering::Acquire)
    }

    pub fn vlan(&self) -> VlanId {
        self.state().vlan
    }

    pub fn src_ip(&self) -> Option<Ipv4Addr> {
        self.state().src_ip
    }

    pub fn action(&self) -> ActionFlags {
        ActionFlags::from_bits(self.flags.load(Ordering::Relaxed))
    }

    pub fn is_suspended(&self) -> bool {
        self.action().contains(ActionFlags::SUSPEND)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn liveness(&self) -> u32 {
        self.live.load(Ordering::Relaxed)
    }

    pub fn freshness(&self) -> u32 {
        self.hitting.load(Ordering::Relaxed)
    }

    pub(crate) fn set_action(&self, flags: ActionFlags, on: bool) {
        if on {
            self.flags.fetch_or(flags.bits(), Ordering::Relaxed);
        } else {
            self.flags.fetch_and(!flags.bits(), Ordering::Relaxed);
        }
    }

    /// Records a fast-path match against this entry.
    pub(crate) fn touch(&self, len: u64) {
        self.live.fetch_add(1, Ordering::Relaxed);
        self.hitting.store(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        if self.action().contains(ActionFlags::BYTECNT) {
            account(&self.state().bytecnt, len);
        }
    }

    /// Rewrites the re-learnable fields in place.
    ///
    /// Returns true if a forwarding-relevant field (egress interface, VLAN
    /// or action flags) changed, in which case hot-cache slots pointing at
    /// the entry are stale and must be invalidated.
    pub(crate) fn refresh(&self, req: BrcRequest) -> bool {
        let old_txif = self.txif.swap(req.txif, Ordering::AcqRel);
        let old_flags = self.flags.swap(req.action.bits(), Ordering::Relaxed);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let vlan_changed = state.vlan != req.vlan;
        state.vlan = req.vlan;
        state.src_ip = req.src_ip;
        if let Some(bytecnt) = req.bytecnt {
            state.bytecnt = bytecnt;
        }
        drop(state);

        // The mapping was re-confirmed by learnable traffic.
        self.live.fetch_add(1, Ordering::Relaxed);
        self.hitting.store(1, Ordering::Relaxed);

        old_txif != req.txif || old_flags != req.action.bits() || vlan_changed
    }

    pub(crate) fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Takes and zeroes the liveness counter (one aging sweep step).
    pub(crate) fn take_liveness(&self) -> u32 {
        self.live.swap(0, Ordering::Relaxed)
    }

    /// Takes and zeroes the freshness counter (one aging sweep step).
    pub(crate) fn take_freshness(&self) -> u32 {
        self.hitting.swap(0, Ordering::Relaxed)
    }

    /// Re-arms the freshness counter after a Live sweep verdict.
    pub(crate) fn rearm_freshness(&self) {
        self.hitting.store(1, Ordering::Relaxed);
    }
}

impl fmt::Display for BrcEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vlan {} txif {} action {} live {} hits {}",
            self.mac,
            self.vlan(),
            self.txif(),
            self.action(),
            self.liveness(),
            self.hits(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn entry() -> BrcEntry {
        let req = BrcRequest::new(
            "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            VlanId::new(100).unwrap(),
            1,
            ActionFlags::UNTAG,
        );
        BrcEntry::new(req)
    }

    #[test]
    fn test_touch_drives_counters() {
        let e = entry();
        assert_eq!(e.liveness(), 0);

        e.touch(64);
        e.touch(64);
        assert_eq!(e.liveness(), 2);
        assert_eq!(e.freshness(), 1);
        assert_eq!(e.hits(), 2);
    }

    #[test]
    fn test_touch_accounts_bytes_when_flagged() {
        let counter = ByteCounter::new();
        let req = BrcRequest::new(
            "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            VlanId::NONE,
            1,
            ActionFlags::BYTECNT,
        )
        .with_bytecnt(Arc::downgrade(&counter));
        let e = BrcEntry::new(req);

        e.touch(1500);
        assert_eq!(counter.get(), 1500);
    }

    #[test]
    fn test_refresh_reports_forwarding_changes() {
        let e = entry();

        // Same txif/vlan/action: not a forwarding-relevant change.
        let same = BrcRequest::new(e.mac(), e.vlan(), 1, ActionFlags::UNTAG);
        assert!(!e.refresh(same));

        // Host moved to another egress interface.
        let moved = BrcRequest::new(e.mac(), e.vlan(), 2, ActionFlags::UNTAG);
        assert!(e.refresh(moved));
        assert_eq!(e.txif(), 2);
    }

    #[test]
    fn test_suspend_flag() {
        let e = entry();
        assert!(!e.is_suspended());
        e.set_action(ActionFlags::SUSPEND, true);
        assert!(e.is_suspended());
        e.set_action(ActionFlags::SUSPEND, false);
        assert!(!e.is_suspended());
    }
}
