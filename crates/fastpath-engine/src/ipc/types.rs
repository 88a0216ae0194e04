//! Connection-cache entry model.

use crate::accounting::{account, ByteCounter};
use crate::action::ActionFlags;
use crate::device::RawDeviceId;
use fastpath_types::{FlowTuple, MacAddress, VlanId};
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, Weak};

/// Replacement address/port applied by an SNAT or DNAT action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatRewrite {
    pub ip: IpAddr,
    pub port: u16,
}

impl NatRewrite {
    pub const fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

/// Opaque handle to a PPP/PPTP/L2TP session owned by a collaborator.
///
/// The cache only checks presence or absence; it never looks inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PppSession(pub u64);

/// Parameters for creating or refreshing a connection-cache entry.
#[derive(Debug, Clone)]
pub struct IpcRequest {
    pub tuple: FlowTuple,
    pub vlan: VlanId,
    /// Next-hop destination MAC written into forwarded frames.
    pub dst_mac: MacAddress,
    pub src_mac: MacAddress,
    /// MAC the first packet of the flow arrived from.
    pub sender_mac: MacAddress,
    pub txif: RawDeviceId,
    /// Egress bridge interface, when the egress device is a bridge member.
    pub txbif: Option<RawDeviceId>,
    pub action: ActionFlags,
    pub nat: Option<NatRewrite>,
    pub tos: u8,
    pub mark: u32,
    pub pppoe_session: u16,
    pub ppp: Option<PppSession>,
    pub bytecnt: Option<Weak<ByteCounter>>,
}

impl IpcRequest {
    pub fn new(
        tuple: FlowTuple,
        dst_mac: MacAddress,
        src_mac: MacAddress,
        txif: RawDeviceId,
        action: ActionFlags,
    ) -> Self {
        Self {
            tuple,
            vlan: VlanId::NONE,
            dst_mac,
            src_mac,
            sender_mac: src_mac,
            txif,
            txbif: None,
            action,
            nat: None,
            tos: 0,
            mark: 0,
            pppoe_session: 0,
            ppp: None,
            bytecnt: None,
        }
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = vlan;
        self
    }

    pub fn with_nat(mut self, nat: NatRewrite) -> Self {
        self.nat = Some(nat);
        self
    }

    pub fn with_mark(mut self, mark: u32) -> Self {
        self.mark = mark;
        self
    }

    pub fn with_tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    pub fn with_pppoe(mut self, session: u16, ppp: PppSession) -> Self {
        self.pppoe_session = session;
        self.ppp = Some(ppp);
        self
    }

    pub fn with_bytecnt(mut self, bytecnt: Weak<ByteCounter>) -> Self {
        self.bytecnt = Some(bytecnt);
        self
    }
}

/// Fields an action request may rewrite in place.
#[derive(Debug)]
struct IpcState {
    vlan: VlanId,
    dst_mac: MacAddress,
    src_mac: MacAddress,
    sender_mac: MacAddress,
    txif: RawDeviceId,
    txbif: Option<RawDeviceId>,
    nat: Option<NatRewrite>,
    tos: u8,
    mark: u32,
    pppoe_session: u16,
    ppp: Option<PppSession>,
    bytecnt: Weak<ByteCounter>,
}

/// A cached L3/L4 forwarding decision, keyed by flow tuple.
#[derive(Debug)]
pub struct IpcEntry {
    tuple: FlowTuple,
    flags: AtomicU32,
    live: AtomicU32,
    hits: AtomicU64,
    bytes: AtomicU64,
    /// Per-connection suspend requests outstanding.
    suspend: AtomicU32,
    /// Lookups handed out and not yet released; pinned entries survive
    /// the aging sweep.
    pins: AtomicU32,
    state: RwLock<IpcState>,
}

impl IpcEntry {
    pub(crate) fn new(req: IpcRequest) -> Self {
        Self {
            tuple: req.tuple,
            flags: AtomicU32::new(req.action.bits()),
            live: AtomicU32::new(0),
            hits: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            suspend: AtomicU32::new(0),
            pins: AtomicU32::new(0),
            state: RwLock::new(IpcState {
                vlan: req.vlan,
                dst_mac: req.dst_mac,
                src_mac: req.src_mac,
                sender_mac: req.sender_mac,
                txif: req.txif,
                txbif: req.txbif,
                nat: req.nat,
                tos: req.tos,
                mark: req.mark,
                pppoe_session: req.pppoe_session,
                ppp: req.ppp,
                bytecnt: req.bytecnt.unwrap_or_default(),
            }),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, IpcState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tuple(&self) -> FlowTuple {
        self.tuple
    }

    pub fn vlan(&self) -> VlanId {
        self.state().vlan
    }

    pub fn dst_mac(&self) -> MacAddress {
        self.state().dst_mac
    }

    pub fn src_mac(&self) -> MacAddress {
        self.state().src_mac
    }

    pub fn sender_mac(&self) -> MacAddress {
        self.state().sender_mac
    }

    pub fn txif(&self) -> RawDeviceId {
        self.state().txif
    }

    pub fn txbif(&self) -> Option<RawDeviceId> {
        self.state().txbif
    }

    pub fn nat(&self) -> Option<NatRewrite> {
        self.state().nat
    }

    pub fn tos(&self) -> u8 {
        self.state().tos
    }

    pub fn mark(&self) -> u32 {
        self.state().mark
    }

    pub fn pppoe_session(&self) -> u16 {
        self.state().pppoe_session
    }

    pub fn ppp(&self) -> Option<PppSession> {
        self.state().ppp
    }

    pub fn action(&self) -> ActionFlags {
        ActionFlags::from_bits(self.flags.load(Ordering::Relaxed))
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn liveness(&self) -> u32 {
        self.live.load(Ordering::Relaxed)
    }

    /// True while the entry is parked, either by its action flag or by an
    /// outstanding per-connection suspend request.
    pub fn is_suspended(&self) -> bool {
        self.action().contains(ActionFlags::SUSPEND)
            || self.suspend.load(Ordering::Relaxed) > 0
    }

    pub fn suspend_count(&self) -> u32 {
        self.suspend.load(Ordering::Relaxed)
    }

    pub(crate) fn set_action(&self, flags: ActionFlags, on: bool) {
        if on {
            self.flags.fetch_or(flags.bits(), Ordering::Relaxed);
        } else {
            self.flags.fetch_and(!flags.bits(), Ordering::Relaxed);
        }
    }

    pub(crate) fn suspend_inc(&self) {
        self.suspend.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn suspend_dec(&self) {
        let _ = self
            .suspend
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub(crate) fn pin(&self) {
        self.pins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unpin(&self) {
        let _ = self
            .pins
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn pins(&self) -> u32 {
        self.pins.load(Ordering::Relaxed)
    }

    /// Records a fast-path match against this entry.
    pub(crate) fn touch(&self, len: u64) {
        self.live.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len, Ordering::Relaxed);
        if self.action().contains(ActionFlags::BYTECNT) {
            account(&self.state().bytecnt, len);
        }
    }

    /// Takes and zeroes the liveness counter (one aging sweep step).
    pub(crate) fn take_liveness(&self) -> u32 {
        self.live.swap(0, Ordering::Relaxed)
    }

    /// Rewrites the updatable fields in place.
    pub(crate) fn refresh(&self, req: IpcRequest) {
        self.flags.store(req.action.bits(), Ordering::Relaxed);
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.vlan = req.vlan;
        state.dst_mac = req.dst_mac;
        state.src_mac = req.src_mac;
        state.sender_mac = req.sender_mac;
        state.txif = req.txif;
        state.txbif = req.txbif;
        state.nat = req.nat;
        state.tos = req.tos;
        state.mark = req.mark;
        state.pppoe_session = req.pppoe_session;
        state.ppp = req.ppp;
        if let Some(bytecnt) = req.bytecnt {
            state.bytecnt = bytecnt;
        }
        drop(state);
        self.live.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for IpcEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vlan {} txif {} action {} live {} hits {} bytes {}",
            self.tuple,
            self.vlan(),
            self.txif(),
            self.action(),
            self.liveness(),
            self.hits(),
            self.bytes(),
        )?;
        if let Some(nat) = self.nat() {
            write!(f, " nat {}:{}", nat.ip, nat.port)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastpath_types::PROTO_TCP;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn tuple() -> FlowTuple {
        FlowTuple::v4(
            Ipv4Addr::new(10, 0, 0, 5),
            1234,
            Ipv4Addr::new(10, 0, 0, 9),
            80,
            PROTO_TCP,
        )
    }

    fn entry() -> IpcEntry {
        IpcEntry::new(IpcRequest::new(
            tuple(),
            "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            "00:11:22:33:44:55".parse().unwrap(),
            1,
            ActionFlags::empty(),
        ))
    }

    #[test]
    fn test_touch_accumulates() {
        let e = entry();
        e.touch(100);
        e.touch(200);
        assert_eq!(e.hits(), 2);
        assert_eq!(e.bytes(), 300);
        assert_eq!(e.liveness(), 2);
    }

    #[test]
    fn test_suspend_counter() {
        let e = entry();
        assert!(!e.is_suspended());

        e.suspend_inc();
        e.suspend_inc();
        assert!(e.is_suspended());

        e.suspend_dec();
        assert!(e.is_suspended());
        e.suspend_dec();
        assert!(!e.is_suspended());

        // Underflow is clamped, not wrapped.
        e.suspend_dec();
        assert_eq!(e.suspend_count(), 0);
    }

    #[test]
    fn test_refresh_replaces_nat() {
        let e = entry();
        let rewrite = NatRewrite::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 4096);
        let req = IpcRequest::new(
            tuple(),
            e.dst_mac(),
            e.src_mac(),
            2,
            ActionFlags::SNAT,
        )
        .with_nat(rewrite);

        e.refresh(req);
        assert_eq!(e.nat(), Some(rewrite));
        assert_eq!(e.txif(), 2);
        assert!(e.action().contains(ActionFlags::SNAT));
    }

    #[test]
    fn test_pin_unpin() {
        let e = entry();
        e.pin();
        e.pin();
        assert_eq!(e.pins(), 2);
        e.unpin();
        e.unpin();
        e.unpin();
        assert_eq!(e.pins(), 0);
    }

    #[test]
    fn test_ppp_presence() {
        let e = entry();
        assert!(e.ppp().is_none());

        let req = IpcRequest::new(
            tuple(),
            e.dst_mac(),
            e.src_mac(),
            1,
            ActionFlags::PPPOE_ADD,
        )
        .with_pppoe(0x1a2b, PppSession(7));
        e.refresh(req);

        assert_eq!(e.pppoe_session(), 0x1a2b);
        assert_eq!(e.ppp(), Some(PppSession(7)));
    }
}
