//! Engine trait, concrete implementations and the attach registry.

use super::types::{
    Bitset32, CacheGuard, ConfigHandler, EngineCallbacks, EngineConfig, EngineStats,
    EngineStatsSnapshot, ForwardDecision, ForwardHook, ForwardOutcome, SuspendMask,
};
use crate::action::ActionFlags;
use crate::aging::{sweep_entry, AgeVerdict};
use crate::brc::{BrcEntry, BrcRequest, BrcTable};
use crate::device::{DeviceRegistry, RawDeviceId, TaggingMode};
use crate::error::{CacheError, CacheResult, DropPacket};
use crate::hot::{HotBank, HotCache};
use crate::ipc::{IpcEntry, IpcRequest, IpcTable};
use crate::packet::Packet;
use fastpath_types::{FlowTuple, L4Class, MacAddress, VlanId};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Shared handle to an engine instance.
pub type Handle = Arc<dyn CacheEngine>;

/// Detach notification, run exactly once when the instance is torn down.
pub type DetachFn = Box<dyn FnOnce() + Send>;

/// The cut-through forwarding engine dispatch surface.
///
/// There are two implementations: [`FastPathEngine`] does the work, and
/// [`DisabledEngine`] answers every call with a neutral value, preserving
/// "fast path absent, behave as if it never existed" semantics without a
/// single enable branch at the call sites.
pub trait CacheEngine: Send + Sync {
    fn name(&self) -> &str;

    /// True for the real engine, false for the null object.
    fn enabled(&self) -> bool;

    // -- forwarding --------------------------------------------------------

    /// Attempts cut-through forwarding of one packet arriving on `rxif`.
    ///
    /// `Ok(Miss)` sends the caller down the slow path. `Err(DropPacket)`
    /// means the registered hook vetoed the packet; the caller must not
    /// transmit it through the normal path either.
    fn forward(&self, packet: &mut Packet, rxif: RawDeviceId)
        -> Result<ForwardOutcome, DropPacket>;

    /// Installs the forwarding veto/observer hook. Single slot; the last
    /// registered hook wins.
    fn fwd_callback_register(&self, hook: Arc<dyn ForwardHook>);

    /// Installs the collaborator callback set (transmit, ARP probe).
    fn callbacks_register(&self, callbacks: Arc<dyn EngineCallbacks>);

    // -- device registration ----------------------------------------------

    fn dev_register(&self, id: RawDeviceId, name: &str, is_bridge: bool) -> CacheResult<()>;

    /// Unregisters a device, draining every cache entry that references it
    /// before returning.
    fn dev_unregister(&self, id: RawDeviceId) -> CacheResult<()>;

    fn dev_vlan_add(
        &self,
        id: RawDeviceId,
        vid: VlanId,
        vlan_dev: RawDeviceId,
        tagging: TaggingMode,
    ) -> CacheResult<()>;

    fn dev_vlan_delete(&self, id: RawDeviceId, vid: VlanId) -> CacheResult<()>;

    fn is_enabled(&self, id: RawDeviceId) -> bool;

    fn is_bridge_interface(&self, id: RawDeviceId) -> bool;

    /// Toggles cut-through on a device. Idempotent; enabling returns the
    /// per-device hot-cache bank for hot-path use.
    fn enable(&self, id: RawDeviceId, on: bool) -> CacheResult<Option<Arc<HotBank>>>;

    // -- bridge cache ------------------------------------------------------

    fn brc_add(&self, req: BrcRequest) -> CacheResult<()>;
    fn brc_delete(&self, mac: &MacAddress) -> CacheResult<()>;
    fn brc_lookup(&self, mac: &MacAddress) -> Option<Arc<BrcEntry>>;
    fn brc_count(&self) -> usize;

    /// One aging-sweep step for the entry keyed by `mac`, invoked by the
    /// external learning table's garbage collector.
    fn brc_age(&self, mac: &MacAddress) -> CacheResult<AgeVerdict>;

    // -- connection cache --------------------------------------------------

    fn ipc_add(&self, req: IpcRequest) -> CacheResult<()>;
    fn ipc_delete(&self, tuple: &FlowTuple) -> CacheResult<()>;
    fn ipc_delete_multi(&self, tuples: &[FlowTuple]) -> usize;
    fn ipc_delete_range(&self, start: &FlowTuple, end: &FlowTuple) -> usize;

    fn ipc_action(
        &self,
        start: &FlowTuple,
        end: &FlowTuple,
        flags: ActionFlags,
        on: bool,
    ) -> CacheResult<usize>;

    /// Looks up and pins an entry; pair with [`CacheEngine::ipc_release`]
    /// so the aging sweep can reclaim it again.
    fn ipc_lookup(&self, tuple: &FlowTuple) -> Option<Arc<IpcEntry>>;

    fn ipc_lookup_by_l4proto(&self, protocol: u8) -> Vec<Arc<IpcEntry>>;

    /// Releases a pinned entry.
    fn ipc_release(&self, entry: &IpcEntry);

    fn ipc_count(&self) -> usize;

    /// One aging pass over the connection cache; returns reclaimed count.
    fn ipc_age_sweep(&self) -> usize;

    // -- suspend -----------------------------------------------------------

    /// Applies a legacy interleaved suspend mask (even bits TCP, odd UDP).
    /// A mask naming both classes is rejected.
    fn suspend_apply(&self, wire_mask: u32, on: bool) -> CacheResult<()>;

    fn suspend_masks(&self) -> SuspendMask;

    // -- read bracket, diagnostics, control --------------------------------

    /// Takes the read bracket over both tables for a multi-step sequence.
    fn acquire(&self) -> CacheGuard<'_>;

    fn dump(&self, sink: &mut dyn fmt::Write) -> fmt::Result;

    /// Dispatches an opaque control-plane request to the registered
    /// handler. Dispatched only while the engine is enabled.
    fn config_request(&self, payload: &[u8]) -> CacheResult<Vec<u8>>;

    fn config_handler_register(&self, handler: Arc<dyn ConfigHandler>);

    fn stats(&self) -> EngineStatsSnapshot;
}

/// The real cut-through forwarding engine.
pub struct FastPathEngine {
    name: String,
    brc: BrcTable,
    ipc: IpcTable,
    hot: Arc<HotCache>,
    devices: DeviceRegistry,
    suspend_tcp: AtomicU32,
    suspend_udp: AtomicU32,
    fwd_hook: RwLock<Option<Arc<dyn ForwardHook>>>,
    callbacks: RwLock<Option<Arc<dyn EngineCallbacks>>>,
    config_handler: RwLock<Option<Arc<dyn ConfigHandler>>>,
    stats: EngineStats,
}

impl FastPathEngine {
    /// Creates a standalone engine instance.
    ///
    /// Most callers go through [`attach`], which shares one instance per
    /// name process-wide; direct construction exists for owners that
    /// manage their own lifetime (and for tests, which want independent
    /// instances).
    pub fn new(name: impl Into<String>) -> Self {
        let hot = Arc::new(HotCache::new());
        Self {
            name: name.into(),
            brc: BrcTable::new(Arc::clone(&hot)),
            ipc: IpcTable::new(),
            hot,
            devices: DeviceRegistry::new(),
            suspend_tcp: AtomicU32::new(0),
            suspend_udp: AtomicU32::new(0),
            fwd_hook: RwLock::new(None),
            callbacks: RwLock::new(None),
            config_handler: RwLock::new(None),
            stats: EngineStats::default(),
        }
    }

    fn class_suspended(&self, class: L4Class) -> bool {
        match class {
            L4Class::Tcp => self.suspend_tcp.load(Ordering::Relaxed) != 0,
            L4Class::Udp => self.suspend_udp.load(Ordering::Relaxed) != 0,
            L4Class::Other => false,
        }
    }

    fn transmit(&self, txif: RawDeviceId, packet: &Packet) -> bool {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match callbacks {
            Some(cb) => {
                cb.transmit(txif, packet);
                true
            }
            None => false,
        }
    }

    fn forward_ipc(
        &self,
        packet: &mut Packet,
        entry: &Arc<IpcEntry>,
    ) -> Result<ForwardOutcome, DropPacket> {
        let hook = self
            .fwd_hook
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(hook) = hook {
            if hook.inspect(packet, entry) == ForwardDecision::Drop {
                EngineStats::bump(&self.stats.drops);
                debug!(tuple = %entry.tuple(), "forward hook vetoed packet");
                return Err(DropPacket);
            }
        }

        let action = entry.action();
        if let Some(tuple) = packet.tuple.as_mut() {
            if let Some(nat) = entry.nat() {
                if action.contains(ActionFlags::SNAT) {
                    tuple.src_ip = nat.ip;
                    tuple.src_port = nat.port;
                }
                if action.contains(ActionFlags::DNAT) {
                    tuple.dst_ip = nat.ip;
                    tuple.dst_port = nat.port;
                }
            }
        }
        if action.contains(ActionFlags::TOS) {
            packet.tos = entry.tos();
        }
        if action.contains(ActionFlags::MARK) {
            packet.mark = entry.mark();
        }
        if action.contains(ActionFlags::TAG) {
            packet.vlan = Some(entry.vlan());
        } else if action.contains(ActionFlags::UNTAG) {
            packet.vlan = None;
        }
        packet.dst_mac = entry.dst_mac();
        packet.src_mac = entry.src_mac();

        let txif = entry.txif();
        if !self.transmit(txif, packet) {
            return Ok(ForwardOutcome::Miss);
        }
        entry.touch(packet.len as u64);
        EngineStats::bump(&self.stats.ipc_hits);
        Ok(ForwardOutcome::Forwarded { txif })
    }

    fn forward_brc(
        &self,
        packet: &mut Packet,
        entry: &Arc<BrcEntry>,
        rxif: RawDeviceId,
    ) -> Result<ForwardOutcome, DropPacket> {
        if entry.is_suspended() || entry.txif() == rxif {
            EngineStats::bump(&self.stats.misses);
            return Ok(ForwardOutcome::Miss);
        }

        let action = entry.action();
        if action.contains(ActionFlags::TAG) {
            packet.vlan = Some(entry.vlan());
        } else if action.contains(ActionFlags::UNTAG) {
            packet.vlan = None;
        }

        let txif = entry.txif();
        if !self.transmit(txif, packet) {
            EngineStats::bump(&self.stats.misses);
            return Ok(ForwardOutcome::Miss);
        }
        entry.touch(packet.len as u64);
        Ok(ForwardOutcome::Forwarded { txif })
    }
}

impl CacheEngine for FastPathEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        true
    }

    fn forward(
        &self,
        packet: &mut Packet,
        rxif: RawDeviceId,
    ) -> Result<ForwardOutcome, DropPacket> {
        if !self.devices.is_enabled(rxif) || !packet.dst_mac.is_forwardable() {
            EngineStats::bump(&self.stats.misses);
            return Ok(ForwardOutcome::Miss);
        }

        // L3/L4 first: a cached connection carries the richer action set.
        if let Some(tuple) = packet.tuple {
            if !self.class_suspended(tuple.l4_class()) {
                if let Some(entry) = self.ipc.lookup(&tuple) {
                    if !entry.is_suspended() {
                        return self.forward_ipc(packet, &entry);
                    }
                }
            }
        }

        // L2 bridge-cache path, hot slot first.
        if let Some(bank) = self.hot.bank_for(rxif) {
            if let Some(entry) = bank.probe(&packet.dst_mac) {
                EngineStats::bump(&self.stats.hot_hits);
                return self.forward_brc(packet, &entry, rxif);
            }
        }
        if let Some(entry) = self.brc.lookup(&packet.dst_mac) {
            // Write-through on miss: the next packet of this flow should
            // hit the slot.
            if let Some(bank) = self.hot.bank_for(rxif) {
                if entry.txif() != rxif {
                    bank.refresh(&entry);
                }
            }
            EngineStats::bump(&self.stats.brc_hits);
            return self.forward_brc(packet, &entry, rxif);
        }

        EngineStats::bump(&self.stats.misses);
        Ok(ForwardOutcome::Miss)
    }

    fn fwd_callback_register(&self, hook: Arc<dyn ForwardHook>) {
        let mut slot = self.fwd_hook.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(hook);
    }

    fn callbacks_register(&self, callbacks: Arc<dyn EngineCallbacks>) {
        let mut slot = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(callbacks);
    }

    fn dev_register(&self, id: RawDeviceId, name: &str, is_bridge: bool) -> CacheResult<()> {
        self.devices.register(id, name, is_bridge);
        Ok(())
    }

    fn dev_unregister(&self, id: RawDeviceId) -> CacheResult<()> {
        self.devices.unregister(id)?;
        self.hot.disable(id);
        let brc = self.brc.delete_by_txif(id);
        let ipc = self.ipc.delete_by_txif(id);
        if brc + ipc > 0 {
            info!(device = id, brc, ipc, "drained entries for unregistered device");
        }
        Ok(())
    }

    fn dev_vlan_add(
        &self,
        id: RawDeviceId,
        vid: VlanId,
        vlan_dev: RawDeviceId,
        tagging: TaggingMode,
    ) -> CacheResult<()> {
        self.devices.vlan_add(id, vid, vlan_dev, tagging)
    }

    fn dev_vlan_delete(&self, id: RawDeviceId, vid: VlanId) -> CacheResult<()> {
        self.devices.vlan_delete(id, vid)
    }

    fn is_enabled(&self, id: RawDeviceId) -> bool {
        self.devices.is_enabled(id)
    }

    fn is_bridge_interface(&self, id: RawDeviceId) -> bool {
        self.devices.is_bridge(id)
    }

    fn enable(&self, id: RawDeviceId, on: bool) -> CacheResult<Option<Arc<HotBank>>> {
        if on {
            self.devices.set_enabled(id, true)?;
            let bank = self.hot.enable(id)?;
            Ok(Some(bank))
        } else {
            self.devices.set_enabled(id, false)?;
            self.hot.disable(id);
            Ok(None)
        }
    }

    fn brc_add(&self, req: BrcRequest) -> CacheResult<()> {
        if !self.devices.contains(req.txif) {
            return Err(CacheError::DeviceNotRegistered(req.txif));
        }
        self.brc.add(req)
    }

    fn brc_delete(&self, mac: &MacAddress) -> CacheResult<()> {
        self.brc.delete(mac)
    }

    fn brc_lookup(&self, mac: &MacAddress) -> Option<Arc<BrcEntry>> {
        self.brc.lookup(mac)
    }

    fn brc_count(&self) -> usize {
        self.brc.count()
    }

    fn brc_age(&self, mac: &MacAddress) -> CacheResult<AgeVerdict> {
        let entry = self.brc.lookup(mac).ok_or(CacheError::NotFound)?;
        let verdict = sweep_entry(&entry);
        if let AgeVerdict::Cooling { probe: Some(ip) } = verdict {
            let callbacks = self
                .callbacks
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(cb) = callbacks {
                cb.send_arp_request(ip, entry.txif());
                EngineStats::bump(&self.stats.arp_probes);
                debug!(%mac, %ip, "arp probe for cooling entry");
            }
        }
        Ok(verdict)
    }

    fn ipc_add(&self, req: IpcRequest) -> CacheResult<()> {
        if !self.devices.contains(req.txif) {
            return Err(CacheError::DeviceNotRegistered(req.txif));
        }
        if let Some(txbif) = req.txbif {
            if !self.devices.contains(txbif) {
                return Err(CacheError::DeviceNotRegistered(txbif));
            }
        }
        self.ipc.add(req)
    }

    fn ipc_delete(&self, tuple: &FlowTuple) -> CacheResult<()> {
        self.ipc.delete(tuple)
    }

    fn ipc_delete_multi(&self, tuples: &[FlowTuple]) -> usize {
        self.ipc.delete_multi(tuples)
    }

    fn ipc_delete_range(&self, start: &FlowTuple, end: &FlowTuple) -> usize {
        self.ipc.delete_range(start, end)
    }

    fn ipc_action(
        &self,
        start: &FlowTuple,
        end: &FlowTuple,
        flags: ActionFlags,
        on: bool,
    ) -> CacheResult<usize> {
        flags.validate().map_err(CacheError::InvalidArgument)?;
        Ok(self.ipc.apply_action(start, end, flags, on))
    }

    fn ipc_lookup(&self, tuple: &FlowTuple) -> Option<Arc<IpcEntry>> {
        let entry = self.ipc.lookup(tuple)?;
        entry.pin();
        Some(entry)
    }

    fn ipc_lookup_by_l4proto(&self, protocol: u8) -> Vec<Arc<IpcEntry>> {
        self.ipc.lookup_by_l4proto(protocol)
    }

    fn ipc_release(&self, entry: &IpcEntry) {
        entry.unpin();
    }

    fn ipc_count(&self) -> usize {
        self.ipc.count()
    }

    fn ipc_age_sweep(&self) -> usize {
        let reclaimed = self.ipc.sweep();
        if reclaimed > 0 {
            debug!(reclaimed, "ipc aging sweep");
        }
        reclaimed
    }

    fn suspend_apply(&self, wire_mask: u32, on: bool) -> CacheResult<()> {
        let mask = SuspendMask::from_wire(wire_mask)?;
        if on {
            self.suspend_tcp.fetch_or(mask.tcp.bits(), Ordering::Relaxed);
            self.suspend_udp.fetch_or(mask.udp.bits(), Ordering::Relaxed);
        } else {
            self.suspend_tcp
                .fetch_and(!mask.tcp.bits(), Ordering::Relaxed);
            self.suspend_udp
                .fetch_and(!mask.udp.bits(), Ordering::Relaxed);
        }
        Ok(())
    }

    fn suspend_masks(&self) -> SuspendMask {
        SuspendMask {
            tcp: Bitset32::from_bits(self.suspend_tcp.load(Ordering::Relaxed)),
            udp: Bitset32::from_bits(self.suspend_udp.load(Ordering::Relaxed)),
        }
    }

    fn acquire(&self) -> CacheGuard<'_> {
        CacheGuard::new(self.brc.read_guard(), self.ipc.read_guard())
    }

    fn dump(&self, sink: &mut dyn fmt::Write) -> fmt::Result {
        let stats = self.stats.snapshot();
        let masks = self.suspend_masks();
        writeln!(sink, "engine {}: enabled", self.name)?;
        writeln!(
            sink,
            "suspend: tcp {} udp {}",
            masks.tcp, masks.udp
        )?;
        writeln!(
            sink,
            "stats: hot {} brc {} ipc {} miss {} drop {} probe {}",
            stats.hot_hits,
            stats.brc_hits,
            stats.ipc_hits,
            stats.misses,
            stats.drops,
            stats.arp_probes,
        )?;
        self.devices.dump_into(sink)?;
        self.brc.dump_into(sink)?;
        self.ipc.dump_into(sink)
    }

    fn config_request(&self, payload: &[u8]) -> CacheResult<Vec<u8>> {
        let handler = self
            .config_handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match handler {
            Some(handler) => Ok(handler.handle(payload)),
            None => {
                warn!("config request with no handler registered");
                Ok(Vec::new())
            }
        }
    }

    fn config_handler_register(&self, handler: Arc<dyn ConfigHandler>) {
        let mut slot = self
            .config_handler
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(handler);
    }

    fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Null-object engine: every operation is a neutral no-op.
pub struct DisabledEngine {
    name: String,
}

impl DisabledEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl CacheEngine for DisabledEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        false
    }

    fn forward(
        &self,
        _packet: &mut Packet,
        _rxif: RawDeviceId,
    ) -> Result<ForwardOutcome, DropPacket> {
        Ok(ForwardOutcome::Miss)
    }

    fn fwd_callback_register(&self, _hook: Arc<dyn ForwardHook>) {}

    fn callbacks_register(&self, _callbacks: Arc<dyn EngineCallbacks>) {}

    fn dev_register(&self, _id: RawDeviceId, _name: &str, _is_bridge: bool) -> CacheResult<()> {
        Ok(())
    }

    fn dev_unregister(&self, _id: RawDeviceId) -> CacheResult<()> {
        Ok(())
    }

    fn dev_vlan_add(
        &self,
        _id: RawDeviceId,
        _vid: VlanId,
        _vlan_dev: RawDeviceId,
        _tagging: TaggingMode,
    ) -> CacheResult<()> {
        Ok(())
    }

    fn dev_vlan_delete(&self, _id: RawDeviceId, _vid: VlanId) -> CacheResult<()> {
        Ok(())
    }

    fn is_enabled(&self, _id: RawDeviceId) -> bool {
        false
    }

    fn is_bridge_interface(&self, _id: RawDeviceId) -> bool {
        false
    }

    fn enable(&self, _id: RawDeviceId, _on: bool) -> CacheResult<Option<Arc<HotBank>>> {
        Ok(None)
    }

    fn brc_add(&self, _req: BrcRequest) -> CacheResult<()> {
        Ok(())
    }

    fn brc_delete(&self, _mac: &MacAddress) -> CacheResult<()> {
        Ok(())
    }

    fn brc_lookup(&self, _mac: &MacAddress) -> Option<Arc<BrcEntry>> {
        None
    }

    fn brc_count(&self) -> usize {
        0
    }

    fn brc_age(&self, _mac: &MacAddress) -> CacheResult<AgeVerdict> {
        // Nothing is cached, so nothing holds the slow-path entry alive.
        Ok(AgeVerdict::Expire)
    }

    fn ipc_add(&self, _req: IpcRequest) -> CacheResult<()> {
        Ok(())
    }

    fn ipc_delete(&self, _tuple: &FlowTuple) -> CacheResult<()> {
        Ok(())
    }

    fn ipc_delete_multi(&self, _tuples: &[FlowTuple]) -> usize {
        0
    }

    fn ipc_delete_range(&self, _start: &FlowTuple, _end: &FlowTuple) -> usize {
        0
    }

    fn ipc_action(
        &self,
        _start: &FlowTuple,
        _end: &FlowTuple,
        _flags: ActionFlags,
        _on: bool,
    ) -> CacheResult<usize> {
        Ok(0)
    }

    fn ipc_lookup(&self, _tuple: &FlowTuple) -> Option<Arc<IpcEntry>> {
        None
    }

    fn ipc_lookup_by_l4proto(&self, _protocol: u8) -> Vec<Arc<IpcEntry>> {
        Vec::new()
    }

    fn ipc_release(&self, _entry: &IpcEntry) {}

    fn ipc_count(&self) -> usize {
        0
    }

    fn ipc_age_sweep(&self) -> usize {
        0
    }

    fn suspend_apply(&self, _wire_mask: u32, _on: bool) -> CacheResult<()> {
        Ok(())
    }

    fn suspend_masks(&self) -> SuspendMask {
        SuspendMask::default()
    }

    fn acquire(&self) -> CacheGuard<'_> {
        CacheGuard::empty()
    }

    fn dump(&self, sink: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(sink, "engine {}: disabled", self.name)
    }

    fn config_request(&self, _payload: &[u8]) -> CacheResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn config_handler_register(&self, _handler: Arc<dyn ConfigHandler>) {}

    fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot::default()
    }
}

struct Instance {
    handle: Handle,
    on_detach: Option<DetachFn>,
}

static INSTANCES: Lazy<Mutex<HashMap<String, Instance>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Attaches to the named engine instance, creating it on first call.
///
/// A second attach for the same name returns the existing handle, so every
/// driver of a shared instance sees the same tables.
pub fn attach(config: EngineConfig) -> Handle {
    attach_inner(config, None)
}

/// Like [`attach`], with a teardown notification.
///
/// The callback is kept only when this call creates the instance, and runs
/// exactly once, from [`detach`].
pub fn attach_with(config: EngineConfig, on_detach: DetachFn) -> Handle {
    attach_inner(config, Some(on_detach))
}

fn attach_inner(config: EngineConfig, on_detach: Option<DetachFn>) -> Handle {
    let mut instances = INSTANCES.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(instance) = instances.get(&config.name) {
        return Arc::clone(&instance.handle);
    }
    let handle: Handle = if config.enabled {
        Arc::new(FastPathEngine::new(config.name.clone()))
    } else {
        Arc::new(DisabledEngine::new(&config.name))
    };
    info!(name = %config.name, enabled = config.enabled, "engine attached");
    instances.insert(
        config.name,
        Instance {
            handle: Arc::clone(&handle),
            on_detach,
        },
    );
    handle
}

/// Tears down the named instance, invoking its detach callback once.
///
/// Returns false if no such instance is attached. Handles held by other
/// callers keep the engine memory alive, but the name is free for a fresh
/// attach afterwards.
pub fn detach(name: &str) -> bool {
    let instance = {
        let mut instances = INSTANCES.lock().unwrap_or_else(|e| e.into_inner());
        instances.remove(name)
    };
    match instance {
        Some(instance) => {
            if let Some(on_detach) = instance.on_detach {
                on_detach();
            }
            info!(name, "engine detached");
            true
        }
        None => false,
    }
}
