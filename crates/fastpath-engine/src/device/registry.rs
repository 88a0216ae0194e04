//! Device registry.

use super::RawDeviceId;
use crate::error::{CacheError, CacheResult};
use fastpath_types::VlanId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// Tag disposition of a VLAN configured over a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggingMode {
    Tagged,
    Untagged,
}

/// A VLAN configured over a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanBinding {
    /// The collaborator's VLAN device riding on the real device.
    pub vlan_dev: RawDeviceId,
    pub tagging: TaggingMode,
}

#[derive(Debug)]
struct DeviceState {
    name: String,
    is_bridge: bool,
    enabled: bool,
    vlans: HashMap<VlanId, VlanBinding>,
}

/// Tracks which devices and VLANs participate in the fast path.
///
/// Pure bookkeeping: registering a device or VLAN creates no cache
/// entries. Draining entries that reference an unregistered device is the
/// engine's job, sequenced before `dev_unregister` returns.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<RawDeviceId, DeviceState>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RawDeviceId, DeviceState>> {
        self.devices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RawDeviceId, DeviceState>> {
        self.devices.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a device; re-registering updates its identity in place.
    pub fn register(&self, id: RawDeviceId, name: &str, is_bridge: bool) {
        let mut devices = self.write();
        let state = devices.entry(id).or_insert_with(|| DeviceState {
            name: name.to_string(),
            is_bridge,
            enabled: false,
            vlans: HashMap::new(),
        });
        state.name = name.to_string();
        state.is_bridge = is_bridge;
        info!(device = name, id, is_bridge, "device registered");
    }

    pub fn unregister(&self, id: RawDeviceId) -> CacheResult<()> {
        let mut devices = self.write();
        match devices.remove(&id) {
            Some(state) => {
                info!(device = %state.name, id, "device unregistered");
                Ok(())
            }
            None => Err(CacheError::DeviceNotRegistered(id)),
        }
    }

    pub fn contains(&self, id: RawDeviceId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn name(&self, id: RawDeviceId) -> Option<String> {
        self.read().get(&id).map(|d| d.name.clone())
    }

    /// Flips the per-device cut-through switch. Idempotent.
    pub fn set_enabled(&self, id: RawDeviceId, on: bool) -> CacheResult<()> {
        let mut devices = self.write();
        match devices.get_mut(&id) {
            Some(state) => {
                state.enabled = on;
                Ok(())
            }
            None => Err(CacheError::DeviceNotRegistered(id)),
        }
    }

    pub fn is_enabled(&self, id: RawDeviceId) -> bool {
        self.read().get(&id).is_some_and(|d| d.enabled)
    }

    pub fn is_bridge(&self, id: RawDeviceId) -> bool {
        self.read().get(&id).is_some_and(|d| d.is_bridge)
    }

    pub fn vlan_add(
        &self,
        id: RawDeviceId,
        vid: VlanId,
        vlan_dev: RawDeviceId,
        tagging: TaggingMode,
    ) -> CacheResult<()> {
        let mut devices = self.write();
        match devices.get_mut(&id) {
            Some(state) => {
                state.vlans.insert(vid, VlanBinding { vlan_dev, tagging });
                info!(device = %state.name, %vid, "vlan added");
                Ok(())
            }
            None => Err(CacheError::DeviceNotRegistered(id)),
        }
    }

    pub fn vlan_delete(&self, id: RawDeviceId, vid: VlanId) -> CacheResult<()> {
        let mut devices = self.write();
        let state = devices
            .get_mut(&id)
            .ok_or(CacheError::DeviceNotRegistered(id))?;
        match state.vlans.remove(&vid) {
            Some(_) => {
                info!(device = %state.name, %vid, "vlan deleted");
                Ok(())
            }
            None => Err(CacheError::NotFound),
        }
    }

    pub fn vlan_lookup(&self, id: RawDeviceId, vid: VlanId) -> Option<VlanBinding> {
        self.read().get(&id).and_then(|d| d.vlans.get(&vid).copied())
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    pub(crate) fn dump_into(&self, f: &mut dyn fmt::Write) -> fmt::Result {
        let devices = self.read();
        writeln!(f, "devices: {}", devices.len())?;
        let mut ids: Vec<_> = devices.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let state = &devices[&id];
            writeln!(
                f,
                "  {} ({}) bridge {} enabled {} vlans {}",
                state.name,
                id,
                state.is_bridge,
                state.enabled,
                state.vlans.len(),
            )?;
        }
        Ok(())
    }
}
