//! Connection-cache hash table.

use super::types::{IpcEntry, IpcRequest};
use crate::action::ActionFlags;
use crate::device::RawDeviceId;
use crate::error::{CacheError, CacheResult};
use fastpath_types::FlowTuple;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

type EntryMap = HashMap<FlowTuple, Arc<IpcEntry>>;

/// Chained hash table of connection-cache entries, keyed by 5-tuple.
///
/// Same locking shape as the bridge cache: structural mutation under the
/// write lock, lookups clone the `Arc` out, per-entry state behind
/// atomics. Bulk deletions run entirely inside one write-lock section.
pub struct IpcTable {
    entries: RwLock<EntryMap>,
}

impl Default for IpcTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, EntryMap> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntryMap> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn read_guard(&self) -> RwLockReadGuard<'_, EntryMap> {
        self.read()
    }

    fn validate(req: &IpcRequest) -> CacheResult<()> {
        if req.tuple.is_null() {
            return Err(CacheError::InvalidArgument(
                "null flow tuple cannot key a connection".into(),
            ));
        }
        req.action.validate().map_err(CacheError::InvalidArgument)?;
        if req
            .action
            .intersects(ActionFlags::SNAT.union(ActionFlags::DNAT))
            && req.nat.is_none()
        {
            return Err(CacheError::InvalidArgument(
                "NAT action without a rewrite record".into(),
            ));
        }
        Ok(())
    }

    /// Adds an entry, refreshing in place if the tuple is already cached.
    ///
    /// The connection tracker re-issues adds when a NAT decision changes;
    /// those must update the one existing entry, never duplicate it.
    pub fn add(&self, req: IpcRequest) -> CacheResult<()> {
        Self::validate(&req)?;
        let tuple = req.tuple;
        let mut entries = self.write();
        match entries.get(&tuple) {
            Some(entry) => {
                entry.refresh(req);
                debug!(%tuple, "ipc entry refreshed");
            }
            None => {
                entries.insert(tuple, Arc::new(IpcEntry::new(req)));
                debug!(%tuple, "ipc entry created");
            }
        }
        Ok(())
    }

    /// Strict insert; fails if the tuple is already cached.
    pub fn insert(&self, req: IpcRequest) -> CacheResult<()> {
        Self::validate(&req)?;
        let mut entries = self.write();
        if entries.contains_key(&req.tuple) {
            return Err(CacheError::DuplicateKey);
        }
        entries.insert(req.tuple, Arc::new(IpcEntry::new(req)));
        Ok(())
    }

    pub fn lookup(&self, tuple: &FlowTuple) -> Option<Arc<IpcEntry>> {
        self.read().get(tuple).cloned()
    }

    /// Returns every entry matching an L4 protocol number.
    pub fn lookup_by_l4proto(&self, protocol: u8) -> Vec<Arc<IpcEntry>> {
        self.read()
            .iter()
            .filter(|(tuple, _)| tuple.protocol == protocol)
            .map(|(_, e)| Arc::clone(e))
            .collect()
    }

    pub fn delete(&self, tuple: &FlowTuple) -> CacheResult<()> {
        let mut entries = self.write();
        match entries.remove(tuple) {
            Some(_) => {
                debug!(%tuple, "ipc entry deleted");
                Ok(())
            }
            None => Err(CacheError::NotFound),
        }
    }

    /// Deletes the given tuples; absent tuples are skipped.
    pub fn delete_multi(&self, tuples: &[FlowTuple]) -> usize {
        let mut entries = self.write();
        tuples
            .iter()
            .filter(|tuple| entries.remove(tuple).is_some())
            .count()
    }

    /// Deletes every entry with `start <= tuple <= end`.
    ///
    /// An inverted range is a no-op.
    pub fn delete_range(&self, start: &FlowTuple, end: &FlowTuple) -> usize {
        if start > end {
            return 0;
        }
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|tuple, _| !(*start <= *tuple && *tuple <= *end));
        before - entries.len()
    }

    /// Deletes every entry whose egress interface is `txif`.
    pub fn delete_by_txif(&self, txif: RawDeviceId) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, e| e.txif() != txif && e.txbif() != Some(txif));
        before - entries.len()
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Applies action flags to every entry in the inclusive tuple range.
    ///
    /// `SUSPEND` is counted rather than set: each suspend request bumps
    /// the per-connection counter and each resume drops it, so overlapping
    /// slow-path transitions do not release each other's holds.
    pub fn apply_action(
        &self,
        start: &FlowTuple,
        end: &FlowTuple,
        flags: ActionFlags,
        on: bool,
    ) -> usize {
        if start > end {
            return 0;
        }
        let entries = self.read();
        let mut touched = 0;
        for (tuple, entry) in entries.iter() {
            if *start <= *tuple && *tuple <= *end {
                if flags.contains(ActionFlags::SUSPEND) {
                    if on {
                        entry.suspend_inc();
                    } else {
                        entry.suspend_dec();
                    }
                }
                let rest = flags.difference(ActionFlags::SUSPEND);
                if !rest.is_empty() {
                    entry.set_action(rest, on);
                }
                touched += 1;
            }
        }
        touched
    }

    /// One aging pass: deletes idle, unpinned entries.
    ///
    /// An entry that saw traffic since the previous pass survives with its
    /// liveness zeroed. Malformed entries are skipped and logged, never
    /// allowed to abort the sweep.
    pub fn sweep(&self) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|tuple, entry| {
            if tuple.is_null() {
                warn!(%tuple, "skipping malformed entry in aging sweep");
                return true;
            }
            if entry.pins() > 0 {
                entry.take_liveness();
                return true;
            }
            entry.take_liveness() > 0
        });
        before - entries.len()
    }

    /// Returns a snapshot of all entries, for diagnostics.
    pub(crate) fn snapshot(&self) -> Vec<Arc<IpcEntry>> {
        self.read().values().cloned().collect()
    }

    pub(crate) fn dump_into(&self, f: &mut dyn fmt::Write) -> fmt::Result {
        let entries = self.snapshot();
        writeln!(f, "ipc: {} entries", entries.len())?;
        for entry in entries {
            writeln!(f, "  {}", entry)?;
        }
        Ok(())
    }
}
