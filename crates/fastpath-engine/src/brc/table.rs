//! Bridge-cache hash table.

use super::types::{BrcEntry, BrcRequest};
use crate::action::ActionFlags;
use crate::device::RawDeviceId;
use crate::error::{CacheError, CacheResult};
use crate::hot::HotCache;
use fastpath_types::MacAddress;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

type EntryMap = HashMap<MacAddress, Arc<BrcEntry>>;

/// Chained hash table of bridge-cache entries, keyed by destination MAC.
///
/// Structural mutation takes the table write lock; lookups clone the entry
/// `Arc` out under the read lock and touch counters through atomics, so
/// the packet path never holds the lock across its work. Every removal
/// marks the entry dead and clears hot-cache slots before the write lock
/// is released, closing the window where a freed entry would still be
/// reachable.
pub struct BrcTable {
    entries: RwLock<EntryMap>,
    hot: Arc<HotCache>,
}

impl BrcTable {
    pub fn new(hot: Arc<HotCache>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hot,
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

    fn validate(req: &BrcRequest) -> CacheResult<()> {
        if !req.mac.is_forwardable() {
            return Err(CacheError::InvalidArgument(format!(
                "MAC {} cannot key a forwarding entry",
                req.mac
            )));
        }
        req.action.validate().map_err(CacheError::InvalidArgument)
    }

    /// Adds an entry, refreshing in place if the key is already present.
    ///
    /// Re-learning a moved host must not leak a second entry, so the add
    /// surface is an upsert; [`BrcTable::insert`] is the strict variant.
    pub fn add(&self, req: BrcRequest) -> CacheResult<()> {
        Self::validate(&req)?;
        let mac = req.mac;
        let mut entries = self.write();
        match entries.get(&mac) {
            Some(entry) => {
                if entry.refresh(req) {
                    self.hot.invalidate(&mac);
                }
                debug!(%mac, "brc entry refreshed");
            }
            None => {
                entries.insert(mac, Arc::new(BrcEntry::new(req)));
                debug!(%mac, "brc entry created");
            }
        }
        Ok(())
    }

    /// Strict insert; fails if the key already exists.
    pub fn insert(&self, req: BrcRequest) -> CacheResult<()> {
        Self::validate(&req)?;
        let mut entries = self.write();
        if entries.contains_key(&req.mac) {
            return Err(CacheError::DuplicateKey);
        }
        entries.insert(req.mac, Arc::new(BrcEntry::new(req)));
        Ok(())
    }

    pub fn lookup(&self, mac: &MacAddress) -> Option<Arc<BrcEntry>> {
        self.read().get(mac).cloned()
    }

    pub fn delete(&self, mac: &MacAddress) -> CacheResult<()> {
        let mut entries = self.write();
        match entries.remove(mac) {
            Some(entry) => {
                entry.mark_dead();
                self.hot.invalidate(mac);
                debug!(%mac, "brc entry deleted");
                Ok(())
            }
            None => Err(CacheError::NotFound),
        }
    }

    /// Deletes every entry with `start <= mac <= end`.
    ///
    /// An inverted range is a no-op. Runs entirely under the write lock,
    /// so no concurrent lookup can observe a partially-removed range.
    pub fn delete_range(&self, start: &MacAddress, end: &MacAddress) -> usize {
        if start > end {
            return 0;
        }
        let mut entries = self.write();
        let doomed: Vec<MacAddress> = entries
            .keys()
            .filter(|mac| *start <= **mac && **mac <= *end)
            .copied()
            .collect();
        for mac in &doomed {
            if let Some(entry) = entries.remove(mac) {
                entry.mark_dead();
                self.hot.invalidate(mac);
            }
        }
        doomed.len()
    }

    /// Deletes every entry whose egress interface is `txif`.
    pub fn delete_by_txif(&self, txif: RawDeviceId) -> usize {
        let mut entries = self.write();
        let doomed: Vec<MacAddress> = entries
            .iter()
            .filter(|(_, e)| e.txif() == txif)
            .map(|(mac, _)| *mac)
            .collect();
        for mac in &doomed {
            if let Some(entry) = entries.remove(mac) {
                entry.mark_dead();
                self.hot.invalidate(mac);
            }
        }
        doomed.len()
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Sets or clears action flags on every entry in the inclusive range.
    ///
    /// Returns how many entries were touched. Flag words are atomics, so
    /// this never blocks concurrent lookups.
    pub fn apply_action(
        &self,
        start: &MacAddress,
        end: &MacAddress,
        flags: ActionFlags,
        on: bool,
    ) -> usize {
        if start > end {
            return 0;
        }
        let entries = self.read();
        let mut touched = 0;
        for (mac, entry) in entries.iter() {
            if *start <= *mac && *mac <= *end {
                entry.set_action(flags, on);
                if flags.intersects(ActionFlags::TAG.union(ActionFlags::UNTAG)) {
                    self.hot.invalidate(mac);
                }
                touched += 1;
            }
        }
        touched
    }

    /// Returns a snapshot of all entries, for sweeps and diagnostics.
    pub(crate) fn snapshot(&self) -> Vec<Arc<BrcEntry>> {
        self.read().values().cloned().collect()
    }

    pub(crate) fn dump_into(&self, f: &mut dyn fmt::Write) -> fmt::Result {
        let entries = self.snapshot();
        writeln!(f, "brc: {} entries", entries.len())?;
        for entry in entries {
            writeln!(f, "  {}", entry)?;
        }
        Ok(())
    }
}
