//! Hot-cache banks and slots.

use crate::brc::BrcEntry;
use crate::device::RawDeviceId;
use crate::error::{CacheError, CacheResult};
use fastpath_types::MacAddress;
use std::sync::{Arc, RwLock, Weak};

/// Direct-mapped slots per bank.
pub const BRC_HOT_SLOTS: usize = 256;

/// Maximum number of forwarding interfaces carrying a bank.
pub const BRC_HOT_BANKS: usize = 4;

#[derive(Debug)]
struct HotSlot {
    mac: MacAddress,
    entry: Weak<BrcEntry>,
}

/// One receive interface's view of the hot cache.
///
/// The slot array is advisory: a probe validates the stored MAC against
/// the authoritative entry before trusting it, and slot accesses use the
/// try variants so the packet path never blocks behind a racing writer.
/// A lost slot update just sends the packet through the full table.
#[derive(Debug)]
pub struct HotBank {
    rxif: RawDeviceId,
    slots: Vec<RwLock<Option<HotSlot>>>,
}

impl HotBank {
    fn new(rxif: RawDeviceId) -> Self {
        let mut slots = Vec::with_capacity(BRC_HOT_SLOTS);
        slots.resize_with(BRC_HOT_SLOTS, || RwLock::new(None));
        Self { rxif, slots }
    }

    /// The receive interface this bank serves.
    pub fn rxif(&self) -> RawDeviceId {
        self.rxif
    }

    /// Slot index for a MAC: xor of the two low-order octets.
    pub fn slot_index(mac: &MacAddress) -> usize {
        let (a, b) = mac.low_octets();
        (a ^ b) as usize & (BRC_HOT_SLOTS - 1)
    }

    /// Looks up the hot entry for `mac`.
    ///
    /// Returns the authoritative entry only if the slot MAC matches, the
    /// entry is still live in the owning table, and forwarding it would
    /// not reflect the packet back out the interface it arrived on.
    pub fn probe(&self, mac: &MacAddress) -> Option<Arc<BrcEntry>> {
        let slot = self.slots[Self::slot_index(mac)].try_read().ok()?;
        let hot = slot.as_ref()?;
        if hot.mac != *mac {
            return None;
        }
        let entry = hot.entry.upgrade()?;
        if entry.is_dead() || entry.txif() == self.rxif {
            return None;
        }
        Some(entry)
    }

    /// Write-through after a successful full-table lookup.
    ///
    /// Newest wins on slot collision; a contended slot is simply skipped.
    pub(crate) fn refresh(&self, entry: &Arc<BrcEntry>) {
        let mac = entry.mac();
        if let Ok(mut slot) = self.slots[Self::slot_index(&mac)].try_write() {
            *slot = Some(HotSlot {
                mac,
                entry: Arc::downgrade(entry),
            });
        }
    }

    fn invalidate(&self, mac: &MacAddress) {
        let mut slot = self.slots[Self::slot_index(mac)]
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|hot| hot.mac == *mac) {
            *slot = None;
        }
    }
}

/// The set of per-interface hot banks owned by one engine instance.
#[derive(Debug, Default)]
pub struct HotCache {
    banks: RwLock<Vec<Arc<HotBank>>>,
}

impl HotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bank serving `rxif`, if cut-through is enabled on it.
    pub fn bank_for(&self, rxif: RawDeviceId) -> Option<Arc<HotBank>> {
        let banks = self.banks.read().unwrap_or_else(|e| e.into_inner());
        banks.iter().find(|b| b.rxif == rxif).cloned()
    }

    /// Allocates (or returns the existing) bank for `rxif`.
    pub(crate) fn enable(&self, rxif: RawDeviceId) -> CacheResult<Arc<HotBank>> {
        let mut banks = self.banks.write().unwrap_or_else(|e| e.into_inner());
        if let Some(bank) = banks.iter().find(|b| b.rxif == rxif) {
            return Ok(Arc::clone(bank));
        }
        if banks.len() >= BRC_HOT_BANKS {
            return Err(CacheError::InvalidArgument(format!(
                "hot cache banks exhausted ({} interfaces)",
                BRC_HOT_BANKS
            )));
        }
        let bank = Arc::new(HotBank::new(rxif));
        banks.push(Arc::clone(&bank));
        Ok(bank)
    }

    /// Drops the bank serving `rxif`.
    pub(crate) fn disable(&self, rxif: RawDeviceId) {
        let mut banks = self.banks.write().unwrap_or_else(|e| e.into_inner());
        banks.retain(|b| b.rxif != rxif);
    }

    /// Clears every slot referring to `mac`, across all banks.
    ///
    /// Called whenever the backing entry is deleted or rewritten with a
    /// different egress interface or VLAN action.
    pub(crate) fn invalidate(&self, mac: &MacAddress) {
        let banks = self.banks.read().unwrap_or_else(|e| e.into_inner());
        for bank in banks.iter() {
            bank.invalidate(mac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionFlags;
    use crate::brc::BrcRequest;
    use fastpath_types::VlanId;
    use pretty_assertions::assert_eq;

    fn entry(mac: &str, txif: RawDeviceId) -> Arc<BrcEntry> {
        Arc::new(BrcEntry::new(BrcRequest::new(
            mac.parse().unwrap(),
            VlanId::NONE,
            txif,
            ActionFlags::empty(),
        )))
    }

    #[test]
    fn test_slot_index_uses_low_octets() {
        let a: MacAddress = "aa:bb:cc:dd:01:02".parse().unwrap();
        let b: MacAddress = "00:11:22:33:01:02".parse().unwrap();
        // Same low octets, same slot, despite different vendor prefixes.
        assert_eq!(HotBank::slot_index(&a), HotBank::slot_index(&b));
        assert_eq!(HotBank::slot_index(&a), 0x01 ^ 0x02);
    }

    #[test]
    fn test_probe_miss_on_empty_and_mismatch() {
        let bank = HotBank::new(1);
        let mac: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert!(bank.probe(&mac).is_none());

        // Aliasing MAC occupies the same slot; probe must still miss.
        let alias = entry("00:00:00:00:ee:ff", 2);
        bank.refresh(&alias);
        assert!(bank.probe(&mac).is_none());
    }

    #[test]
    fn test_probe_hit_after_refresh() {
        let bank = HotBank::new(1);
        let e = entry("aa:bb:cc:dd:ee:ff", 2);
        bank.refresh(&e);

        let hit = bank.probe(&e.mac()).expect("hot hit");
        assert_eq!(hit.mac(), e.mac());
    }

    #[test]
    fn test_probe_rejects_reflection() {
        // Entry egresses on the same interface the bank serves.
        let bank = HotBank::new(2);
        let e = entry("aa:bb:cc:dd:ee:ff", 2);
        bank.refresh(&e);
        assert!(bank.probe(&e.mac()).is_none());
    }

    #[test]
    fn test_probe_never_returns_deleted_entry() {
        let bank = HotBank::new(1);
        let e = entry("aa:bb:cc:dd:ee:ff", 2);
        bank.refresh(&e);

        e.mark_dead();
        assert!(bank.probe(&e.mac()).is_none());

        // Last strong reference gone: the weak slot cannot resurrect it.
        let mac = e.mac();
        drop(e);
        assert!(bank.probe(&mac).is_none());
    }

    #[test]
    fn test_newest_wins_on_collision() {
        let bank = HotBank::new(1);
        let old = entry("aa:bb:cc:dd:ee:ff", 2);
        let new = entry("00:00:00:00:ee:ff", 3);
        bank.refresh(&old);
        bank.refresh(&new);

        assert!(bank.probe(&old.mac()).is_none());
        assert_eq!(bank.probe(&new.mac()).expect("hit").mac(), new.mac());
    }

    #[test]
    fn test_invalidate_spares_aliased_occupant() {
        let bank = HotBank::new(1);
        let e = entry("aa:bb:cc:dd:ee:ff", 2);
        bank.refresh(&e);

        // Invalidating an aliasing MAC that is not the occupant is a no-op.
        let alias: MacAddress = "00:00:00:00:ee:ff".parse().unwrap();
        bank.invalidate(&alias);
        assert!(bank.probe(&e.mac()).is_some());

        bank.invalidate(&e.mac());
        assert!(bank.probe(&e.mac()).is_none());
    }

    #[test]
    fn test_bank_lifecycle() {
        let hot = HotCache::new();
        assert!(hot.bank_for(1).is_none());

        let bank = hot.enable(1).unwrap();
        assert_eq!(bank.rxif(), 1);

        // Idempotent enable returns the same bank.
        let again = hot.enable(1).unwrap();
        assert!(Arc::ptr_eq(&bank, &again));

        hot.disable(1);
        assert!(hot.bank_for(1).is_none());
    }

    #[test]
    fn test_bank_capacity() {
        let hot = HotCache::new();
        for rxif in 0..BRC_HOT_BANKS as u64 {
            hot.enable(rxif).unwrap();
        }
        assert!(matches!(
            hot.enable(99),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalidate_covers_all_banks() {
        let hot = HotCache::new();
        let b1 = hot.enable(1).unwrap();
        let b2 = hot.enable(2).unwrap();
        let e = entry("aa:bb:cc:dd:ee:ff", 3);
        b1.refresh(&e);
        b2.refresh(&e);

        hot.invalidate(&e.mac());
        assert!(b1.probe(&e.mac()).is_none());
        assert!(b2.probe(&e.mac()).is_none());
    }
}
