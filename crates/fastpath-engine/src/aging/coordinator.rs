//! Per-entry aging state machine.
//!
//! The slow-path learning table has its own timeout policy; the fast path
//! must keep it from evicting a MAC that is still carrying traffic, and
//! must not prop up an entry forever once traffic has moved elsewhere.
//! Each garbage-collection sweep therefore walks a candidate entry through
//! three states instead of a single busy bit:
//!
//! - **Live**: traffic hit the entry since the last sweep. The caller is
//!   told to postpone expiry; the liveness counter is zeroed and the
//!   freshness counter re-armed for the next sweep.
//! - **Cooling**: no traffic this interval, but the previous one saw some.
//!   The freshness counter is cleared and, when the entry recorded a
//!   source IPv4, one ARP probe is requested to coax the flow back onto a
//!   learnable path.
//! - **Cold**: two quiet intervals. The caller may expire the slow-path
//!   entry; the cache entry itself is only removed by the caller's
//!   explicit delete.

use crate::brc::BrcEntry;
use std::net::Ipv4Addr;

/// Sweep verdict handed back to the external garbage collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeVerdict {
    /// Traffic is still flowing; reset the slow-path age timer.
    Postpone,
    /// Flow went quiet this interval; optionally probe the recorded source.
    Cooling { probe: Option<Ipv4Addr> },
    /// Flow is cold; normal expiry may proceed.
    Expire,
}

/// Advances one entry through the aging state machine.
pub(crate) fn sweep_entry(entry: &BrcEntry) -> AgeVerdict {
    if entry.take_liveness() > 0 {
        entry.rearm_freshness();
        return AgeVerdict::Postpone;
    }
    if entry.take_freshness() > 0 {
        return AgeVerdict::Cooling {
            probe: entry.src_ip(),
        };
    }
    AgeVerdict::Expire
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionFlags;
    use crate::brc::BrcRequest;
    use fastpath_types::VlanId;
    use pretty_assertions::assert_eq;

    fn entry(src_ip: Option<Ipv4Addr>) -> BrcEntry {
        let mut req = BrcRequest::new(
            "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            VlanId::NONE,
            1,
            ActionFlags::empty(),
        );
        req.src_ip = src_ip;
        BrcEntry::new(req)
    }

    #[test]
    fn test_hit_entry_postpones() {
        let e = entry(None);
        e.touch(64);
        assert_eq!(sweep_entry(&e), AgeVerdict::Postpone);
    }

    #[test]
    fn test_quiet_entry_goes_cold_in_three_sweeps() {
        let e = entry(Some(Ipv4Addr::new(10, 0, 0, 5)));
        e.touch(64);

        assert_eq!(sweep_entry(&e), AgeVerdict::Postpone);
        assert_eq!(
            sweep_entry(&e),
            AgeVerdict::Cooling {
                probe: Some(Ipv4Addr::new(10, 0, 0, 5))
            }
        );
        assert_eq!(sweep_entry(&e), AgeVerdict::Expire);
    }

    #[test]
    fn test_hit_between_sweeps_never_cold() {
        let e = entry(None);
        e.touch(64);
        assert_eq!(sweep_entry(&e), AgeVerdict::Postpone);

        // Traffic resumes between sweeps.
        e.touch(64);
        assert_ne!(sweep_entry(&e), AgeVerdict::Expire);
    }

    #[test]
    fn test_cooling_without_recorded_source() {
        let e = entry(None);
        e.touch(64);
        sweep_entry(&e);
        assert_eq!(sweep_entry(&e), AgeVerdict::Cooling { probe: None });
    }

    #[test]
    fn test_never_touched_entry_expires_immediately() {
        let e = entry(None);
        assert_eq!(sweep_entry(&e), AgeVerdict::Expire);
    }

    #[test]
    fn test_traffic_during_cooling_recovers() {
        let e = entry(None);
        e.touch(64);
        sweep_entry(&e);
        assert!(matches!(sweep_entry(&e), AgeVerdict::Cooling { .. }));

        e.touch(64);
        assert_eq!(sweep_entry(&e), AgeVerdict::Postpone);
    }
}
