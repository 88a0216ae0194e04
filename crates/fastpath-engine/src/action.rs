//! Per-entry action flags.

use std::fmt;

/// Action flags cached on a forwarding entry.
///
/// The flag word describes everything the fast path has to do to a
/// matching packet before it leaves: VLAN tag manipulation, NAT rewrite
/// direction, PPP encapsulation changes, accounting and QoS marking.
/// `SUSPEND` parks the entry while the slow path renegotiates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionFlags(u32);

impl ActionFlags {
    /// Push the entry's VLAN tag on egress.
    pub const TAG: ActionFlags = ActionFlags(1 << 0);
    /// Strip the VLAN tag on egress.
    pub const UNTAG: ActionFlags = ActionFlags(1 << 1);
    /// Rewrite the source address/port from the NAT record.
    pub const SNAT: ActionFlags = ActionFlags(1 << 2);
    /// Rewrite the destination address/port from the NAT record.
    pub const DNAT: ActionFlags = ActionFlags(1 << 3);
    /// Entry is parked; matching packets take the slow path.
    pub const SUSPEND: ActionFlags = ActionFlags(1 << 4);
    /// Account forwarded bytes into the shared byte counter.
    pub const BYTECNT: ActionFlags = ActionFlags(1 << 5);
    /// Apply the entry's QoS mark to the packet.
    pub const MARK: ActionFlags = ActionFlags(1 << 6);
    /// Overwrite the packet's ToS/traffic-class byte.
    pub const TOS: ActionFlags = ActionFlags(1 << 7);
    /// Add PPPoE encapsulation on egress.
    pub const PPPOE_ADD: ActionFlags = ActionFlags(1 << 8);
    /// Strip PPPoE encapsulation on egress.
    pub const PPPOE_DEL: ActionFlags = ActionFlags(1 << 9);
    /// Add PPTP encapsulation on egress.
    pub const PPTP_ADD: ActionFlags = ActionFlags(1 << 10);
    /// Strip PPTP encapsulation on egress.
    pub const PPTP_DEL: ActionFlags = ActionFlags(1 << 11);
    /// Add L2TP encapsulation on egress.
    pub const L2TP_ADD: ActionFlags = ActionFlags(1 << 12);
    /// Strip L2TP encapsulation on egress.
    pub const L2TP_DEL: ActionFlags = ActionFlags(1 << 13);

    /// The empty flag set.
    pub const fn empty() -> Self {
        ActionFlags(0)
    }

    /// Reconstructs a flag set from its raw bit representation.
    pub const fn from_bits(bits: u32) -> Self {
        ActionFlags(bits)
    }

    /// Returns the raw bit representation.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    pub const fn contains(&self, other: ActionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any flag in `other` is set.
    pub const fn intersects(&self, other: ActionFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of the two flag sets.
    pub const fn union(&self, other: ActionFlags) -> ActionFlags {
        ActionFlags(self.0 | other.0)
    }

    /// Returns this set with the flags in `other` removed.
    pub const fn difference(&self, other: ActionFlags) -> ActionFlags {
        ActionFlags(self.0 & !other.0)
    }

    /// Returns true if no flags are set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Validates that the set is internally consistent.
    ///
    /// Tag/untag and the add/del halves of each encapsulation pair are
    /// mutually exclusive on a single entry.
    pub fn validate(&self) -> Result<(), String> {
        const EXCLUSIVE: [(ActionFlags, ActionFlags, &str); 4] = [
            (ActionFlags::TAG, ActionFlags::UNTAG, "TAG/UNTAG"),
            (ActionFlags::PPPOE_ADD, ActionFlags::PPPOE_DEL, "PPPOE_ADD/PPPOE_DEL"),
            (ActionFlags::PPTP_ADD, ActionFlags::PPTP_DEL, "PPTP_ADD/PPTP_DEL"),
            (ActionFlags::L2TP_ADD, ActionFlags::L2TP_DEL, "L2TP_ADD/L2TP_DEL"),
        ];
        for (a, b, name) in EXCLUSIVE {
            if self.contains(a) && self.contains(b) {
                return Err(format!("conflicting action flags: {}", name));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ActionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ActionFlags, &str); 14] = [
            (ActionFlags::TAG, "TAG"),
            (ActionFlags::UNTAG, "UNTAG"),
            (ActionFlags::SNAT, "SNAT"),
            (ActionFlags::DNAT, "DNAT"),
            (ActionFlags::SUSPEND, "SUSPEND"),
            (ActionFlags::BYTECNT, "BYTECNT"),
            (ActionFlags::MARK, "MARK"),
            (ActionFlags::TOS, "TOS"),
            (ActionFlags::PPPOE_ADD, "PPPOE_ADD"),
            (ActionFlags::PPPOE_DEL, "PPPOE_DEL"),
            (ActionFlags::PPTP_ADD, "PPTP_ADD"),
            (ActionFlags::PPTP_DEL, "PPTP_DEL"),
            (ActionFlags::L2TP_ADD, "L2TP_ADD"),
            (ActionFlags::L2TP_DEL, "L2TP_DEL"),
        ];
        if self.is_empty() {
            return write!(f, "-");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_operations() {
        let flags = ActionFlags::TAG.union(ActionFlags::SNAT);
        assert!(flags.contains(ActionFlags::TAG));
        assert!(flags.contains(ActionFlags::SNAT));
        assert!(!flags.contains(ActionFlags::DNAT));
        assert!(flags.intersects(ActionFlags::SNAT.union(ActionFlags::DNAT)));

        let without = flags.difference(ActionFlags::TAG);
        assert_eq!(without, ActionFlags::SNAT);
    }

    #[test]
    fn test_bits_round_trip() {
        let flags = ActionFlags::UNTAG.union(ActionFlags::BYTECNT);
        assert_eq!(ActionFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn test_validate_rejects_conflicts() {
        assert!(ActionFlags::TAG.union(ActionFlags::UNTAG).validate().is_err());
        assert!(ActionFlags::PPPOE_ADD
            .union(ActionFlags::PPPOE_DEL)
            .validate()
            .is_err());
        assert!(ActionFlags::TAG.union(ActionFlags::SNAT).validate().is_ok());
        assert!(ActionFlags::empty().validate().is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(ActionFlags::empty().to_string(), "-");
        assert_eq!(
            ActionFlags::UNTAG.union(ActionFlags::SNAT).to_string(),
            "UNTAG|SNAT"
        );
    }
}
