//! Direct-mapped hot cache for the single hottest MAC per hash slot.

mod cache;

pub use cache::{HotBank, HotCache, BRC_HOT_BANKS, BRC_HOT_SLOTS};
