//! The public cache-engine handle.
//!
//! Callers hold an `Arc<dyn CacheEngine>`; whether it is the real engine
//! or the disabled null object is decided once, at attach time, so no call
//! site ever branches on an enable flag.

mod handle;
mod types;

pub use handle::{
    attach, attach_with, detach, CacheEngine, DetachFn, DisabledEngine, FastPathEngine, Handle,
};
pub use types::{
    Bitset32, CacheGuard, ConfigHandler, EngineCallbacks, EngineConfig, EngineStatsSnapshot,
    ForwardDecision, ForwardHook, ForwardOutcome, SuspendMask,
};
