//! Accessor boundary for the externally-owned load balancer tables.
//!
//! The hook never owns the backend pool, the ring, or the counters; it only
//! performs live point lookups through this trait on every packet. The BPF
//! program implements it over the shared maps, tests over in-memory fakes.

use crate::hash::{flow_hash, ring_slot};
use crate::{Backend, MAX_BACKENDS};

pub trait StateStore {
    /// Configured virtual-service port, or `None` when unset/zero
    /// (redirection disabled).
    fn target_port(&self) -> Option<u16>;

    /// Backend index stored at a ring slot, if the slot is populated.
    fn ring_entry(&self, slot: u32) -> Option<u32>;

    /// Backend record at an index, if present.
    fn backend(&self, index: u32) -> Option<Backend>;

    /// Count one forwarded packet for a backend. Must not lose updates
    /// under concurrent callers hitting the same index.
    fn record_forward(&self, index: u32);
}

/// Resolve a flow to a backend: hash, ring slot, index, record.
///
/// Every lookup on the way down has an explicit absent branch; `None` at
/// any step means the caller passes the packet through unmodified. An
/// index read from the ring is range-checked before it is used as a key
/// into the pool.
#[inline(always)]
pub fn select_backend<S: StateStore>(store: &S, saddr: u32, sport: u16) -> Option<(u32, Backend)> {
    let slot = ring_slot(flow_hash(saddr, sport));
    let index = store.ring_entry(slot)?;
    if index >= MAX_BACKENDS {
        return None;
    }
    let backend = store.backend(index)?;
    if !backend.is_usable() {
        return None;
    }
    Some((index, backend))
}
