//! Flow hashing for backend selection.
//!
//! The round sequence is pinned: any tool that precomputes ring
//! assignments for a given flow must reproduce these exact shifts, so the
//! constants here are part of the wire-level contract, not a tunable.

use crate::RING_SIZE;

/// Mix a source address and source port (both host byte order) into a
/// 32-bit hash with full avalanche. All arithmetic wraps mod 2^32.
#[inline(always)]
pub fn flow_hash(saddr: u32, sport: u16) -> u32 {
    let mut h = saddr.wrapping_add(sport as u32);
    h = h.wrapping_add(h << 10);
    h ^= h >> 6;
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h = h.wrapping_add(h << 15);
    h
}

/// Reduce a flow hash to a ring slot.
#[inline(always)]
pub fn ring_slot(hash: u32) -> u32 {
    hash % RING_SIZE
}
