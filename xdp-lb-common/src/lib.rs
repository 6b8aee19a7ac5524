#![no_std]

//! Types and logic shared between the `xdp-lb` loader and the
//! `xdp-lb-ebpf` kernel program.
//!
//! Everything here is `no_std` and allocation-free so it can run inside the
//! XDP hook; the `user` feature adds the `aya::Pod` impls the loader needs
//! to move these values through the shared maps.

pub mod csum;
pub mod hash;
pub mod packet;
pub mod store;

pub use packet::Verdict;
pub use store::StateStore;

/// Capacity of the backend pool. Indices at or above this never resolve.
pub const MAX_BACKENDS: u32 = 16;

/// Number of slots in the hash ring.
pub const RING_SIZE: u32 = 256;

/// One backend slot in the pool.
///
/// `ip` is kept in host byte order; the rewriter converts when writing it
/// into the packet. `port` is informational only — the hook rewrites the
/// destination address, not the destination port.
#[derive(Copy, Clone, Debug, Default)]
#[repr(C)]
pub struct Backend {
    pub ip: u32,
    pub port: u16,
    pub active: u16,
}

impl Backend {
    /// A backend takes traffic only when it is marked active and has a
    /// real address. Anything else counts as an empty slot.
    #[inline(always)]
    pub fn is_usable(&self) -> bool {
        self.active != 0 && self.ip != 0
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for Backend {}
