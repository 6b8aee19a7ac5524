//! Slice-based rendition of the per-packet decision pipeline.
//!
//! This is the same validate / select / rewrite / count sequence the XDP
//! program runs, expressed over an ordinary byte buffer so it can be
//! exercised off-box against an in-memory [`StateStore`]. The kernel side
//! mirrors it with raw-pointer accesses the verifier can check; the header
//! offsets and checksum arithmetic are shared from here.

use crate::csum;
use crate::hash;
use crate::store::{select_backend, StateStore};

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const TCP_HDR_LEN: usize = 20;

pub const ETH_P_IP: u16 = 0x0800;
pub const IPPROTO_TCP: u8 = 6;

const IP_OFF: usize = ETH_HDR_LEN;
const TCP_OFF: usize = ETH_HDR_LEN + IPV4_HDR_LEN;

/// Terminal outcome for one packet. Both variants deliver the packet
/// onward; there is no drop in this hook.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Delivered byte-for-byte unmodified.
    Pass,
    /// Destination rewritten to a backend, checksums repaired, counter
    /// bumped. Carries the diagnostic triple for observability consumers.
    Forward { saddr: u32, index: u32, daddr: u32 },
}

/// Run the full decision tree over one Ethernet frame.
///
/// Any failure at any stage — truncated buffer, foreign traffic, missing
/// configuration, unusable backend — short-circuits to [`Verdict::Pass`]
/// with the frame untouched and no counter movement.
pub fn process<S: StateStore>(store: &S, frame: &mut [u8]) -> Verdict {
    if frame.len() < ETH_HDR_LEN {
        return Verdict::Pass;
    }
    if u16::from_be_bytes([frame[12], frame[13]]) != ETH_P_IP {
        return Verdict::Pass;
    }

    if frame.len() < IP_OFF + IPV4_HDR_LEN {
        return Verdict::Pass;
    }
    if frame[IP_OFF + 9] != IPPROTO_TCP {
        return Verdict::Pass;
    }
    // Options would shift the TCP header and widen the checksum span;
    // those packets are not ours to rewrite.
    if frame[IP_OFF] & 0x0f != 5 {
        return Verdict::Pass;
    }

    if frame.len() < TCP_OFF + TCP_HDR_LEN {
        return Verdict::Pass;
    }

    let Some(port) = store.target_port() else {
        return Verdict::Pass;
    };
    let dst_port = u16::from_be_bytes([frame[TCP_OFF + 2], frame[TCP_OFF + 3]]);
    if dst_port != port {
        return Verdict::Pass;
    }

    let saddr = read_be32(frame, IP_OFF + 12);
    let sport = u16::from_be_bytes([frame[TCP_OFF], frame[TCP_OFF + 1]]);
    let Some((index, backend)) = select_backend(store, saddr, sport) else {
        return Verdict::Pass;
    };

    let old_daddr = read_be32(frame, IP_OFF + 16);
    frame[IP_OFF + 16..IP_OFF + 20].copy_from_slice(&backend.ip.to_be_bytes());

    let ip_check = csum::ipv4_checksum(&frame[IP_OFF..IP_OFF + IPV4_HDR_LEN]);
    frame[IP_OFF + 10..IP_OFF + 12].copy_from_slice(&ip_check.to_be_bytes());

    let old_check = u16::from_be_bytes([frame[TCP_OFF + 16], frame[TCP_OFF + 17]]);
    let new_check = csum::tcp_checksum_update(old_check, old_daddr, backend.ip);
    frame[TCP_OFF + 16..TCP_OFF + 18].copy_from_slice(&new_check.to_be_bytes());

    store.record_forward(index);

    Verdict::Forward { saddr, index, daddr: backend.ip }
}

/// Ring slot a flow lands on, exposed for tooling that precomputes ring
/// assignments.
pub fn slot_for_flow(saddr: u32, sport: u16) -> u32 {
    hash::ring_slot(hash::flow_hash(saddr, sport))
}

#[inline(always)]
fn read_be32(frame: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([frame[off], frame[off + 1], frame[off + 2], frame[off + 3]])
}
