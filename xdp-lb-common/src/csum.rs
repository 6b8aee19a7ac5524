//! One's-complement checksum arithmetic for the IP and TCP headers.
//!
//! Word values are handled in host byte order end to end: callers convert
//! wire fields with `from_be` on the way in and `to_be` on the way out.
//! Carry folding is exact 16-bit end-around arithmetic; nothing here may be
//! replaced with an approximation.

/// Fold a 32-bit accumulator down to 16 bits with end-around carry.
///
/// Two folds are enough for the sums produced in this crate (at most a
/// handful of 16-bit addends), and the fixed count keeps the BPF verifier
/// happy.
#[inline(always)]
pub fn fold(mut sum: u32) -> u16 {
    sum = (sum & 0xffff) + (sum >> 16);
    sum = (sum & 0xffff) + (sum >> 16);
    sum as u16
}

/// Checksum of an IPv4 header, computed from scratch.
///
/// Sums every 16-bit word of `header` with the checksum word (bytes 10-11)
/// taken as zero, folds, and complements. The caller does not need to clear
/// the stored checksum first.
#[inline(always)]
pub fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < header.len() {
        if i != 10 {
            sum += u16::from_be_bytes([header[i], header[i + 1]]) as u32;
        }
        i += 2;
    }
    !fold(sum)
}

/// Incremental TCP checksum update for a rewritten destination address
/// (RFC 1624 method: add the complement of the removed words and the new
/// words to the complement of the old checksum).
///
/// Only the pseudo-header changes when the destination address is
/// rewritten, so this is arithmetically identical to recomputing the whole
/// checksum over the untouched segment.
#[inline(always)]
pub fn tcp_checksum_update(check: u16, old_daddr: u32, new_daddr: u32) -> u16 {
    let mut sum = (!check) as u32;
    sum += (!((old_daddr >> 16) as u16)) as u32;
    sum += (!(old_daddr as u16)) as u32;
    sum += (new_daddr >> 16) & 0xffff;
    sum += new_daddr & 0xffff;
    !fold(sum)
}
