#![no_std]
#![no_main]

use core::mem;
use core::sync::atomic::{AtomicU64, Ordering};

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::Array,
    programs::XdpContext,
};
use aya_log_ebpf::info;

use xdp_lb_common::packet::{ETH_P_IP, IPPROTO_TCP};
use xdp_lb_common::store::select_backend;
use xdp_lb_common::{csum, Backend, StateStore, MAX_BACKENDS, RING_SIZE};

#[allow(dead_code)]
#[repr(C)]
struct EthHdr {
    h_dest: [u8; 6],
    h_source: [u8; 6],
    h_proto: u16,
}

#[allow(dead_code)]
#[repr(C)]
struct Ipv4Hdr {
    version_ihl: u8,
    tos: u8,
    tot_len: u16,
    id: u16,
    frag_off: u16,
    ttl: u8,
    protocol: u8,
    check: u16,
    saddr: u32,
    daddr: u32,
}

#[allow(dead_code)]
#[repr(C)]
struct TcpHdr {
    source: u16,
    dest: u16,
    seq: u32,
    ack_seq: u32,
    doff_flags: [u8; 2],
    window: u16,
    check: u16,
    urg_ptr: u16,
}

const ETH_HDR_LEN: usize = mem::size_of::<EthHdr>();
const IPV4_HDR_LEN: usize = mem::size_of::<Ipv4Hdr>();

#[map]
static BACKENDS: Array<Backend> = Array::with_max_entries(MAX_BACKENDS, 0);

#[map]
static HASH_RING: Array<u32> = Array::with_max_entries(RING_SIZE, 0);

#[map]
static CONN_COUNT: Array<u64> = Array::with_max_entries(MAX_BACKENDS, 0);

#[map]
static LB_PORT: Array<u32> = Array::with_max_entries(1, 0);

/// Live view over the shared maps. Lookups go straight to the maps on
/// every packet; concurrent updates from the control plane are tolerated.
struct Maps;

impl StateStore for Maps {
    #[inline(always)]
    fn target_port(&self) -> Option<u16> {
        match LB_PORT.get(0) {
            Some(port) if *port != 0 => Some(*port as u16),
            _ => None,
        }
    }

    #[inline(always)]
    fn ring_entry(&self, slot: u32) -> Option<u32> {
        HASH_RING.get(slot).copied()
    }

    #[inline(always)]
    fn backend(&self, index: u32) -> Option<Backend> {
        BACKENDS.get(index).copied()
    }

    #[inline(always)]
    fn record_forward(&self, index: u32) {
        if let Some(count) = CONN_COUNT.get_ptr_mut(index) {
            let count = unsafe { &*(count as *const AtomicU64) };
            count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[xdp]
pub fn xdp_lb(ctx: XdpContext) -> u32 {
    match try_xdp_lb(&ctx) {
        Ok(ret) => ret,
        Err(()) => xdp_action::XDP_PASS,
    }
}

fn try_xdp_lb(ctx: &XdpContext) -> Result<u32, ()> {
    let eth: *const EthHdr = ptr_at(ctx, 0)?;
    if u16::from_be(unsafe { (*eth).h_proto }) != ETH_P_IP {
        return Ok(xdp_action::XDP_PASS);
    }

    let iph: *mut Ipv4Hdr = ptr_at_mut(ctx, ETH_HDR_LEN)?;
    if unsafe { (*iph).protocol } != IPPROTO_TCP {
        return Ok(xdp_action::XDP_PASS);
    }
    // Options would shift the TCP header; leave those packets alone.
    if unsafe { (*iph).version_ihl } & 0x0f != 5 {
        return Ok(xdp_action::XDP_PASS);
    }

    let tcph: *mut TcpHdr = ptr_at_mut(ctx, ETH_HDR_LEN + IPV4_HDR_LEN)?;

    let store = Maps;
    let Some(port) = store.target_port() else {
        return Ok(xdp_action::XDP_PASS);
    };
    if u16::from_be(unsafe { (*tcph).dest }) != port {
        return Ok(xdp_action::XDP_PASS);
    }

    let saddr = u32::from_be(unsafe { (*iph).saddr });
    let sport = u16::from_be(unsafe { (*tcph).source });
    let Some((index, backend)) = select_backend(&store, saddr, sport) else {
        return Ok(xdp_action::XDP_PASS);
    };

    let old_daddr = u32::from_be(unsafe { (*iph).daddr });
    unsafe {
        (*iph).daddr = backend.ip.to_be();
        let header = &*(iph as *const [u8; IPV4_HDR_LEN]);
        (*iph).check = csum::ipv4_checksum(header).to_be();

        let old_check = u16::from_be((*tcph).check);
        (*tcph).check = csum::tcp_checksum_update(old_check, old_daddr, backend.ip).to_be();
    }

    store.record_forward(index);

    info!(ctx, "{:i}:{} -> backend[{}] {:i}", saddr, sport, index, backend.ip);

    Ok(xdp_action::XDP_PASS)
}

#[inline(always)]
fn ptr_at<T>(ctx: &XdpContext, offset: usize) -> Result<*const T, ()> {
    let start = ctx.data();
    let end = ctx.data_end();
    let len = mem::size_of::<T>();

    if start + offset + len > end {
        return Err(());
    }

    Ok((start + offset) as *const T)
}

#[inline(always)]
fn ptr_at_mut<T>(ctx: &XdpContext, offset: usize) -> Result<*mut T, ()> {
    Ok(ptr_at::<T>(ctx, offset)? as *mut T)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
