//! Loader for the `xdp_lb` hook: attaches the program, seeds the backend
//! pool, ring, and target port, and prints per-backend forward counts.
//!
//! Pool and ring contents are fixed at startup from the command line; this
//! binary carries no health checking or dynamic pool management.

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Context;
use aya::maps::Array;
use aya::programs::{Xdp, XdpFlags};
use aya::Ebpf;
use aya_log::EbpfLogger;
use clap::Parser;
use log::{info, warn};

use xdp_lb_common::{Backend, MAX_BACKENDS, RING_SIZE};

#[derive(Debug, Parser)]
struct Opt {
    /// Interface to attach to.
    #[clap(short, long, default_value = "eth0")]
    iface: String,

    /// Virtual-service port to load balance.
    #[clap(short, long)]
    port: u16,

    /// Backend address; repeat for multiple backends (max 16).
    #[clap(short, long = "backend", required = true)]
    backends: Vec<Ipv4Addr>,

    /// Compiled eBPF object to load.
    #[clap(long, default_value = "target/bpfel-unknown-none/release/xdp-lb-ebpf")]
    program: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();

    env_logger::init();

    anyhow::ensure!(
        opt.backends.len() <= MAX_BACKENDS as usize,
        "at most {} backends supported",
        MAX_BACKENDS
    );

    let mut bpf = Ebpf::load_file(&opt.program)
        .with_context(|| format!("loading eBPF object from {}", opt.program))?;
    if let Err(e) = EbpfLogger::init(&mut bpf) {
        // This can happen if you remove all log statements from the eBPF program.
        warn!("failed to initialize eBPF logger: {}", e);
    }

    let program: &mut Xdp = bpf
        .program_mut("xdp_lb")
        .context("xdp_lb program not found")?
        .try_into()?;
    program.load()?;
    program
        .attach(&opt.iface, XdpFlags::default())
        .with_context(|| format!("attaching to {}", opt.iface))?;
    info!("xdp_lb attached to {} for port {}", opt.iface, opt.port);

    seed_maps(&mut bpf, &opt)?;

    let counts: Array<_, u64> = Array::try_from(bpf.map("CONN_COUNT").context("CONN_COUNT map not found")?)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(3));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (i, addr) in opt.backends.iter().enumerate() {
                    let count = counts.get(&(i as u32), 0).unwrap_or(0);
                    info!("backend[{}] {}: {} forwarded", i, addr, count);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("exiting");
                return Ok(());
            }
        }
    }
}

/// Seed the target port, pool, and ring. Ring slots are striped
/// round-robin across the backends; a flow's slot is fixed, so adding or
/// removing a backend remaps flows arbitrarily.
fn seed_maps(bpf: &mut Ebpf, opt: &Opt) -> Result<(), anyhow::Error> {
    let mut port: Array<_, u32> = Array::try_from(bpf.map_mut("LB_PORT").context("LB_PORT map not found")?)?;
    port.set(0, opt.port as u32, 0)?;

    let mut backends: Array<_, Backend> =
        Array::try_from(bpf.map_mut("BACKENDS").context("BACKENDS map not found")?)?;
    for (i, addr) in opt.backends.iter().enumerate() {
        let backend = Backend {
            ip: u32::from(*addr),
            port: opt.port,
            active: 1,
        };
        backends.set(i as u32, backend, 0)?;
        info!("backend[{}] = {}", i, addr);
    }

    let mut ring: Array<_, u32> = Array::try_from(bpf.map_mut("HASH_RING").context("HASH_RING map not found")?)?;
    for slot in 0..RING_SIZE {
        ring.set(slot, slot % opt.backends.len() as u32, 0)?;
    }
    info!("ring built over {} backends", opt.backends.len());

    Ok(())
}
