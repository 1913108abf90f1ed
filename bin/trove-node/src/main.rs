use clap::Parser;
use colored::Colorize;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;

use trove_core::{Geometry, DEFAULT_BLOCK_COUNT, DEFAULT_SAMPLES_PER_BLOCK};
use trove_kernel::{KernelConfig, RecorderKernel};
use trove_linux::{wait_readable, FileFlash, HostClock, IntervalTimer, SimulatedSensor, UdpLink};

#[derive(Parser)]
struct Cli {
    /// Flash image backing the log.
    #[arg(long, default_value = "trove.img")] image: PathBuf,
    #[arg(long, default_value_t = DEFAULT_SAMPLES_PER_BLOCK)] samples_per_block: usize,
    #[arg(long, default_value_t = DEFAULT_BLOCK_COUNT)] blocks: usize,
    /// Scheduler period; one sample every two ticks.
    #[arg(long, default_value_t = 1000)] tick_ms: u64,
    #[arg(long, default_value = "127.0.0.1:7700")] bind: String,
    /// Hub address. Learned from the first datagram when omitted.
    #[arg(long)] peer: Option<String>,
    #[arg(long, default_value_t = 20)] chunk: usize,
    #[arg(long, default_value_t = 4)] in_flight: usize,
    #[arg(long, default_value_t = 2000)] ack_timeout_ms: u64,
    #[arg(long, default_value_t = 20)] start_temp: i8,
    /// Wipe the image before recovery.
    #[arg(long)] erase: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!("trove node: image {}", cli.image.display());

    let geometry = Geometry::new(cli.samples_per_block, cli.blocks)?;
    let link = UdpLink::new(
        &cli.bind,
        cli.peer.as_deref(),
        cli.chunk,
        cli.in_flight,
        Duration::from_millis(cli.ack_timeout_ms),
    )?;
    let link_fd = link.fd();

    let config = KernelConfig {
        geometry,
        sample_interval_us: cli.tick_ms * 1_000,
        chunk_size: cli.chunk,
        erase_on_boot: cli.erase,
        ..KernelConfig::default()
    };

    let mut kernel = RecorderKernel::boot(
        Box::new(FileFlash::new(&cli.image)),
        Box::new(link),
        Box::new(SimulatedSensor::new(cli.start_temp)),
        Box::new(IntervalTimer::new()),
        Box::new(HostClock::new()),
        config,
    )?;

    let report = kernel.recovery();
    println!(
        "{} {} of {} blocks in use{}",
        "RECOVERED".green().bold(),
        report.next_block,
        geometry.block_count(),
        if report.full { " (FULL)".red().to_string() } else { String::new() }
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        if !kernel.poll() {
            wait_readable(link_fd, 5);
        }
    }

    match kernel.shutdown() {
        Ok(report) => info!("shutdown clean ({} writes settled, {} failed)", report.completed, report.failed),
        Err(e) => error!("shutdown: store did not settle ({})", e),
    }
    let occupancy = kernel.writer().occupancy();
    println!(
        "{} {} / {} blocks committed",
        "STOPPED".yellow().bold(),
        occupancy.committed_blocks,
        geometry.block_count()
    );
    Ok(())
}
