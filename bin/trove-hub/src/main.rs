use clap::{Parser, ValueEnum};
use colored::Colorize;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::{Duration, Instant};

use trove_core::{sample_from_byte, Command, END_MARKER, LIVE_PREFIX, START_MARKER};
use trove_linux::{bind_udp, wait_readable, ACK_BYTE, DISCONNECT_BYTE};

#[derive(Clone, Copy, ValueEnum)]
enum Action {
    /// Stream every new sample
    Live,
    /// Download the whole log
    Transfer,
    /// Back to plain recording
    Record,
    /// Wipe the log
    Erase,
}

impl Action {
    fn command(self) -> Command {
        match self {
            Action::Live => Command::Live,
            Action::Transfer => Command::Transfer,
            Action::Record => Command::Record,
            Action::Erase => Command::Erase,
        }
    }
}

#[derive(Parser)]
struct Cli {
    #[arg(value_enum)] action: Action,
    #[arg(long, default_value = "127.0.0.1:7700")] node: String,
    #[arg(long, default_value = "127.0.0.1:0")] bind: String,
    /// Where a transfer is written.
    #[arg(long, default_value = "transfer.bin")] out: PathBuf,
    /// Give up on a transfer after this much silence.
    #[arg(long, default_value_t = 5000)] idle_ms: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let node: SocketAddr = cli.node.parse()?;
    let socket = bind_udp(&cli.bind)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let cmd = cli.action.command();
    socket.send_to(&[cmd.as_byte()], node)?;
    info!("sent {:?} to {}", cmd, node);

    if matches!(cli.action, Action::Record | Action::Erase) {
        return Ok(());
    }

    let mut buf = [0u8; 512];
    let mut collected: Vec<u8> = Vec::new();
    let mut in_transfer = false;
    let mut last_rx = Instant::now();
    let idle = Duration::from_millis(cli.idle_ms);

    while running.load(Ordering::SeqCst) {
        if !wait_readable(socket.as_raw_fd(), 100) {
            if matches!(cli.action, Action::Transfer) && last_rx.elapsed() > idle {
                anyhow::bail!("transfer stalled after {} bytes", collected.len());
            }
            continue;
        }

        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        };
        if src != node { debug!("ignoring datagram from {}", src); continue; }
        last_rx = Instant::now();

        // Every chunk frees a slot on the node
        socket.send_to(&[ACK_BYTE], node)?;
        let chunk = &buf[..n];

        if let Some(value) = chunk.strip_prefix(LIVE_PREFIX) {
            println!("{} {}", "DATA".cyan().bold(), String::from_utf8_lossy(value));
            continue;
        }
        if chunk == START_MARKER {
            println!("{}", "TRANSFER START".green().bold());
            in_transfer = true;
            collected.clear();
            continue;
        }
        if chunk == END_MARKER && in_transfer {
            std::fs::write(&cli.out, &collected)?;
            let samples: Vec<i8> = collected.iter().map(|&b| sample_from_byte(b)).collect();
            let (lo, hi) = samples.iter().fold((i8::MAX, i8::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
            println!(
                "{} {} samples -> {}{}",
                "TRANSFER END".green().bold(),
                samples.len(),
                cli.out.display(),
                if samples.is_empty() { String::new() } else { format!(" (min {}, max {})", lo, hi) }
            );
            return Ok(());
        }
        if in_transfer {
            collected.extend_from_slice(chunk);
        } else {
            debug!("unexpected {} byte chunk", n);
        }
    }

    // Operator quit: the node falls back to recording
    socket.send_to(&[DISCONNECT_BYTE], node)?;
    Ok(())
}
