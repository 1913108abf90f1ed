use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use trove_core::{Sample, TroveError, TroveResult};
use trove_flow::CreditWindow;
use trove_hal::{LinkEvent, LinkInterface, LinkProperties, PlatformClock, Scheduler, Sensor};

pub use trove_store::fs_backend::FileFlash;

/// Hub -> node: one chunk left the node's window.
pub const ACK_BYTE: u8 = 0x06;
/// Hub -> node: operator hung up.
pub const DISCONNECT_BYTE: u8 = b'D';

/// Block until `fd` is readable or `timeout_ms` passes.
pub fn wait_readable(fd: RawFd, timeout_ms: i32) -> bool {
    let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
    let res = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    res > 0 && (pfd.revents & libc::POLLIN) != 0
}

/// Non-blocking UDP socket with the buffer sizes both ends use.
pub fn bind_udp(bind_addr: &str) -> anyhow::Result<UdpSocket> {
    let addr: SocketAddr = bind_addr.parse()?;
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    let buf_size = 256 * 1024;
    let _ = socket.set_recv_buffer_size(buf_size);
    let _ = socket.set_send_buffer_size(buf_size);
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(addr))?;
    Ok(socket.into())
}

/// Operator link over UDP.
///
/// Each chunk is one datagram. The hub answers every chunk with `ACK_BYTE`;
/// any other byte is a command. The peer is either given up front or learned
/// from the first datagram received.
pub struct UdpLink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    connected: bool,
    credits: CreditWindow,
    chunk_size: usize,
    ack_timeout: Duration,
    last_progress: Instant,
}

impl UdpLink {
    pub fn new(
        bind_addr: &str,
        peer: Option<&str>,
        chunk_size: usize,
        max_in_flight: usize,
        ack_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let socket = bind_udp(bind_addr)?;
        let peer = match peer {
            Some(p) => Some(p.parse()?),
            None => None,
        };
        info!("link: bound {} (peer {:?})", socket.local_addr()?, peer);

        Ok(Self {
            socket,
            connected: peer.is_some(),
            peer,
            credits: CreditWindow::new(max_in_flight),
            chunk_size,
            ack_timeout,
            last_progress: Instant::now(),
        })
    }

    pub fn fd(&self) -> RawFd { self.socket.as_raw_fd() }

    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.socket.local_addr() }

    pub fn peer(&self) -> Option<SocketAddr> { self.peer }

    fn drop_link(&mut self) {
        self.connected = false;
        self.credits.reset();
    }
}

impl LinkInterface for UdpLink {
    fn properties(&self) -> LinkProperties {
        LinkProperties { chunk_size: self.chunk_size, max_in_flight: self.credits.max() }
    }

    fn is_connected(&self) -> bool { self.connected && self.peer.is_some() }

    fn available_slots(&self) -> usize {
        if !self.is_connected() { return 0; }
        self.credits.available()
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> nb::Result<usize, TroveError> {
        if chunk.len() > self.chunk_size { return Err(nb::Error::Other(TroveError::OutOfRange)); }
        let peer = match self.peer {
            Some(p) if self.connected => p,
            _ => return Err(nb::Error::Other(TroveError::LinkDown)),
        };

        if self.credits.in_flight() == 0 { self.last_progress = Instant::now(); }
        if !self.credits.consume() { return Err(nb::Error::WouldBlock); }

        match self.socket.send_to(chunk, peer) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.credits.on_delivered();
                Err(nb::Error::WouldBlock)
            }
            Err(e) => {
                self.credits.on_delivered();
                warn!("link: send to {} failed ({})", peer, e);
                Err(nb::Error::Other(TroveError::HalError))
            }
        }
    }

    fn poll_event(&mut self) -> nb::Result<LinkEvent, TroveError> {
        if self.connected && self.credits.in_flight() > 0 && self.last_progress.elapsed() > self.ack_timeout {
            warn!("link: no ack for {:?} with {} chunks out", self.ack_timeout, self.credits.in_flight());
            self.drop_link();
            return Ok(LinkEvent::Lost);
        }

        let mut buf = [0u8; 64];
        let (n, src) = match self.socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Err(nb::Error::WouldBlock),
            Err(_) => return Err(nb::Error::Other(TroveError::HalError)),
        };
        if n == 0 { return Err(nb::Error::WouldBlock); }

        if self.peer != Some(src) {
            info!("link: peer {}", src);
            self.peer = Some(src);
            self.credits.reset();
        }

        match buf[0] {
            DISCONNECT_BYTE => {
                info!("link: peer {} disconnected", src);
                self.drop_link();
                Ok(LinkEvent::Lost)
            }
            ACK_BYTE => {
                self.connected = true;
                self.credits.on_delivered();
                self.last_progress = Instant::now();
                Ok(LinkEvent::ChunkDelivered)
            }
            byte => {
                self.connected = true;
                debug!("link: command {:?}", byte as char);
                Ok(LinkEvent::Command(byte))
            }
        }
    }
}

pub struct HostClock(Instant);
impl HostClock { pub fn new() -> Self { Self(Instant::now()) } }
impl Default for HostClock { fn default() -> Self { Self::new() } }
impl PlatformClock for HostClock {
    fn now_us(&self) -> u64 { self.0.elapsed().as_micros() as u64 }
}

/// Polled periodic timer. A late poll fires once, then the schedule
/// restarts from that poll; missed periods are not replayed.
#[derive(Debug, Default)]
pub struct IntervalTimer {
    interval_us: u64,
    next_due: Option<u64>,
    armed: bool,
}

impl IntervalTimer {
    pub fn new() -> Self { Self::default() }
}

impl Scheduler for IntervalTimer {
    fn every(&mut self, interval_us: u64) {
        self.interval_us = interval_us.max(1);
        self.next_due = None;
        self.armed = true;
    }

    fn cancel(&mut self) {
        self.armed = false;
        self.next_due = None;
    }

    fn is_armed(&self) -> bool { self.armed }

    fn due(&mut self, now_us: u64) -> bool {
        if !self.armed { return false; }
        match self.next_due {
            None => {
                self.next_due = Some(now_us + self.interval_us);
                false
            }
            Some(t) if now_us >= t => {
                let next = t + self.interval_us;
                self.next_due = Some(if next <= now_us { now_us + self.interval_us } else { next });
                true
            }
            Some(_) => false,
        }
    }
}

/// One-shot thermometer stand-in: a bounded random walk in whole degrees.
pub struct SimulatedSensor {
    rng: StdRng,
    current: i16,
    range: (i16, i16),
    pending: Option<Sample>,
}

impl SimulatedSensor {
    pub fn new(start: Sample) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            current: start as i16,
            range: (Sample::MIN as i16, Sample::MAX as i16),
            pending: None,
        }
    }

    /// Deterministic walk for tests.
    pub fn seeded(start: Sample, seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), ..Self::new(start) }
    }
}

impl Sensor for SimulatedSensor {
    fn start_acquisition(&mut self) -> TroveResult<()> {
        let step: i16 = self.rng.gen_range(-1..=1);
        self.current = (self.current + step).clamp(self.range.0, self.range.1);
        self.pending = Some(self.current as Sample);
        Ok(())
    }

    fn read_result(&mut self) -> TroveResult<Sample> {
        self.pending.take().ok_or(TroveError::InvalidState)
    }
}
