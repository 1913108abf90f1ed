#![no_std]
extern crate alloc;
use alloc::boxed::Box;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, error, info, warn};

use trove_core::{
    Command, Geometry, Mode, Sample, TroveError, TroveResult, DEFAULT_CHUNK_SIZE,
    DEFAULT_COMPLETION_TIMEOUT_US, DEFAULT_TICK_US, END_MARKER, LIVE_PREFIX, START_MARKER,
};
use trove_hal::{BlockDevice, LinkEvent, LinkInterface, PlatformClock, Scheduler, Sensor};
use trove_store::{AppendOutcome, BlockStore, DrainReport, PowerRecovery, RecoveryReport, RingWriter};

pub mod mode;
pub mod state;
use mode::Transition;
use state::LogState;

#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub geometry: Geometry,
    /// Scheduler period. One sample takes two ticks.
    pub sample_interval_us: u64,
    pub chunk_size: usize,
    /// Bound on every wait for the store to go idle.
    pub completion_timeout_us: u64,
    /// Erase the whole store before recovery.
    pub erase_on_boot: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            sample_interval_us: DEFAULT_TICK_US,
            chunk_size: DEFAULT_CHUNK_SIZE,
            completion_timeout_us: DEFAULT_COMPLETION_TIMEOUT_US,
            erase_on_boot: false,
        }
    }
}

/// Where a transfer session is in its framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Start,
    Body,
    End,
    Done,
}

pub struct RecorderKernel {
    link: Box<dyn LinkInterface>,
    sensor: Box<dyn Sensor>,
    scheduler: Box<dyn Scheduler>,
    clock: Box<dyn PlatformClock>,

    config: KernelConfig,
    chunk_size: usize,
    log: LogState,
    recovery: RecoveryReport,

    converting: bool,
    phase: TransferPhase,
    // A chunk the link refused; offered again before anything else.
    staged: Option<Vec<u8>>,
    warned_full: bool,
}

impl RecorderKernel {
    /// Register the store, restore the write cursor and start sampling.
    pub fn boot(
        device: Box<dyn BlockDevice>,
        link: Box<dyn LinkInterface>,
        sensor: Box<dyn Sensor>,
        mut scheduler: Box<dyn Scheduler>,
        clock: Box<dyn PlatformClock>,
        config: KernelConfig,
    ) -> TroveResult<Self> {
        let chunk_size = core::cmp::min(config.chunk_size, link.properties().chunk_size);
        if chunk_size < START_MARKER.len() {
            error!("chunk size {} cannot carry the transfer markers", chunk_size);
            return Err(TroveError::InvalidState);
        }

        let store = BlockStore::register(device, config.geometry)?;
        let (writer, recovery) = if config.erase_on_boot {
            PowerRecovery::erase_and_restore(store, &*clock, config.completion_timeout_us)?
        } else {
            PowerRecovery::restore(store)?
        };

        scheduler.every(config.sample_interval_us);
        info!(
            "recorder up: {} x {} samples, resuming at block {}, tick {} us",
            config.geometry.block_count(),
            config.geometry.samples_per_block(),
            recovery.next_block,
            config.sample_interval_us
        );

        Ok(Self {
            link, sensor, scheduler, clock, config, chunk_size,
            log: LogState::new(writer),
            recovery,
            converting: false,
            phase: TransferPhase::Idle,
            staged: None,
            warned_full: recovery.full,
        })
    }

    pub fn mode(&self) -> Mode { self.log.mode() }

    pub fn recovery(&self) -> &RecoveryReport { &self.recovery }

    pub fn writer(&self) -> &RingWriter { &self.log.writer }

    pub fn state(&self) -> &LogState { &self.log }

    pub fn transfer_phase(&self) -> TransferPhase { self.phase }

    pub fn is_full(&self) -> bool { self.log.writer.is_full() }

    /// One scheduler period. Alternates between starting a conversion and
    /// collecting its result.
    pub fn on_tick(&mut self) {
        if !self.converting {
            match self.sensor.start_acquisition() {
                Ok(()) => self.converting = true,
                Err(e) => warn!("sensor: cannot start conversion ({})", e),
            }
            return;
        }

        self.converting = false;
        match self.sensor.read_result() {
            Ok(sample) => self.record(sample),
            Err(e) => warn!("sensor: read failed ({}); sample skipped", e),
        }
    }

    fn record(&mut self, sample: Sample) {
        match self.log.writer.append(sample) {
            AppendOutcome::Dropped => {
                if !self.warned_full {
                    warn!("log full; further samples are discarded");
                    self.warned_full = true;
                }
            }
            AppendOutcome::Committed(outcome) => debug!("page committed: {:?}", outcome),
            AppendOutcome::Buffered => {}
        }

        if self.mode() == Mode::LiveReport {
            self.report_live(sample);
        }
    }

    // Best effort: a live value the link cannot take right now is not queued.
    fn report_live(&mut self, sample: Sample) {
        let mut msg = Vec::with_capacity(self.chunk_size);
        msg.extend_from_slice(LIVE_PREFIX);
        msg.extend_from_slice(format!("{}", sample).as_bytes());
        match self.link.send_chunk(&msg) {
            Ok(_) => {}
            Err(nb::Error::WouldBlock) => debug!("live report {} dropped: link busy", sample),
            Err(nb::Error::Other(e)) => warn!("live report failed ({})", e),
        }
    }

    /// Apply a mode request. Inadmissible requests return `Ok(false)`.
    pub fn on_mode_request(&mut self, to: Mode) -> TroveResult<bool> {
        let Some(transition) = self.log.mode.request(to) else { return Ok(false) };

        if transition.enters_transfer() {
            self.enter_transfer(transition)?;
            return Ok(true);
        }

        self.log.mode.commit(transition);
        if transition.leaves_transfer() {
            self.phase = TransferPhase::Idle;
            self.staged = None;
            self.converting = false;
            self.scheduler.every(self.config.sample_interval_us);
        }
        Ok(true)
    }

    fn enter_transfer(&mut self, transition: Transition) -> TroveResult<()> {
        self.scheduler.cancel();
        self.converting = false;

        let flushed = self.log.writer.flush();
        debug!("transfer: pre-session flush {:?}", flushed);
        if let Err(e) = self.wait_for_completion() {
            error!("transfer aborted: store did not settle ({})", e);
            self.scheduler.every(self.config.sample_interval_us);
            return Err(e);
        }

        self.log.streamer.begin_session();
        self.phase = TransferPhase::Start;
        self.staged = None;
        self.log.mode.commit(transition);
        self.pump()
    }

    /// The link freed a buffer.
    pub fn on_chunk_delivered(&mut self) -> TroveResult<()> {
        if self.mode() != Mode::Transfer { return Ok(()); }
        self.pump()
    }

    pub fn on_link_lost(&mut self) {
        match self.mode() {
            Mode::Recording => {}
            Mode::LiveReport | Mode::Transfer => {
                warn!("link lost in {:?}; back to recording", self.mode());
                if let Err(e) = self.on_mode_request(Mode::Recording) {
                    error!("cannot resume recording ({})", e);
                }
            }
        }
    }

    /// Dispatch a single-byte operator command.
    pub fn on_command(&mut self, byte: u8) -> TroveResult<()> {
        let Some(cmd) = Command::from_byte(byte) else {
            debug!("unknown command 0x{:02x} ignored", byte);
            return Ok(());
        };

        match cmd.target_mode() {
            Some(to) => self.on_mode_request(to).map(|_| ()),
            None if self.mode() == Mode::Recording => {
                self.log.writer.clear_all()?;
                self.wait_for_completion()?;
                self.warned_full = false;
                Ok(())
            }
            None => {
                debug!("erase ignored in {:?}", self.mode());
                Ok(())
            }
        }
    }

    /// Drive the store until nothing is pending, bounded by the configured
    /// timeout. Failed completions are logged and counted, not propagated.
    pub fn wait_for_completion(&mut self) -> TroveResult<DrainReport> {
        self.log.writer.store_mut().drain(&*self.clock, self.config.completion_timeout_us)
    }

    /// Offer chunks while the link has free buffers.
    fn pump(&mut self) -> TroveResult<()> {
        while self.link.available_slots() > 0 {
            if self.staged.is_none() {
                self.staged = self.next_chunk()?;
            }
            let Some(chunk) = self.staged.as_deref() else { break };

            match self.link.send_chunk(chunk) {
                Ok(_) => self.staged = None,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    error!("transfer: send failed ({})", e);
                    self.on_link_lost();
                    return Ok(());
                }
            }
        }

        if self.phase == TransferPhase::Done && self.staged.is_none() {
            info!(
                "transfer: {} bytes sent, {} blocks skipped",
                self.log.streamer.bytes_delivered(),
                self.log.streamer.blocks_skipped()
            );
            self.on_mode_request(Mode::Recording)?;
        }
        Ok(())
    }

    fn next_chunk(&mut self) -> TroveResult<Option<Vec<u8>>> {
        loop {
            match self.phase {
                TransferPhase::Start => {
                    self.phase = TransferPhase::Body;
                    return Ok(Some(START_MARKER.to_vec()));
                }
                TransferPhase::Body => {
                    let mut buf = vec![0u8; self.chunk_size];
                    let n = self.log.streamer.fill(&mut self.log.writer, &mut buf)?;
                    if n == 0 {
                        self.phase = TransferPhase::End;
                        continue;
                    }
                    buf.truncate(n);
                    return Ok(Some(buf));
                }
                TransferPhase::End => {
                    self.phase = TransferPhase::Done;
                    return Ok(Some(END_MARKER.to_vec()));
                }
                TransferPhase::Idle | TransferPhase::Done => return Ok(None),
            }
        }
    }

    /// One pass over every event source. Returns true if anything happened.
    pub fn poll(&mut self) -> bool {
        let mut work_done = false;

        // Store completions
        loop {
            match self.log.writer.store_mut().poll_completion() {
                Ok(event) => debug!("store: {:?}", event),
                Err(nb::Error::Other(e)) => error!("flash operation failed ({}); record lost", e),
                Err(nb::Error::WouldBlock) => break,
            }
            work_done = true;
        }

        // Link
        loop {
            let result = match self.link.poll_event() {
                Ok(LinkEvent::Command(byte)) => self.on_command(byte),
                Ok(LinkEvent::ChunkDelivered) => self.on_chunk_delivered(),
                Ok(LinkEvent::Lost) => {
                    self.on_link_lost();
                    Ok(())
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    warn!("link: {}", e);
                    break;
                }
            };
            if let Err(e) = result { error!("link event not handled ({})", e); }
            work_done = true;
        }

        // Sampling
        if self.scheduler.due(self.clock.now_us()) {
            self.on_tick();
            work_done = true;
        }

        work_done
    }

    /// Flush the active page and wait for it to land. Call before power-off.
    pub fn shutdown(&mut self) -> TroveResult<DrainReport> {
        self.scheduler.cancel();
        let flushed = self.log.writer.flush();
        info!("shutdown: final flush {:?}", flushed);
        self.wait_for_completion()
    }
}
