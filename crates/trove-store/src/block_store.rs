extern crate alloc;
use alloc::boxed::Box;
use log::{debug, error, warn};

use trove_core::{BlockFooter, Geometry, TroveError, TroveResult};
use trove_hal::{BlockDevice, PlatformClock, StoreEvent, StoreHandle};
use trove_mem::Page;

/// Outcome of draining the device's completion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
}

/// Result of the boot-time footer scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanReport {
    pub next_block: usize,
    /// Erased blocks below `next_block`.
    pub holes: usize,
    pub unreadable: usize,
}

/// Logical block index -> device block handle.
pub struct BlockStore {
    device: Box<dyn BlockDevice>,
    handle: StoreHandle,
    geometry: Geometry,
}

impl BlockStore {
    /// Register `geometry.block_count()` blocks with the device. Once, at startup.
    pub fn register(mut device: Box<dyn BlockDevice>, geometry: Geometry) -> TroveResult<Self> {
        let handle = device.register(geometry.block_size(), geometry.block_count())?;
        debug!(
            "store registered: module {} ({} x {} bytes)",
            handle.module_id, geometry.block_count(), geometry.block_size()
        );
        Ok(Self { device, handle, geometry })
    }

    pub fn geometry(&self) -> &Geometry { &self.geometry }

    pub fn handle(&self) -> &StoreHandle { &self.handle }

    /// Issue an asynchronous write of the whole page.
    pub fn write(&mut self, index: usize, page: &Page) -> TroveResult<()> {
        let block = self.device.block_handle(&self.handle, index)?;
        self.device.write_block(&block, page.as_bytes())
    }

    /// Load block `index` into `page` and decode its footer.
    pub fn read(&mut self, index: usize, page: &mut Page) -> TroveResult<BlockFooter> {
        let block = self.device.block_handle(&self.handle, index)?;
        self.device.read_block(&block, page.as_bytes_mut())?;
        page.footer()
    }

    pub fn erase_all(&mut self) -> TroveResult<()> {
        self.device.erase_all(&self.handle)
    }

    pub fn pending_count(&self) -> usize {
        self.device.pending_count()
    }

    pub fn poll_completion(&mut self) -> nb::Result<StoreEvent, TroveError> {
        self.device.poll_completion()
    }

    /// Scan every footer. Returns one past the highest block in use (or
    /// `block_count` when the last block is used) and the number of erased
    /// holes below it. A hole is a record whose write failed; an unreadable
    /// block counts as used so it is never programmed again.
    pub fn resume_point(&mut self, scratch: &mut Page) -> ScanReport {
        let mut report = ScanReport::default();
        let mut erased_run = 0;

        for index in 0..self.geometry.block_count() {
            let used = match self.read(index, scratch) {
                Ok(footer) => {
                    if footer.used && !footer.is_valid(&self.geometry) {
                        warn!("block {} is marked used with count {}", index, footer.count);
                    }
                    footer.used
                }
                Err(e) => {
                    error!("block {} unreadable at boot ({}); treated as used", index, e);
                    report.unreadable += 1;
                    true
                }
            };

            if used {
                if erased_run > 0 {
                    warn!("blocks {}..{} erased below used block {}; records lost", index - erased_run, index, index);
                    report.holes += erased_run;
                    erased_run = 0;
                }
                report.next_block = index + 1;
            } else {
                erased_run += 1;
            }
        }
        report
    }

    /// Drive the completion queue until nothing is pending.
    ///
    /// Every completion goes through the persistence error policy: a failed
    /// operation is logged and counted, never retried. Gives up with
    /// `Timeout` once `timeout_us` has elapsed on `clock`.
    pub fn drain(&mut self, clock: &dyn PlatformClock, timeout_us: u64) -> TroveResult<DrainReport> {
        let deadline = clock.now_us().saturating_add(timeout_us);
        let mut report = DrainReport::default();

        while self.device.pending_count() > 0 {
            match self.device.poll_completion() {
                Ok(event) => {
                    report.completed += 1;
                    debug!("store completion: {:?}", event);
                }
                Err(nb::Error::Other(e)) => {
                    report.completed += 1;
                    report.failed += 1;
                    error!("flash operation failed ({}); record lost", e);
                }
                Err(nb::Error::WouldBlock) => {
                    if clock.now_us() >= deadline {
                        warn!("{} flash operations still pending after {} us", self.device.pending_count(), timeout_us);
                        return Err(TroveError::Timeout);
                    }
                    core::hint::spin_loop();
                }
            }
        }
        Ok(report)
    }
}
