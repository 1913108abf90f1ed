use log::{info, warn};

use trove_core::TroveResult;
use trove_hal::PlatformClock;
use trove_mem::Page;

use crate::block_store::BlockStore;
use crate::ring::RingWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Where the next flush will land.
    pub next_block: usize,
    /// Every footer read as used. Not an error.
    pub full: bool,
    pub erased: bool,
    /// Erased blocks left behind by failed writes. Skipped when streaming.
    pub holes: usize,
}

/// Rebuilds the write cursor from the footers on the medium. No index is
/// kept anywhere else.
pub struct PowerRecovery;

impl PowerRecovery {
    pub fn restore(mut store: BlockStore) -> TroveResult<(RingWriter, RecoveryReport)> {
        let mut scratch = Page::new(*store.geometry());
        let scan = store.resume_point(&mut scratch);
        let next_block = scan.next_block;
        let full = next_block == store.geometry().block_count();

        info!(
            "recovery: {} of {} blocks in use{}",
            next_block,
            store.geometry().block_count(),
            if full { " (log full)" } else { "" }
        );
        if scan.holes > 0 || scan.unreadable > 0 {
            warn!("recovery: {} lost records, {} unreadable blocks", scan.holes, scan.unreadable);
        }

        let report = RecoveryReport { next_block, full, erased: false, holes: scan.holes };
        Ok((RingWriter::new(store, next_block), report))
    }

    /// Erase everything, wait for the medium, then restore (which now finds
    /// block 0).
    pub fn erase_and_restore(
        mut store: BlockStore,
        clock: &dyn PlatformClock,
        timeout_us: u64,
    ) -> TroveResult<(RingWriter, RecoveryReport)> {
        info!("recovery: erasing store before boot");
        store.erase_all()?;
        store.drain(clock, timeout_us)?;
        let (writer, mut report) = Self::restore(store)?;
        report.erased = true;
        Ok((writer, report))
    }
}
