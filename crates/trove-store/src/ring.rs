use log::{debug, error, info};

use trove_core::{Geometry, Sample, TroveResult};
use trove_mem::{Page, PagePair};

use crate::block_store::BlockStore;

/// Position of the next sample: slot inside the active page, and the block
/// the active page will be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCursor {
    pub fill: usize,
    pub block: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing staged; no write issued.
    Empty,
    Issued { block: usize, count: usize },
    /// The device refused the write. The block is skipped.
    Failed { block: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Buffered,
    /// The sample filled the page and triggered a flush.
    Committed(FlushOutcome),
    /// Log full; the sample was discarded.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub committed_blocks: usize,
    pub free_blocks: usize,
    pub buffered_samples: usize,
    pub capacity_samples: usize,
}

/// Bounded, non-overwriting log of samples over a `BlockStore`.
pub struct RingWriter {
    store: BlockStore,
    pages: PagePair,
    next_block: usize,
    generation: u32,
}

impl RingWriter {
    /// Resume writing at `next_block` (see `PowerRecovery`).
    pub fn new(store: BlockStore, next_block: usize) -> Self {
        let geometry = *store.geometry();
        Self {
            store,
            pages: PagePair::new(geometry),
            next_block: core::cmp::min(next_block, geometry.block_count()),
            generation: 0,
        }
    }

    pub fn geometry(&self) -> &Geometry { self.store.geometry() }

    pub fn append(&mut self, sample: Sample) -> AppendOutcome {
        if self.is_full() { return AppendOutcome::Dropped; }

        self.pages.active_mut().push(sample);
        if self.pages.active().is_full() {
            return AppendOutcome::Committed(self.flush());
        }
        AppendOutcome::Buffered
    }

    /// Seal the active page and hand it to the store. Does not wait for the
    /// write to complete.
    pub fn flush(&mut self) -> FlushOutcome {
        if self.pages.active().is_empty() || self.is_full() {
            return FlushOutcome::Empty;
        }

        let block = self.next_block;
        let count = self.pages.active().fill();
        let outcome = match self.pages.active_mut().seal() {
            Ok(_) => match self.store.write(block, self.pages.active()) {
                Ok(()) => {
                    debug!("flush: block {} <- {} samples", block, count);
                    FlushOutcome::Issued { block, count }
                }
                Err(e) => {
                    error!("flush: write of block {} failed ({}); {} samples lost", block, e, count);
                    FlushOutcome::Failed { block }
                }
            },
            Err(e) => {
                error!("flush: cannot seal page for block {} ({})", block, e);
                FlushOutcome::Failed { block }
            }
        };

        // The cursor moves on even after a failure so a bad block is never retried.
        self.next_block += 1;
        self.pages.swap();
        self.generation = self.generation.wrapping_add(1);

        if self.is_full() {
            info!("log full after block {}", block);
        }
        outcome
    }

    pub fn is_full(&self) -> bool {
        self.next_block >= self.geometry().block_count()
    }

    /// Erase the whole store and start over at block 0. Unflushed samples are
    /// abandoned.
    pub fn clear_all(&mut self) -> TroveResult<()> {
        self.store.erase_all()?;
        self.pages.reset_all();
        self.next_block = 0;
        self.generation = self.generation.wrapping_add(1);
        info!("log cleared");
        Ok(())
    }

    pub fn cursor(&self) -> WriteCursor {
        WriteCursor { fill: self.pages.active().fill(), block: self.next_block }
    }

    /// Blocks handed to the store so far. Readers stop here.
    pub fn committed_blocks(&self) -> usize { self.next_block }

    pub fn occupancy(&self) -> Occupancy {
        let g = self.geometry();
        Occupancy {
            committed_blocks: self.next_block,
            free_blocks: g.block_count() - self.next_block,
            buffered_samples: self.pages.active().fill(),
            capacity_samples: g.capacity(),
        }
    }

    /// Bumped whenever the pages are swapped or cleared.
    pub fn generation(&self) -> u32 { self.generation }

    pub fn store(&self) -> &BlockStore { &self.store }

    pub fn store_mut(&mut self) -> &mut BlockStore { &mut self.store }

    /// The store plus the idle page, lent out as read scratch.
    pub fn read_parts(&mut self) -> (&mut BlockStore, &mut Page) {
        (&mut self.store, self.pages.idle_mut())
    }
}
