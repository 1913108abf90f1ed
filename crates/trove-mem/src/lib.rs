#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;
use trove_core::{sample_to_byte, BlockFooter, Geometry, Sample, TroveResult, ERASED_BYTE, SENTINEL};

/// RAM mirror of one block: data region, padding, footer.
pub struct Page {
    data: Vec<u8>,
    fill: usize,
    geometry: Geometry,
}

impl Page {
    pub fn new(geometry: Geometry) -> Self {
        let mut page = Self {
            data: vec![ERASED_BYTE; geometry.block_size()],
            fill: 0,
            geometry,
        };
        page.reset();
        page
    }

    pub fn geometry(&self) -> &Geometry { &self.geometry }

    /// Samples staged so far.
    pub fn fill(&self) -> usize { self.fill }

    pub fn is_empty(&self) -> bool { self.fill == 0 }

    pub fn is_full(&self) -> bool {
        self.fill >= self.geometry.samples_per_block()
    }

    /// Stage one sample. Returns false if the data region is full.
    pub fn push(&mut self, sample: Sample) -> bool {
        if self.is_full() { return false; }
        self.data[self.fill] = sample_to_byte(sample);
        self.fill += 1;
        true
    }

    pub fn staged(&self) -> &[u8] {
        &self.data[..self.fill]
    }

    /// Stamp the footer with the current fill. The page is ready to be written.
    pub fn seal(&mut self) -> TroveResult<BlockFooter> {
        let footer = BlockFooter::used(self.fill as u8);
        let off = self.geometry.footer_offset();
        footer.to_bytes(&mut self.data[off..])?;
        Ok(footer)
    }

    pub fn footer(&self) -> TroveResult<BlockFooter> {
        BlockFooter::from_bytes(&self.data[self.geometry.footer_offset()..])
    }

    /// Valid sample bytes of a block loaded into this page.
    pub fn committed(&self, count: usize) -> &[u8] {
        let n = core::cmp::min(count, self.geometry.samples_per_block());
        &self.data[..n]
    }

    /// Sentinel-fill the data region and erase the footer.
    pub fn reset(&mut self) {
        let off = self.geometry.footer_offset();
        self.data[..off].fill(SENTINEL);
        self.data[off..].fill(ERASED_BYTE);
        self.fill = 0;
    }

    pub fn as_bytes(&self) -> &[u8] { &self.data }

    /// Raw access for loading a block from the store.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.fill = 0;
        &mut self.data
    }
}

/// The two pages of the writer. Exactly one is active.
pub struct PagePair {
    pages: [Page; 2],
    active: usize,
}

impl PagePair {
    pub fn new(geometry: Geometry) -> Self {
        Self { pages: [Page::new(geometry), Page::new(geometry)], active: 0 }
    }

    pub fn active(&self) -> &Page { &self.pages[self.active] }

    pub fn active_mut(&mut self) -> &mut Page { &mut self.pages[self.active] }

    pub fn idle(&self) -> &Page { &self.pages[self.active ^ 1] }

    pub fn idle_mut(&mut self) -> &mut Page { &mut self.pages[self.active ^ 1] }

    pub fn active_index(&self) -> usize { self.active }

    /// Hand the active role to the other page and clear it for new samples.
    /// The previously active page keeps its contents until reused.
    pub fn swap(&mut self) {
        self.active ^= 1;
        self.pages[self.active].reset();
    }

    pub fn reset_all(&mut self) {
        for page in self.pages.iter_mut() { page.reset(); }
    }
}
