//! Media semantics shared by the flash backends.
extern crate alloc;
use alloc::vec::Vec;
use trove_core::{TroveError, TroveResult, ERASED_BYTE};
use trove_hal::{BlockHandle, StoreHandle};

/// An operation waiting for its completion event.
#[derive(Debug, Clone)]
pub enum FlashOp {
    Write { block: BlockHandle, data: Vec<u8> },
    Erase,
}

/// Geometry of a registered flash region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub block_size: usize,
    pub block_count: usize,
}

impl Region {
    pub fn len(&self) -> usize {
        self.block_size * self.block_count
    }

    pub fn handle(&self, module_id: u32) -> StoreHandle {
        StoreHandle { module_id, base: 0, block_size: self.block_size, block_count: self.block_count }
    }

    pub fn block_handle(&self, base: &StoreHandle, index: usize) -> TroveResult<BlockHandle> {
        if index >= self.block_count { return Err(TroveError::OutOfRange); }
        Ok(BlockHandle { module_id: base.module_id, block_id: base.base + index as u32 })
    }

    pub fn offset_of(&self, block: &BlockHandle) -> TroveResult<usize> {
        let index = block.block_id as usize;
        if index >= self.block_count { return Err(TroveError::OutOfRange); }
        Ok(index * self.block_size)
    }
}

/// [NOR] Programming can only clear bits. Erase is the only way back to 1.
pub fn program(cells: &mut [u8], data: &[u8]) {
    for (cell, byte) in cells.iter_mut().zip(data) {
        *cell &= *byte;
    }
}

pub fn erase(cells: &mut [u8]) {
    cells.fill(ERASED_BYTE);
}
