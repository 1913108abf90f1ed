#![cfg(feature = "std")]

use crate::backend::{self, FlashOp, Region};
use log::debug;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use trove_core::{TroveError, TroveResult, ERASED_BYTE};
use trove_hal::{BlockDevice, BlockHandle, StoreEvent, StoreHandle};
// FIX: Explicitly import vec! to handle no_std crate context
use std::vec;

/// Flash image kept in a regular file.
///
/// Operations are queued on issue and applied, then synced, when their
/// completion is polled. Killing the process with operations queued is a
/// power cut: they never reach the file.
pub struct FileFlash {
    path: PathBuf,
    file: Option<File>,
    region: Option<Region>,
    queue: VecDeque<FlashOp>,
}

impl FileFlash {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), file: None, region: None, queue: VecDeque::new() }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn file(&mut self) -> TroveResult<&mut File> {
        self.file.as_mut().ok_or(TroveError::InvalidState)
    }

    fn apply(&mut self, op: &FlashOp) -> TroveResult<()> {
        let region = self.region.ok_or(TroveError::InvalidState)?;
        match op {
            FlashOp::Write { block, data } => {
                let offset = region.offset_of(block)?;
                let mut cells = vec![0u8; data.len()];
                let file = self.file()?;
                file.seek(SeekFrom::Start(offset as u64)).map_err(|_| TroveError::HalError)?;
                file.read_exact(&mut cells).map_err(|_| TroveError::HalError)?;
                backend::program(&mut cells, data);
                file.seek(SeekFrom::Start(offset as u64)).map_err(|_| TroveError::HalError)?;
                file.write_all(&cells).map_err(|_| TroveError::StorageFailure)?;
                // FSYNC (Critical)
                file.sync_data().map_err(|_| TroveError::StorageFailure)?;
            }
            FlashOp::Erase => {
                let blank = vec![ERASED_BYTE; region.len()];
                let file = self.file()?;
                file.seek(SeekFrom::Start(0)).map_err(|_| TroveError::HalError)?;
                file.write_all(&blank).map_err(|_| TroveError::StorageFailure)?;
                file.sync_data().map_err(|_| TroveError::StorageFailure)?;
            }
        }
        Ok(())
    }
}

impl BlockDevice for FileFlash {
    fn register(&mut self, block_size: usize, block_count: usize) -> TroveResult<StoreHandle> {
        let region = Region { block_size, block_count };
        let mut file = OpenOptions::new()
            .read(true).write(true).create(true)
            .open(&self.path).map_err(|_| TroveError::HalError)?;

        let len = file.metadata().map_err(|_| TroveError::HalError)?.len() as usize;
        if len == 0 {
            // Factory-fresh medium
            file.write_all(&vec![ERASED_BYTE; region.len()]).map_err(|_| TroveError::HalError)?;
            file.sync_all().map_err(|_| TroveError::HalError)?;
            debug!("created flash image {} ({} bytes)", self.path.display(), region.len());
        } else if len != region.len() {
            return Err(TroveError::Geometry);
        }

        self.file = Some(file);
        self.region = Some(region);
        Ok(region.handle(1))
    }

    fn block_handle(&self, base: &StoreHandle, index: usize) -> TroveResult<BlockHandle> {
        self.region.ok_or(TroveError::InvalidState)?.block_handle(base, index)
    }

    fn write_block(&mut self, block: &BlockHandle, data: &[u8]) -> TroveResult<()> {
        let region = self.region.ok_or(TroveError::InvalidState)?;
        region.offset_of(block)?;
        if data.len() > region.block_size { return Err(TroveError::OutOfRange); }
        self.queue.push_back(FlashOp::Write { block: *block, data: data.to_vec() });
        Ok(())
    }

    fn read_block(&mut self, block: &BlockHandle, out: &mut [u8]) -> TroveResult<()> {
        let region = self.region.ok_or(TroveError::InvalidState)?;
        let offset = region.offset_of(block)?;
        let n = core::cmp::min(out.len(), region.block_size);
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset as u64)).map_err(|_| TroveError::HalError)?;
        file.read_exact(&mut out[..n]).map_err(|_| TroveError::HalError)?;
        Ok(())
    }

    fn erase_all(&mut self, _base: &StoreHandle) -> TroveResult<()> {
        if self.region.is_none() { return Err(TroveError::InvalidState); }
        self.queue.push_back(FlashOp::Erase);
        Ok(())
    }

    fn pending_count(&self) -> usize {
        self.queue.len()
    }

    fn poll_completion(&mut self) -> nb::Result<StoreEvent, TroveError> {
        let op = self.queue.pop_front().ok_or(nb::Error::WouldBlock)?;
        self.apply(&op).map_err(nb::Error::Other)?;
        match op {
            FlashOp::Write { block, .. } => Ok(StoreEvent::WriteComplete(block)),
            FlashOp::Erase => Ok(StoreEvent::EraseComplete),
        }
    }
}
