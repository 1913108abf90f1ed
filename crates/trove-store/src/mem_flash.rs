extern crate alloc;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use trove_core::{TroveError, TroveResult, ERASED_BYTE};
use trove_hal::{BlockDevice, BlockHandle, StoreEvent, StoreHandle};

use crate::backend::{self, FlashOp, Region};

struct FlashState {
    image: Vec<u8>,
    region: Option<Region>,
    registrations: u32,
    queue: VecDeque<FlashOp>,
    fail_writes: usize,
    fail_reads: usize,
    writes_issued: usize,
    writes_applied: usize,
    erases_applied: usize,
}

/// RAM-backed NOR flash with asynchronous completion.
///
/// Clones share the same medium, so a test can keep one handle to inspect
/// the image or inject faults while another is owned by the store. The
/// image survives the store being dropped, which is how a reboot is modelled.
#[derive(Clone)]
pub struct MemFlash {
    state: Arc<Mutex<FlashState>>,
}

impl MemFlash {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FlashState {
                image: Vec::new(),
                region: None,
                registrations: 0,
                queue: VecDeque::new(),
                fail_writes: 0,
                fail_reads: 0,
                writes_issued: 0,
                writes_applied: 0,
                erases_applied: 0,
            })),
        }
    }

    /// The next `n` writes report an error and leave the cells untouched.
    pub fn fail_next_writes(&self, n: usize) {
        self.state.lock().fail_writes = n;
    }

    /// The next `n` block reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.state.lock().fail_reads = n;
    }

    /// Drop every operation still in flight. Returns how many were lost.
    pub fn power_cut(&self) -> usize {
        let mut st = self.state.lock();
        let lost = st.queue.len();
        st.queue.clear();
        lost
    }

    pub fn writes_issued(&self) -> usize { self.state.lock().writes_issued }
    pub fn writes_applied(&self) -> usize { self.state.lock().writes_applied }
    pub fn erases_applied(&self) -> usize { self.state.lock().erases_applied }
    pub fn pending(&self) -> usize { self.state.lock().queue.len() }

    pub fn image(&self) -> Vec<u8> {
        self.state.lock().image.clone()
    }

    /// Raw copy of one block as it sits on the medium.
    pub fn block(&self, index: usize) -> Vec<u8> {
        let st = self.state.lock();
        match st.region {
            Some(r) if index < r.block_count => {
                st.image[index * r.block_size..(index + 1) * r.block_size].to_vec()
            }
            _ => Vec::new(),
        }
    }

    /// Program bytes directly, bypassing the queue. Fixture helper.
    pub fn poke(&self, offset: usize, data: &[u8]) {
        let mut st = self.state.lock();
        let end = core::cmp::min(offset + data.len(), st.image.len());
        if offset < end {
            backend::program(&mut st.image[offset..end], &data[..end - offset]);
        }
    }
}

impl Default for MemFlash {
    fn default() -> Self { Self::new() }
}

impl BlockDevice for MemFlash {
    fn register(&mut self, block_size: usize, block_count: usize) -> TroveResult<StoreHandle> {
        let mut st = self.state.lock();
        let region = Region { block_size, block_count };
        match st.region {
            // Reboot: same layout, keep the cells.
            Some(existing) if existing == region => {}
            Some(_) => return Err(TroveError::Geometry),
            None => {
                st.image = vec![ERASED_BYTE; region.len()];
                st.region = Some(region);
            }
        }
        st.registrations += 1;
        Ok(region.handle(st.registrations))
    }

    fn block_handle(&self, base: &StoreHandle, index: usize) -> TroveResult<BlockHandle> {
        let st = self.state.lock();
        st.region.ok_or(TroveError::InvalidState)?.block_handle(base, index)
    }

    fn write_block(&mut self, block: &BlockHandle, data: &[u8]) -> TroveResult<()> {
        let mut st = self.state.lock();
        let region = st.region.ok_or(TroveError::InvalidState)?;
        region.offset_of(block)?;
        if data.len() > region.block_size { return Err(TroveError::OutOfRange); }
        st.writes_issued += 1;
        st.queue.push_back(FlashOp::Write { block: *block, data: data.to_vec() });
        Ok(())
    }

    fn read_block(&mut self, block: &BlockHandle, out: &mut [u8]) -> TroveResult<()> {
        let mut st = self.state.lock();
        if st.fail_reads > 0 {
            st.fail_reads -= 1;
            return Err(TroveError::StorageFailure);
        }
        let region = st.region.ok_or(TroveError::InvalidState)?;
        let offset = region.offset_of(block)?;
        let n = core::cmp::min(out.len(), region.block_size);
        out[..n].copy_from_slice(&st.image[offset..offset + n]);
        Ok(())
    }

    fn erase_all(&mut self, _base: &StoreHandle) -> TroveResult<()> {
        let mut st = self.state.lock();
        if st.region.is_none() { return Err(TroveError::InvalidState); }
        st.queue.push_back(FlashOp::Erase);
        Ok(())
    }

    fn pending_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn poll_completion(&mut self) -> nb::Result<StoreEvent, TroveError> {
        let mut st = self.state.lock();
        let op = st.queue.pop_front().ok_or(nb::Error::WouldBlock)?;
        let region = st.region.ok_or(nb::Error::Other(TroveError::InvalidState))?;

        match op {
            FlashOp::Write { block, data } => {
                if st.fail_writes > 0 {
                    st.fail_writes -= 1;
                    return Err(nb::Error::Other(TroveError::StorageFailure));
                }
                let offset = region.offset_of(&block).map_err(nb::Error::Other)?;
                backend::program(&mut st.image[offset..offset + data.len()], &data);
                st.writes_applied += 1;
                Ok(StoreEvent::WriteComplete(block))
            }
            FlashOp::Erase => {
                backend::erase(&mut st.image);
                st.erases_applied += 1;
                Ok(StoreEvent::EraseComplete)
            }
        }
    }
}
