#![no_std]
#![forbid(unsafe_code)]

use trove_core::{Sample, TroveError, TroveResult};

/// Registration handle returned by the block device for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHandle {
    pub module_id: u32,
    pub base: u32,
    pub block_size: usize,
    pub block_count: usize,
}

/// Device-side identifier of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub module_id: u32,
    pub block_id: u32,
}

/// Completion reported by the block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    WriteComplete(BlockHandle),
    EraseComplete,
}

/// Block-granular persistent storage (flash).
/// INVARIANT: writes and erases are asynchronous. The device copies the
/// caller's bytes before `write_block` returns; completion is observed only
/// through `pending_count` and `poll_completion`.
pub trait BlockDevice: Send {
    fn register(&mut self, block_size: usize, block_count: usize) -> TroveResult<StoreHandle>;

    /// Map a logical index to the device's block handle.
    fn block_handle(&self, base: &StoreHandle, index: usize) -> TroveResult<BlockHandle>;

    fn write_block(&mut self, block: &BlockHandle, data: &[u8]) -> TroveResult<()>;

    /// Synchronous from the caller's point of view.
    fn read_block(&mut self, block: &BlockHandle, out: &mut [u8]) -> TroveResult<()>;

    fn erase_all(&mut self, base: &StoreHandle) -> TroveResult<()>;

    /// Operations issued but not yet completed.
    fn pending_count(&self) -> usize;

    /// Service the completion queue once.
    /// `WouldBlock` when nothing has completed; `Other` when the oldest
    /// pending operation failed.
    fn poll_completion(&mut self) -> nb::Result<StoreEvent, TroveError>;
}

/// Link metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkProperties {
    /// Largest payload accepted by one `send_chunk`.
    pub chunk_size: usize,
    /// Chunks that may be outstanding before a delivery notification.
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Single-byte request from the operator.
    Command(u8),
    /// A previously accepted chunk has left the buffer.
    ChunkDelivered,
    Lost,
}

/// The operator link (BLE UART in the field, UDP on the host).
/// INVARIANT: Must be Non-Blocking.
pub trait LinkInterface: Send {
    fn properties(&self) -> LinkProperties;

    fn is_connected(&self) -> bool;

    /// Free transmit buffers right now.
    fn available_slots(&self) -> usize;

    /// `WouldBlock` means the chunk was not accepted and must be offered again.
    fn send_chunk(&mut self, chunk: &[u8]) -> nb::Result<usize, TroveError>;

    fn poll_event(&mut self) -> nb::Result<LinkEvent, TroveError>;
}

/// Two-phase sensor: a conversion must be started before a result is read.
pub trait Sensor: Send {
    fn start_acquisition(&mut self) -> TroveResult<()>;
    fn read_result(&mut self) -> TroveResult<Sample>;
}

/// Periodic timer driving `on_tick`.
pub trait Scheduler: Send {
    fn every(&mut self, interval_us: u64);
    fn cancel(&mut self);
    fn is_armed(&self) -> bool;

    /// True once per elapsed interval while armed.
    fn due(&mut self, now_us: u64) -> bool;
}

/// The Wall Clock.
pub trait PlatformClock: Send + Sync {
    fn now_us(&self) -> u64;
}
