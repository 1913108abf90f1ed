#![no_std]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod backend;
mod block_store;
mod mem_flash;
mod recovery;
mod ring;
#[cfg(feature = "std")]
pub mod fs_backend;

pub use block_store::{BlockStore, DrainReport, ScanReport};
pub use mem_flash::MemFlash;
pub use recovery::{PowerRecovery, RecoveryReport};
pub use ring::{AppendOutcome, FlushOutcome, Occupancy, RingWriter, WriteCursor};
