#![no_std]

extern crate alloc;

mod credit;
mod streamer;

pub use credit::CreditWindow;
pub use streamer::{BlockSink, DumpSummary, ReadCursor, SessionState, Streamer};
