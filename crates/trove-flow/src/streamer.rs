#![forbid(unsafe_code)]
use alloc::vec::Vec;
use log::{debug, error, info, warn};

use trove_core::TroveResult;
use trove_store::RingWriter;

/// Next block to load, and bytes already consumed from the loaded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadCursor {
    pub block: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Complete,
}

/// Receives whole blocks from a blocking dump.
pub trait BlockSink {
    fn on_block(&mut self, index: usize, samples: &[u8]) -> TroveResult<()>;
}

impl BlockSink for Vec<u8> {
    fn on_block(&mut self, _index: usize, samples: &[u8]) -> TroveResult<()> {
        self.extend_from_slice(samples);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DumpSummary {
    pub blocks: usize,
    pub samples: usize,
    pub skipped: usize,
}

/// Sequential reader over the committed blocks, oldest first.
///
/// The writer's idle page is borrowed as scratch. A session ends at the
/// writer's cursor; the active page is never read.
#[derive(Debug, Default)]
pub struct Streamer {
    cursor: ReadCursor,
    loaded: usize,
    current: Option<usize>,
    scratch_gen: u32,
    state: SessionState,
    skipped: usize,
    delivered: usize,
}

impl Streamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind to before block 0.
    pub fn begin_session(&mut self) {
        *self = Self { state: SessionState::Active, ..Self::default() };
    }

    pub fn state(&self) -> SessionState { self.state }

    pub fn cursor(&self) -> ReadCursor { self.cursor }

    /// Bytes handed out by `fill` in this session.
    pub fn bytes_delivered(&self) -> usize { self.delivered }

    /// Blocks skipped because their footer or read was bad.
    pub fn blocks_skipped(&self) -> usize { self.skipped }

    /// Copy the next bytes of the log into `out`. Returns 0 once the session
    /// is complete. Resumes exactly where the previous call stopped.
    pub fn fill(&mut self, writer: &mut RingWriter, out: &mut [u8]) -> TroveResult<usize> {
        if self.state != SessionState::Active { return Ok(0); }

        let mut written = 0;
        while written < out.len() {
            if self.cursor.offset >= self.loaded {
                if !self.load_next(writer)? {
                    self.finish();
                    break;
                }
                continue;
            }

            self.revalidate(writer);
            let (_, scratch) = writer.read_parts();
            let avail = &scratch.committed(self.loaded)[self.cursor.offset..];
            let n = core::cmp::min(avail.len(), out.len() - written);
            out[written..written + n].copy_from_slice(&avail[..n]);
            written += n;
            self.cursor.offset += n;
        }

        self.delivered += written;
        Ok(written)
    }

    /// Blocking walk of the whole committed log, one block at a time.
    pub fn dump(&mut self, writer: &mut RingWriter, sink: &mut dyn BlockSink) -> TroveResult<DumpSummary> {
        self.begin_session();
        let mut summary = DumpSummary::default();

        while self.load_next(writer)? {
            let index = self.cursor.block - 1;
            let (_, scratch) = writer.read_parts();
            sink.on_block(index, scratch.committed(self.loaded))?;
            summary.blocks += 1;
            summary.samples += self.loaded;
            self.delivered += self.loaded;
            self.cursor.offset = self.loaded;
        }

        self.finish();
        summary.skipped = self.skipped;
        Ok(summary)
    }

    fn finish(&mut self) {
        if self.state == SessionState::Active {
            info!(
                "session complete: {} bytes, {} blocks skipped",
                self.delivered, self.skipped
            );
        }
        self.state = SessionState::Complete;
        self.current = None;
        self.loaded = 0;
        self.cursor.offset = 0;
    }

    /// Load the next readable block below the write cursor into scratch.
    fn load_next(&mut self, writer: &mut RingWriter) -> TroveResult<bool> {
        let limit = writer.committed_blocks();

        while self.cursor.block < limit {
            let index = self.cursor.block;
            self.cursor.block += 1;

            let valid = {
                let (store, scratch) = writer.read_parts();
                match store.read(index, scratch) {
                    Ok(footer) if footer.is_valid(store.geometry()) => Some(footer.count as usize),
                    Ok(footer) => {
                        warn!("block {} skipped: footer {:?}", index, footer);
                        None
                    }
                    Err(e) => {
                        error!("block {} unreadable ({}); skipped", index, e);
                        None
                    }
                }
            };

            match valid {
                Some(count) => {
                    debug!("stream: block {} ({} samples)", index, count);
                    self.current = Some(index);
                    self.loaded = count;
                    self.cursor.offset = 0;
                    self.scratch_gen = writer.generation();
                    return Ok(true);
                }
                None => self.skipped += 1,
            }
        }

        self.current = None;
        self.loaded = 0;
        self.cursor.offset = 0;
        Ok(false)
    }

    /// Reload the current block if the writer reused the scratch page.
    fn revalidate(&mut self, writer: &mut RingWriter) {
        let Some(index) = self.current else { return };
        if writer.generation() == self.scratch_gen { return; }

        debug!("stream: scratch reused, reloading block {}", index);
        let reloaded = {
            let (store, scratch) = writer.read_parts();
            store.read(index, scratch)
        };
        match reloaded {
            Ok(_) => self.scratch_gen = writer.generation(),
            Err(e) => {
                error!("block {} unreadable on reload ({}); rest of block skipped", index, e);
                self.cursor.offset = self.loaded;
                self.skipped += 1;
            }
        }
    }
}
