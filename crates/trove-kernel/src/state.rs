use trove_core::Mode;
use trove_flow::Streamer;
use trove_store::RingWriter;

use crate::mode::ModeController;

/// Everything the recorder owns about the log: the writer, the reader that
/// borrows its scratch page, and the mode that decides which one runs.
pub struct LogState {
    pub writer: RingWriter,
    pub streamer: Streamer,
    pub mode: ModeController,
}

impl LogState {
    pub fn new(writer: RingWriter) -> Self {
        Self { writer, streamer: Streamer::new(), mode: ModeController::new() }
    }

    pub fn mode(&self) -> Mode { self.mode.mode() }
}
