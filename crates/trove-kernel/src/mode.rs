use log::{debug, info};

use trove_core::Mode;

/// An admitted mode change. The caller performs the side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
}

impl Transition {
    pub fn enters_transfer(&self) -> bool { self.to == Mode::Transfer }
    pub fn leaves_transfer(&self) -> bool { self.from == Mode::Transfer }
}

/// Gatekeeper for Recording / LiveReport / Transfer.
#[derive(Debug, Default)]
pub struct ModeController {
    mode: Mode,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode { self.mode }

    pub fn admits(from: Mode, to: Mode) -> bool {
        matches!(
            (from, to),
            (Mode::Recording, Mode::LiveReport)
                | (Mode::Recording, Mode::Transfer)
                | (Mode::LiveReport, Mode::Transfer)
                | (Mode::LiveReport, Mode::Recording)
                | (Mode::Transfer, Mode::Recording)
        )
    }

    /// Check a request. Nothing changes until `commit`.
    pub fn request(&self, to: Mode) -> Option<Transition> {
        if !Self::admits(self.mode, to) {
            debug!("mode: {:?} -> {:?} ignored", self.mode, to);
            return None;
        }
        Some(Transition { from: self.mode, to })
    }

    pub fn commit(&mut self, transition: Transition) {
        info!("mode: {:?} -> {:?}", transition.from, transition.to);
        self.mode = transition.to;
    }
}
