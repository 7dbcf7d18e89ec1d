//! Surface tracking state machine.
//!
//! ```text
//!   Searching --valid detection (auto) / confirm--> Chosen
//!   Chosen    --N consecutive failed cycles-------> Lost
//!   Lost      --valid detection------------------> Chosen
//!   Chosen|Lost --confirm / reset----------------> Searching
//! ```

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceState {
    /// No surface committed; waiting for a valid detection.
    #[default]
    Searching,
    /// A surface is committed and its transform is current.
    Chosen,
    /// The committed surface has not been seen for too long; its last
    /// transform is kept but stale.
    Lost,
}

/// A state change caused by one cycle or a user action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: SurfaceState,
    pub to: SurfaceState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceTracker {
    state: SurfaceState,
    consecutive_failures: u32,
    lost_threshold: u32,
    auto_choose: bool,
    /// Latest detection cycle succeeded; a confirm can commit it.
    candidate_ready: bool,
}

impl SurfaceTracker {
    pub fn new(lost_threshold: u32, auto_choose: bool) -> Self {
        Self {
            state: SurfaceState::Searching,
            consecutive_failures: 0,
            lost_threshold: lost_threshold.max(1),
            auto_choose,
            candidate_ready: false,
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn candidate_ready(&self) -> bool {
        self.candidate_ready
    }

    /// The cycle produced valid geometry.
    pub fn on_success(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.candidate_ready = true;
        match self.state {
            SurfaceState::Searching if self.auto_choose => self.go(SurfaceState::Chosen),
            SurfaceState::Lost => self.go(SurfaceState::Chosen),
            _ => None,
        }
    }

    /// The cycle failed: no frame, or geometry rejected.
    pub fn on_failure(&mut self) -> Option<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.candidate_ready = false;
        if self.state == SurfaceState::Chosen && self.consecutive_failures >= self.lost_threshold {
            return self.go(SurfaceState::Lost);
        }
        None
    }

    /// User confirmation.
    ///
    /// While searching this commits the current candidate, if the latest
    /// detection was valid. With a surface committed (chosen or lost) it
    /// releases it and searching starts over.
    pub fn confirm(&mut self) -> Option<Transition> {
        match self.state {
            SurfaceState::Searching if self.candidate_ready => self.go(SurfaceState::Chosen),
            SurfaceState::Searching => None,
            SurfaceState::Chosen | SurfaceState::Lost => {
                self.candidate_ready = false;
                self.go(SurfaceState::Searching)
            }
        }
    }

    pub fn reset(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.candidate_ready = false;
        self.go(SurfaceState::Searching)
    }

    fn go(&mut self, to: SurfaceState) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        if to == SurfaceState::Chosen {
            self.consecutive_failures = 0;
        }
        Some(Transition { from, to })
    }
}
