//! State shared between the capture cycle and its readers.
//!
//! Everything a reader can observe lives in one [`Published`] value behind a
//! single `parking_lot::Mutex`. The cycle builds its whole outcome without
//! the lock, then [`SharedSurface::publish`] takes the lock once to swap it
//! in. Readers take the lock only long enough to clone an `Arc` or copy a
//! few scalars, so a reader never sees a frame from one cycle paired with a
//! matrix from another.

use crate::{CaptureConfig, CycleError, SurfaceState, SurfaceTracker, Transition};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use surface_capture_core::{Frame, GameLine, SurfaceGeometry, TransformMatrix};

/// Geometry and homography of one validated detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TrackedSurface {
    pub geometry: SurfaceGeometry,
    /// Built with an identity projection, so `transform.matrix` is the bare
    /// embedded camera-to-game homography.
    pub transform: TransformMatrix,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Detection {
    /// Cadence skipped detection on this frame.
    Skipped,
    Found(TrackedSurface),
    Failed {
        error: CycleError,
        /// The last good transform, flagged stale by the builder.
        stale: Option<TransformMatrix>,
    },
}

/// Everything one cycle wants to publish.
#[derive(Clone, Debug)]
pub(crate) struct CycleOutcome {
    pub frame: Option<Arc<Frame>>,
    pub detection: Detection,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PublishResult {
    pub state: SurfaceState,
    pub transition: Option<Transition>,
}

/// Focal distance in pixels for a horizontal `fov` over `width` pixels.
///
/// Zero when either is unusable.
pub fn pixel_distance(fov: f64, width: usize) -> f64 {
    if width == 0 || !(fov > 0.0 && fov < std::f64::consts::PI) {
        return 0.0;
    }
    (width as f64 / 2.0) / (fov / 2.0).tan()
}

/// Copy of the published state at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceSnapshot {
    pub frame: Option<Arc<Frame>>,
    /// Number of frames published so far.
    pub frame_id: u64,
    /// Number of cycles published so far, including failed acquisitions.
    pub cycles: u64,
    pub state: SurfaceState,
    pub consecutive_failures: u32,
    /// The committed surface; `None` while searching.
    pub surface: Option<TrackedSurface>,
    pub last_error: Option<CycleError>,
    pub fov: f64,
    pub pixel_distance: f64,
    pub shortest_game_line: GameLine,
    pub capture_size: Option<(usize, usize)>,
}

#[derive(Debug)]
struct Published {
    frame: Option<Arc<Frame>>,
    frame_id: u64,
    cycles: u64,
    tracker: SurfaceTracker,
    committed: Option<TrackedSurface>,
    candidate: Option<TrackedSurface>,
    last_error: Option<CycleError>,
    fov: f64,
    shortest_game_line: GameLine,
    capture_size: Option<(usize, usize)>,
}

impl Published {
    fn pixel_distance(&self) -> f64 {
        self.capture_size
            .map_or(0.0, |(width, _)| pixel_distance(self.fov, width))
    }

    fn apply_transition(&mut self, transition: Option<Transition>) {
        match transition.map(|t| t.to) {
            Some(SurfaceState::Chosen) => self.committed = self.candidate,
            Some(SurfaceState::Searching) => self.committed = None,
            _ => {}
        }
    }
}

#[derive(Debug)]
pub struct SharedSurface {
    inner: Mutex<Published>,
}

impl SharedSurface {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            inner: Mutex::new(Published {
                frame: None,
                frame_id: 0,
                cycles: 0,
                tracker: SurfaceTracker::new(config.lost_threshold_cycles, config.auto_choose),
                committed: None,
                candidate: None,
                last_error: None,
                fov: config.field_of_view,
                shortest_game_line: config.shortest_game_line,
                capture_size: None,
            }),
        }
    }

    pub(crate) fn publish(&self, outcome: CycleOutcome) -> PublishResult {
        let mut p = self.inner.lock();
        p.cycles += 1;
        if let Some(frame) = outcome.frame {
            p.capture_size = Some(frame.size());
            p.frame = Some(frame);
            p.frame_id += 1;
        }

        let transition = match outcome.detection {
            Detection::Skipped => None,
            Detection::Found(surface) => {
                p.candidate = Some(surface);
                p.last_error = None;
                let transition = p.tracker.on_success();
                if p.tracker.state() == SurfaceState::Chosen {
                    p.committed = Some(surface);
                }
                transition
            }
            Detection::Failed { error, stale } => {
                p.candidate = None;
                p.last_error = Some(error);
                if let (Some(committed), Some(stale)) = (p.committed.as_mut(), stale) {
                    committed.transform = stale;
                }
                p.tracker.on_failure()
            }
        };

        PublishResult {
            state: p.tracker.state(),
            transition,
        }
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        let p = self.inner.lock();
        SurfaceSnapshot {
            frame: p.frame.clone(),
            frame_id: p.frame_id,
            cycles: p.cycles,
            state: p.tracker.state(),
            consecutive_failures: p.tracker.consecutive_failures(),
            surface: p.committed,
            last_error: p.last_error.clone(),
            fov: p.fov,
            pixel_distance: p.pixel_distance(),
            shortest_game_line: p.shortest_game_line,
            capture_size: p.capture_size,
        }
    }

    pub fn frame(&self) -> Option<Arc<Frame>> {
        self.inner.lock().frame.clone()
    }

    /// Latest frame together with the committed surface, read atomically.
    pub fn frame_and_surface(&self) -> (Option<Arc<Frame>>, Option<TrackedSurface>) {
        let p = self.inner.lock();
        (p.frame.clone(), p.committed)
    }

    pub fn surface(&self) -> Option<TrackedSurface> {
        self.inner.lock().committed
    }

    pub fn state(&self) -> SurfaceState {
        self.inner.lock().tracker.state()
    }

    pub fn fov(&self) -> f64 {
        self.inner.lock().fov
    }

    pub fn set_fov(&self, fov: f64) {
        self.inner.lock().fov = fov;
    }

    pub fn pixel_distance(&self) -> f64 {
        self.inner.lock().pixel_distance()
    }

    pub fn shortest_game_line(&self) -> GameLine {
        self.inner.lock().shortest_game_line
    }

    pub fn set_shortest_game_line(&self, line: GameLine) {
        self.inner.lock().shortest_game_line = line;
    }

    /// The committed surface and the game line, read atomically.
    pub fn surface_and_game_line(&self) -> (Option<TrackedSurface>, GameLine) {
        let p = self.inner.lock();
        (p.committed, p.shortest_game_line)
    }

    pub fn capture_size(&self) -> Option<(usize, usize)> {
        self.inner.lock().capture_size
    }

    pub(crate) fn confirm(&self) -> Option<Transition> {
        let mut p = self.inner.lock();
        let transition = p.tracker.confirm();
        p.apply_transition(transition);
        transition
    }

    pub(crate) fn reset(&self) -> Option<Transition> {
        let mut p = self.inner.lock();
        let transition = p.tracker.reset();
        p.committed = None;
        p.candidate = None;
        p.last_error = None;
        transition
    }
}
