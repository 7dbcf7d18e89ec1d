//! The capture loop: acquisition, detection and publication.
//!
//! One pipeline value owns the source, the lens correction and the
//! detection stages. It runs either on a dedicated worker thread
//! (`run_on_own_thread`) or from the host's [`CaptureLoop::work`] calls;
//! the cycle code is the same either way, so both modes publish identical
//! state for identical input.

use crate::shared::{CycleOutcome, Detection, SharedSurface, TrackedSurface};
use crate::{
    CalibrationStore, CaptureConfig, ConfigError, CornerLocator, CycleError, FrameSource,
    LogHandle, MarkerDetector, SourceError, SurfaceSnapshot, SurfaceState, Undistorter,
};
use log::{Level, Log};
use nalgebra::{Matrix3, Matrix4, Point2};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use surface_capture_core::{
    compose, homography_to_matrix4, warp_perspective, CornerOrderer, DegenerateKind, Frame,
    GameLine, GeometryAnalyzer, GeometryError, Homography, TransformBuilder, TransformMatrix,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

const LOG_TARGET: &str = "surface_capture::capture";

/// Sleep after a failed acquisition on a free-running worker.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Consumer of published frames, e.g. a texture upload.
///
/// Called after the shared state lock is released, on whichever thread ran
/// the cycle.
pub trait FrameSink: Send {
    fn push(&mut self, frame: &Arc<Frame>, state: SurfaceState);
}

impl<F> FrameSink for F
where
    F: FnMut(&Arc<Frame>, SurfaceState) + Send,
{
    fn push(&mut self, frame: &Arc<Frame>, state: SurfaceState) {
        self(frame, state)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CycleStatus {
    Published { acquired: bool },
    /// The source has no more frames; nothing was published.
    Exhausted,
    Discarded,
}

struct Pipeline {
    source: Box<dyn FrameSource>,
    undistorter: Undistorter,
    locator: CornerLocator,
    orderer: CornerOrderer,
    analyzer: GeometryAnalyzer,
    builder: TransformBuilder,
    sink: Option<Box<dyn FrameSink>>,
    detection_interval: u64,
    frames: u64,
    log: LogHandle,
}

impl Pipeline {
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    fn cycle(&mut self, shared: &SharedSurface, stop: &AtomicBool) -> CycleStatus {
        let acquired = self.acquire();
        if stop.load(Ordering::Acquire) {
            return CycleStatus::Discarded;
        }
        if matches!(acquired, Err(SourceError::Exhausted)) {
            return CycleStatus::Exhausted;
        }

        let outcome = match acquired {
            Ok(raw) => {
                let frame = Arc::new(self.undistorter.apply(raw));
                let detection = if self.frames % self.detection_interval == 0 {
                    match self.detect(&frame) {
                        Ok(surface) => Detection::Found(surface),
                        Err(err) => {
                            self.log.debug(format_args!("detection rejected: {err}"));
                            self.failed(err)
                        }
                    }
                } else {
                    Detection::Skipped
                };
                self.frames += 1;
                CycleOutcome {
                    frame: Some(frame),
                    detection,
                }
            }
            Err(err) => {
                self.log.debug(format_args!("acquisition failed: {err}"));
                CycleOutcome {
                    frame: None,
                    detection: self.failed(err.into()),
                }
            }
        };

        let frame = outcome.frame.clone();
        let acquired = frame.is_some();
        let published = shared.publish(outcome);
        if let Some(t) = published.transition {
            let level = if t.to == SurfaceState::Lost {
                Level::Warn
            } else {
                Level::Info
            };
            self.log
                .log(level, format_args!("surface {:?} -> {:?}", t.from, t.to));
        }
        if let (Some(sink), Some(frame)) = (self.sink.as_mut(), frame) {
            sink.push(&frame, published.state);
        }
        CycleStatus::Published { acquired }
    }

    fn acquire(&mut self) -> Result<Frame, SourceError> {
        let frame = self.source.next_frame()?;
        if frame.is_empty() {
            return Err(SourceError::EmptyFrame);
        }
        frame.validate()?;
        Ok(frame)
    }

    fn detect(&mut self, frame: &Frame) -> Result<TrackedSurface, CycleError> {
        let candidates = self.locator.locate(frame)?;
        let corners = candidates.into_ordered(&self.orderer)?;
        let geometry = self.analyzer.analyze(&corners)?;
        let transform = self
            .builder
            .build(Some(&geometry.corners), &Matrix4::identity())?;
        if transform.stale {
            let kind = DegenerateKind::SingularHomography;
            return Err(GeometryError::DegenerateGeometry(kind).into());
        }
        Ok(TrackedSurface {
            geometry,
            transform,
        })
    }

    /// A failed detection carrying the builder's previous matrix, if any.
    fn failed(&mut self, error: CycleError) -> Detection {
        Detection::Failed {
            error,
            stale: self.builder.build(None, &Matrix4::identity()).ok(),
        }
    }
}

/// Camera capture loop tracking one play surface.
///
/// ```no_run
/// use nalgebra::{Matrix4, Point2};
/// use surface_capture::core::Frame;
/// use surface_capture::{CaptureConfig, CaptureLoop, ImageSequenceSource};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = ImageSequenceSource::from_dir("frames")?.looping(true);
/// let detector = |_: &Frame| -> Vec<Point2<f64>> { Vec::new() };
/// let mut capture = CaptureLoop::new(CaptureConfig::default(), source, detector)?;
/// capture.start()?;
///
/// // Render thread, every frame:
/// if capture.has_chosen() {
///     let _texture = capture.image();
///     let _matrix = capture.transform_matrix(&Matrix4::identity());
/// }
/// capture.stop();
/// # Ok(())
/// # }
/// ```
pub struct CaptureLoop {
    config: CaptureConfig,
    shared: Arc<SharedSurface>,
    stop: Arc<AtomicBool>,
    /// Only touched through `&mut self`; the mutex makes the loop `Sync` so
    /// reader threads can share it.
    pipeline: Mutex<Option<Pipeline>>,
    worker: Option<JoinHandle<Pipeline>>,
    running: bool,
    log: LogHandle,
}

impl CaptureLoop {
    pub fn new(
        config: CaptureConfig,
        source: impl FrameSource + 'static,
        detector: impl MarkerDetector + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let log = LogHandle::global(LOG_TARGET);
        let pipeline = Pipeline {
            source: Box::new(source),
            undistorter: Undistorter::new(None, log.with_target("surface_capture::undistort")),
            locator: CornerLocator::new(Box::new(detector)),
            orderer: config.corner_orderer(),
            analyzer: GeometryAnalyzer::new(config.analyzer_params()),
            builder: TransformBuilder::new(config.target_rect()),
            sink: None,
            detection_interval: u64::from(config.detection_interval.max(1)),
            frames: 0,
            log: log.clone(),
        };
        Ok(Self {
            shared: Arc::new(SharedSurface::new(&config)),
            config,
            stop: Arc::new(AtomicBool::new(false)),
            pipeline: Mutex::new(Some(pipeline)),
            worker: None,
            running: false,
            log,
        })
    }

    /// Undistort frames with `store`. Only effective before [`start`](Self::start).
    pub fn with_calibration(mut self, store: impl CalibrationStore + 'static) -> Self {
        if let Some(pipeline) = self.pipeline.get_mut() {
            pipeline.undistorter.set_store(Box::new(store));
        }
        self
    }

    /// Push every published frame to `sink`. Only effective before
    /// [`start`](Self::start).
    pub fn with_sink(mut self, sink: impl FrameSink + 'static) -> Self {
        if let Some(pipeline) = self.pipeline.get_mut() {
            pipeline.sink = Some(Box::new(sink));
        }
        self
    }

    /// Route this loop's log records to `logger` instead of the global
    /// `log` facade. Only effective before [`start`](Self::start).
    pub fn with_logger(mut self, logger: Arc<dyn Log>) -> Self {
        self.log = LogHandle::new(logger, LOG_TARGET);
        if let Some(pipeline) = self.pipeline.get_mut() {
            pipeline.log = self.log.clone();
            pipeline
                .undistorter
                .set_log(self.log.with_target("surface_capture::undistort"));
        }
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Set the field of view from the calibration intrinsics, if any.
    ///
    /// Uses the latest capture width, falling back to twice the principal
    /// point. Returns the new value.
    pub fn use_calibrated_fov(&mut self) -> Option<f64> {
        let intrinsics = self.pipeline.get_mut().as_ref()?.undistorter.intrinsics()?;
        let width = match self.shared.capture_size() {
            Some((width, _)) => width,
            None => (2.0 * intrinsics.cx).round() as usize,
        };
        let fov = intrinsics.horizontal_fov(width);
        (fov > 0.0 && fov < std::f64::consts::PI).then(|| {
            self.shared.set_fov(fov);
            fov
        })
    }

    /// Begin continuous acquisition. A second call is a no-op.
    ///
    /// With `run_on_own_thread` this spawns the worker; otherwise the host
    /// must call [`work`](Self::work) every tick.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.running {
            return Ok(());
        }
        self.stop.store(false, Ordering::Release);
        if !self.config.run_on_own_thread {
            self.running = true;
            return Ok(());
        }
        let Some(mut pipeline) = self.pipeline.get_mut().take() else {
            return Ok(());
        };

        let shared = Arc::clone(&self.shared);
        let stop = Arc::clone(&self.stop);
        let interval = Duration::from_millis(self.config.frame_interval_ms);
        let handle = thread::Builder::new()
            .name("surface-capture".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let started = Instant::now();
                    let status = pipeline.cycle(&shared, &stop);
                    if let Some(rest) = interval.checked_sub(started.elapsed()) {
                        thread::sleep(rest);
                    } else if status != (CycleStatus::Published { acquired: true })
                        && interval.is_zero()
                    {
                        thread::sleep(IDLE_BACKOFF);
                    }
                }
                pipeline
            })?;
        self.log.info(format_args!("capture worker started"));
        self.worker = Some(handle);
        self.running = true;
        Ok(())
    }

    /// Run one cycle on the calling thread.
    ///
    /// Returns `false` when nothing was published: the worker thread owns
    /// the pipeline, the loop was stopped, or the source is exhausted. A
    /// failed grab still returns `true`, since it is published and counts
    /// toward losing the surface.
    pub fn work(&mut self) -> bool {
        match self.pipeline.get_mut() {
            Some(pipeline) => matches!(
                pipeline.cycle(&self.shared, &self.stop),
                CycleStatus::Published { .. }
            ),
            _ => false,
        }
    }

    /// Ask the worker to exit after its current cycle, without waiting.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop acquisition and join the worker. The published state is kept
    /// and [`start`](Self::start) may be called again.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(pipeline) => {
                    *self.pipeline.get_mut() = Some(pipeline);
                    self.log.info(format_args!("capture worker stopped"));
                }
                Err(_) => self.log.error(format_args!("capture worker panicked")),
            }
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Latest published (undistorted) frame.
    pub fn image(&self) -> Option<Arc<Frame>> {
        self.shared.frame()
    }

    /// `projection × camera-to-game homography` of the committed surface,
    /// `None` while searching.
    pub fn transform_matrix(&self, projection: &Matrix4<f64>) -> Option<Matrix4<f64>> {
        self.transform(projection).map(|t| t.matrix)
    }

    /// Like [`transform_matrix`](Self::transform_matrix), keeping the
    /// homography and the staleness flag.
    pub fn transform(&self, projection: &Matrix4<f64>) -> Option<TransformMatrix> {
        self.shared.surface().map(|surface| TransformMatrix {
            matrix: compose(
                projection,
                &homography_to_matrix4(&surface.transform.camera_to_game),
            ),
            ..surface.transform
        })
    }

    pub fn has_chosen(&self) -> bool {
        self.shared.state() == SurfaceState::Chosen
    }

    pub fn is_lost(&self) -> bool {
        self.shared.state() == SurfaceState::Lost
    }

    pub fn surface_state(&self) -> SurfaceState {
        self.shared.state()
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.shared.snapshot()
    }

    /// Horizontal field of view, radians.
    pub fn fov(&self) -> f64 {
        self.shared.fov()
    }

    pub fn set_fov(&self, fov: f64) {
        self.shared.set_fov(fov);
    }

    /// `(capture_width / 2) / tan(fov / 2)`; zero before the first frame.
    pub fn pixel_distance(&self) -> f64 {
        self.shared.pixel_distance()
    }

    pub fn shortest_game_line(&self) -> GameLine {
        self.shared.shortest_game_line()
    }

    pub fn set_shortest_game_line(&self, line: GameLine) {
        self.shared.set_shortest_game_line(line);
    }

    /// The shortest game line stretched to the game length of the longest
    /// camera edge of the committed surface.
    pub fn calculated_longest_game_line(&self) -> Option<GameLine> {
        let (surface, line) = self.shared.surface_and_game_line();
        surface.map(|s| s.geometry.calculated_longest_game_line(&line))
    }

    /// Game units per camera pixel along the shortest edge.
    pub fn game_scale(&self) -> Option<f64> {
        let (surface, line) = self.shared.surface_and_game_line();
        surface.map(|s| s.geometry.game_scale(&line))
    }

    pub fn capture_size(&self) -> Option<(usize, usize)> {
        self.shared.capture_size()
    }

    /// Commit the current candidate while searching, or release the
    /// committed surface. Returns the resulting state.
    pub fn confirm_surface(&self) -> SurfaceState {
        if let Some(t) = self.shared.confirm() {
            self.log
                .info(format_args!("surface {:?} -> {:?} (confirmed)", t.from, t.to));
        }
        self.shared.state()
    }

    /// Drop the committed surface and search again.
    pub fn reset(&self) {
        if let Some(t) = self.shared.reset() {
            self.log
                .info(format_args!("surface {:?} -> {:?} (reset)", t.from, t.to));
        }
    }

    /// The latest frame warped onto the game rectangle.
    ///
    /// `size` defaults to `target_resolution`. Runs on the caller's thread.
    pub fn surface_image(&self, size: Option<(usize, usize)>) -> Option<Frame> {
        let (frame, surface) = self.shared.frame_and_surface();
        let (frame, surface) = (frame?, surface?);
        let [target_w, target_h] = self.config.target_resolution;
        let (out_w, out_h) = size.unwrap_or((target_w, target_h));
        if out_w == 0 || out_h == 0 {
            return None;
        }
        let game_to_camera = surface.transform.game_to_camera()?;
        let scale = Matrix3::new(
            target_w as f64 / out_w as f64, 0.0, 0.0, //
            0.0, target_h as f64 / out_h as f64, 0.0, //
            0.0, 0.0, 1.0,
        );
        let h_src_from_dst = Homography::new(game_to_camera.h * scale);
        Some(warp_perspective(&frame, h_src_from_dst, out_w, out_h))
    }

    /// Camera pixels → game coordinates through the committed surface.
    pub fn map_to_surface(&self, points: &[Point2<f64>]) -> Option<Vec<Point2<f64>>> {
        let h = self.shared.surface()?.transform.camera_to_game;
        points.iter().map(|p| h.try_apply(*p)).collect()
    }

    /// Game coordinates → camera pixels through the committed surface.
    pub fn map_from_surface(&self, points: &[Point2<f64>]) -> Option<Vec<Point2<f64>>> {
        let h = self.shared.surface()?.transform.game_to_camera()?;
        points.iter().map(|p| h.try_apply(*p)).collect()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLoop")
            .field("config", &self.config)
            .field("running", &self.running)
            .field("threaded", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}
