use approx::assert_relative_eq;
use log::{Level, Log, Metadata, Record};
use nalgebra::{Matrix4, Point2, Vector4};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use surface_capture::core::{
    CameraIntrinsics, Frame, GeometryError, LensModel, PixelFormat, RadialTangentialDistortion,
};
use surface_capture::{
    CaptureConfig, CaptureLoop, ChannelSource, CycleError, LensCalibration, SourceError,
    SurfaceState,
};

const WIDTH: usize = 160;
const HEIGHT: usize = 100;

#[derive(Default)]
struct CapturingLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl CapturingLogger {
    fn messages(&self, level: Level) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

/// A frame whose every byte is `value`.
fn uniform_frame(value: u8) -> Frame {
    Frame::new(
        WIDTH,
        HEIGHT,
        PixelFormat::Gray8,
        vec![value; WIDTH * HEIGHT],
    )
    .expect("frame")
}

/// Marker corners shifted right by the frame's pixel value, shuffled.
fn shifted_rect(frame: &Frame) -> Vec<Point2<f64>> {
    let k = frame.data[0] as f64;
    vec![
        Point2::new(110.0 + k, 80.0),
        Point2::new(10.0 + k, 10.0),
        Point2::new(110.0 + k, 10.0),
        Point2::new(10.0 + k, 80.0),
    ]
}

fn counting_source(modulo: u8) -> impl FnMut() -> Result<Frame, SourceError> + Send {
    let mut i = 0u32;
    move || {
        let frame = uniform_frame((i % modulo as u32) as u8);
        i += 1;
        Ok(frame)
    }
}

fn cooperative() -> CaptureConfig {
    CaptureConfig {
        run_on_own_thread: false,
        target_resolution: [400, 280],
        ..CaptureConfig::default()
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn fewer_than_four_markers_never_choose_a_surface() {
    let detector = |frame: &Frame| {
        let mut pts = shifted_rect(frame);
        pts.pop();
        pts
    };
    let mut capture = CaptureLoop::new(cooperative(), counting_source(20), detector).expect("loop");
    capture.start().expect("start");

    for _ in 0..50 {
        assert!(capture.work());
        assert_eq!(capture.surface_state(), SurfaceState::Searching);
    }
    assert!(!capture.has_chosen());
    assert!(capture.transform_matrix(&Matrix4::identity()).is_none());
    assert_eq!(
        capture.snapshot().last_error,
        Some(CycleError::Geometry(GeometryError::InsufficientCorners {
            found: 3
        }))
    );
    assert!(capture.image().is_some());
}

#[test]
fn acquisition_failures_lose_the_surface_exactly_once() {
    let logger = Arc::new(CapturingLogger::default());
    let mut good = counting_source(1);
    let mut served = 0;
    let source = move || -> Result<Frame, SourceError> {
        served += 1;
        if served <= 3 {
            good()
        } else {
            Err(SourceError::Disconnected)
        }
    };
    let config = CaptureConfig {
        lost_threshold_cycles: 5,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, source, shifted_rect)
        .expect("loop")
        .with_logger(logger.clone());
    capture.start().expect("start");

    for _ in 0..3 {
        capture.work();
    }
    assert!(capture.has_chosen());

    let mut states = Vec::new();
    for _ in 0..20 {
        capture.work();
        states.push(capture.surface_state());
    }
    assert!(states[..3].iter().all(|s| *s == SurfaceState::Chosen));
    assert_eq!(states[4], SurfaceState::Lost);
    assert!(capture.is_lost());

    let lost: Vec<_> = logger
        .messages(Level::Warn)
        .into_iter()
        .filter(|m| m.contains("-> Lost"))
        .collect();
    assert_eq!(lost.len(), 1);

    let frozen = capture.transform(&Matrix4::identity()).expect("kept transform");
    assert!(frozen.stale);
    assert_eq!(capture.snapshot().frame_id, 3);
}

/// A frame whose buffer is far shorter than its declared size.
fn truncated_frame() -> Frame {
    Frame {
        width: WIDTH,
        height: HEIGHT,
        format: PixelFormat::Gray8,
        data: vec![7; 10],
    }
}

fn barrel_lens() -> LensCalibration {
    LensCalibration::new(LensModel {
        intrinsics: CameraIntrinsics {
            fx: 150.0,
            fy: 150.0,
            cx: 80.0,
            cy: 50.0,
        },
        distortion: RadialTangentialDistortion {
            k1: -0.1,
            ..RadialTangentialDistortion::default()
        },
    })
    .expect("calibration")
}

#[test]
fn malformed_frames_are_skipped_and_count_toward_lost() {
    let mut good = counting_source(1);
    let mut served = 0;
    let source = move || -> Result<Frame, SourceError> {
        served += 1;
        match served {
            1 | 2 => good(),
            n if n % 2 == 1 => Ok(Frame::blank(0, HEIGHT, PixelFormat::Gray8)),
            _ => Ok(truncated_frame()),
        }
    };
    let config = CaptureConfig {
        lost_threshold_cycles: 4,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, source, shifted_rect)
        .expect("loop")
        .with_calibration(barrel_lens());
    capture.start().expect("start");

    capture.work();
    capture.work();
    assert!(capture.has_chosen());
    let last_good = capture.image().expect("frame");

    for _ in 0..4 {
        assert!(capture.work());
    }
    assert!(capture.is_lost());

    let snap = capture.snapshot();
    assert_eq!(snap.frame_id, 2);
    assert_eq!(snap.cycles, 6);
    assert!(matches!(
        snap.last_error,
        Some(CycleError::AcquisitionFailure(ref msg)) if msg.contains("buffer")
    ));
    assert!(Arc::ptr_eq(&snap.frame.expect("frame"), &last_good));
}

#[test]
fn malformed_frames_never_choose_a_surface() {
    let source = || -> Result<Frame, SourceError> { Ok(truncated_frame()) };
    let detector = |_: &Frame| shifted_rect(&uniform_frame(0));
    let mut capture = CaptureLoop::new(cooperative(), source, detector).expect("loop");
    capture.start().expect("start");

    for _ in 0..10 {
        capture.work();
        assert_eq!(capture.surface_state(), SurfaceState::Searching);
    }
    assert!(capture.image().is_none());
    assert_eq!(capture.snapshot().frame_id, 0);
    assert_eq!(capture.snapshot().cycles, 10);
}

#[test]
fn work_stops_when_the_source_is_exhausted() {
    let mut good = counting_source(1);
    let mut remaining = 3;
    let source = move || -> Result<Frame, SourceError> {
        if remaining == 0 {
            return Err(SourceError::Exhausted);
        }
        remaining -= 1;
        good()
    };
    let mut capture = CaptureLoop::new(cooperative(), source, shifted_rect).expect("loop");
    capture.start().expect("start");

    let mut cycles = 0;
    while capture.work() {
        cycles += 1;
        assert!(cycles <= 3, "exhausted source kept publishing");
    }
    assert_eq!(cycles, 3);
    assert!(!capture.work());

    let snap = capture.snapshot();
    assert_eq!(snap.cycles, 3);
    assert_eq!(snap.consecutive_failures, 0);
    assert_eq!(snap.last_error, None);
    assert!(capture.has_chosen());
}

#[test]
fn rejection_details_reach_the_injected_logger() {
    let logger = Arc::new(CapturingLogger::default());
    let config = CaptureConfig {
        expected_aspect_ratio: Some(0.2),
        aspect_tolerance: 0.01,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, counting_source(1), shifted_rect)
        .expect("loop")
        .with_logger(logger.clone());
    capture.start().expect("start");
    capture.work();

    assert_eq!(capture.surface_state(), SurfaceState::Searching);
    let debug = logger.messages(Level::Debug);
    assert!(
        debug.iter().any(|m| m.contains("edge ratio 0.700 outside 0.200")),
        "{debug:?}"
    );
}

#[test]
fn lost_surface_recovers_when_markers_return() {
    let mut i = 0;
    let source = move || -> Result<Frame, SourceError> {
        i += 1;
        Ok(uniform_frame(if (3..6).contains(&i) { 255 } else { 1 }))
    };
    // Value 255 pushes the right edge far enough to break the aspect check.
    let config = CaptureConfig {
        lost_threshold_cycles: 2,
        expected_aspect_ratio: Some(0.7),
        aspect_tolerance: 0.05,
        ..cooperative()
    };
    let detector = |frame: &Frame| {
        if frame.data[0] == 255 {
            vec![
                Point2::new(10.0, 10.0),
                Point2::new(400.0, 10.0),
                Point2::new(400.0, 80.0),
                Point2::new(10.0, 80.0),
            ]
        } else {
            shifted_rect(frame)
        }
    };
    let mut capture = CaptureLoop::new(config, source, detector).expect("loop");
    capture.start().expect("start");

    let states: Vec<_> = (0..7)
        .map(|_| {
            capture.work();
            capture.surface_state()
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SurfaceState::Chosen,
            SurfaceState::Chosen,
            SurfaceState::Chosen,
            SurfaceState::Lost,
            SurfaceState::Lost,
            SurfaceState::Chosen,
            SurfaceState::Chosen,
        ]
    );
    assert!(!capture.transform(&Matrix4::identity()).expect("t").stale);
}

#[test]
fn missing_calibration_is_logged_once() {
    let logger = Arc::new(CapturingLogger::default());
    let mut capture = CaptureLoop::new(cooperative(), counting_source(10), shifted_rect)
        .expect("loop")
        .with_logger(logger.clone());
    capture.start().expect("start");
    for _ in 0..10 {
        capture.work();
    }
    let warnings: Vec<_> = logger
        .messages(Level::Warn)
        .into_iter()
        .filter(|m| m.contains("calibration"))
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(capture.snapshot().frame_id, 10);
}

#[test]
fn threaded_and_cooperative_modes_publish_identical_state() {
    const FRAMES: u8 = 12;
    // Frames 2, 6 and 10 lose markers.
    let detector = |frame: &Frame| {
        let mut pts = shifted_rect(frame);
        if frame.data[0] % 4 == 2 {
            pts.truncate(2);
        }
        pts
    };
    let config = CaptureConfig {
        lost_threshold_cycles: 2,
        detection_interval: 2,
        ..cooperative()
    };

    let mut cooperative_loop =
        CaptureLoop::new(config.clone(), counting_source(FRAMES), detector).expect("loop");
    cooperative_loop.start().expect("start");
    for _ in 0..FRAMES {
        assert!(cooperative_loop.work());
    }
    let expected = cooperative_loop.snapshot();

    let (tx, rx) = mpsc::channel();
    let source = ChannelSource::new(rx, Duration::from_secs(10));
    let threaded_config = CaptureConfig {
        run_on_own_thread: true,
        ..config
    };
    let mut threaded = CaptureLoop::new(threaded_config, source, detector).expect("loop");
    threaded.start().expect("start");
    assert!(!threaded.work(), "worker owns the pipeline");
    for value in 0..FRAMES {
        tx.send(uniform_frame(value)).expect("send");
    }
    assert!(wait_until(Duration::from_secs(10), || {
        threaded.snapshot().frame_id == u64::from(FRAMES)
    }));
    threaded.request_stop();
    drop(tx);
    threaded.stop();

    assert_eq!(threaded.snapshot(), expected);
}

#[test]
fn readers_never_see_a_frame_paired_with_another_cycles_surface() {
    let config = CaptureConfig {
        run_on_own_thread: true,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, counting_source(60), shifted_rect).expect("loop");
    capture.start().expect("start");
    let capture = Arc::new(Mutex::new(capture));
    let done = Arc::new(AtomicBool::new(false));

    // Readers only take `&CaptureLoop`; the mutex here just shares the
    // owner with the test thread.
    let snapshot_reader = {
        let capture = Arc::clone(&capture);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut checked = 0;
            while !done.load(Ordering::Acquire) {
                let snap = capture.lock().snapshot();
                if let (Some(frame), Some(surface)) = (snap.frame, snap.surface) {
                    let value = frame.data[0];
                    assert!(frame.data.iter().all(|&b| b == value), "torn frame");
                    let tl = surface.geometry.corners.top_left();
                    assert_relative_eq!(tl.x, 10.0 + value as f64);
                    checked += 1;
                }
            }
            checked
        })
    };

    thread::sleep(Duration::from_millis(200));
    done.store(true, Ordering::Release);
    let checked = snapshot_reader.join().expect("reader");
    capture.lock().stop();
    assert!(checked > 0);
    assert!(capture.lock().snapshot().frame_id > 1);
}

#[test]
fn concurrent_image_readers_get_whole_frames() {
    let config = CaptureConfig {
        run_on_own_thread: true,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, counting_source(250), shifted_rect).expect("loop");
    capture.start().expect("start");
    let capture = Arc::new(capture);
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let capture = Arc::clone(&capture);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut reads = 0usize;
                while !stop.load(Ordering::Acquire) {
                    if let Some(frame) = capture.image() {
                        let value = frame.data[0];
                        assert!(frame.data.iter().all(|&b| b == value), "torn frame");
                        reads += 1;
                    }
                    let _ = capture.transform_matrix(&Matrix4::identity());
                }
                reads
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(150));
    stop.store(true, Ordering::Release);
    for reader in readers {
        assert!(reader.join().expect("reader") > 0);
    }
    // Dropping the last handle joins the worker.
    drop(capture);
}

#[test]
fn start_twice_is_a_no_op_and_stop_allows_restart() {
    let config = CaptureConfig {
        run_on_own_thread: true,
        frame_interval_ms: 2,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, counting_source(5), shifted_rect).expect("loop");
    capture.start().expect("start");
    capture.start().expect("second start");
    assert!(capture.is_running());
    assert!(wait_until(Duration::from_secs(5), || capture.snapshot().frame_id >= 2));

    capture.stop();
    assert!(!capture.is_running());
    let after_stop = capture.snapshot().frame_id;
    thread::sleep(Duration::from_millis(20));
    assert_eq!(capture.snapshot().frame_id, after_stop);

    capture.start().expect("restart");
    assert!(wait_until(Duration::from_secs(5), || {
        capture.snapshot().frame_id > after_stop
    }));
}

#[test]
fn detection_runs_on_the_configured_cadence() {
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = {
        let calls = Arc::clone(&calls);
        move |frame: &Frame| {
            calls.fetch_add(1, Ordering::Relaxed);
            shifted_rect(frame)
        }
    };
    let config = CaptureConfig {
        detection_interval: 3,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, counting_source(10), detector).expect("loop");
    for _ in 0..10 {
        capture.work();
    }
    assert_eq!(calls.load(Ordering::Relaxed), 4);
    assert_eq!(capture.snapshot().frame_id, 10);
}

#[test]
fn frame_sink_sees_every_published_frame() {
    let pushed = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let pushed = Arc::clone(&pushed);
        move |frame: &Arc<Frame>, state: SurfaceState| pushed.lock().push((frame.data[0], state))
    };
    let mut capture = CaptureLoop::new(cooperative(), counting_source(3), shifted_rect)
        .expect("loop")
        .with_sink(sink);
    for _ in 0..3 {
        capture.work();
    }
    assert_eq!(
        *pushed.lock(),
        vec![
            (0, SurfaceState::Chosen),
            (1, SurfaceState::Chosen),
            (2, SurfaceState::Chosen)
        ]
    );
}

#[test]
fn transform_maps_markers_onto_the_game_rectangle() {
    let mut capture =
        CaptureLoop::new(cooperative(), counting_source(1), shifted_rect).expect("loop");
    capture.work();

    let corners = [
        Point2::new(10.0, 10.0),
        Point2::new(110.0, 10.0),
        Point2::new(110.0, 80.0),
        Point2::new(10.0, 80.0),
    ];
    let game = capture.map_to_surface(&corners).expect("mapped");
    let expected = [(0.0, 0.0), (400.0, 0.0), (400.0, 280.0), (0.0, 280.0)];
    for (p, (x, y)) in game.iter().zip(expected) {
        assert_relative_eq!(p.x, x, epsilon = 1e-6);
        assert_relative_eq!(p.y, y, epsilon = 1e-6);
    }
    let back = capture.map_from_surface(&game).expect("inverse");
    for (p, q) in back.iter().zip(corners) {
        assert_relative_eq!(p.x, q.x, epsilon = 1e-6);
        assert_relative_eq!(p.y, q.y, epsilon = 1e-6);
    }

    let projection = Matrix4::new_scaling(0.5);
    let bare = capture.transform_matrix(&Matrix4::identity()).expect("h");
    let composed = capture.transform_matrix(&projection).expect("p*h");
    let v = Vector4::new(60.0, 45.0, 0.0, 1.0);
    assert_relative_eq!(composed * v, projection * (bare * v), epsilon = 1e-9);
}

#[test]
fn surface_image_warps_the_latest_frame() {
    let mut capture =
        CaptureLoop::new(cooperative(), counting_source(1), shifted_rect).expect("loop");
    assert!(capture.surface_image(None).is_none());
    capture.work();

    let full = capture.surface_image(None).expect("surface image");
    assert_eq!(full.size(), (400, 280));
    let small = capture.surface_image(Some((40, 28))).expect("small");
    assert_eq!(small.size(), (40, 28));
    assert_eq!(small.format, PixelFormat::Gray8);
}

#[test]
fn manual_confirmation_commits_and_releases() {
    let config = CaptureConfig {
        auto_choose: false,
        ..cooperative()
    };
    let mut capture = CaptureLoop::new(config, counting_source(4), shifted_rect).expect("loop");
    capture.work();
    assert_eq!(capture.surface_state(), SurfaceState::Searching);
    assert!(capture.transform_matrix(&Matrix4::identity()).is_none());

    assert_eq!(capture.confirm_surface(), SurfaceState::Chosen);
    assert!(capture.has_chosen());
    assert!(capture.transform_matrix(&Matrix4::identity()).is_some());

    assert_eq!(capture.confirm_surface(), SurfaceState::Searching);
    capture.work();
    assert_eq!(capture.surface_state(), SurfaceState::Searching);

    capture.confirm_surface();
    capture.reset();
    assert_eq!(capture.surface_state(), SurfaceState::Searching);
    assert!(capture.transform_matrix(&Matrix4::identity()).is_none());
}

#[test]
fn scalar_settings_and_derived_values() {
    let mut capture =
        CaptureLoop::new(cooperative(), counting_source(1), shifted_rect).expect("loop");
    assert_eq!(capture.pixel_distance(), 0.0);
    assert!(capture.calculated_longest_game_line().is_none());
    capture.work();

    assert_eq!(capture.capture_size(), Some((WIDTH, HEIGHT)));
    capture.set_fov(std::f64::consts::FRAC_PI_2);
    assert_relative_eq!(capture.fov(), std::f64::consts::FRAC_PI_2);
    assert_relative_eq!(capture.pixel_distance(), WIDTH as f64 / 2.0, epsilon = 1e-9);

    let line = surface_capture::core::GameLine::new(Point2::origin(), Point2::new(7.0, 0.0));
    capture.set_shortest_game_line(line);
    assert_eq!(capture.shortest_game_line(), line);
    // Camera edges are 100 and 70 px.
    assert_relative_eq!(capture.game_scale().expect("scale"), 0.1, epsilon = 1e-12);
    let longest = capture.calculated_longest_game_line().expect("longest");
    assert_relative_eq!(longest.length(), 10.0, epsilon = 1e-9);
}
