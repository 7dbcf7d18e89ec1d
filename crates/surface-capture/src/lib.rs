//! Camera capture loop for a marked play surface.
//!
//! A camera looks at a table with a fiducial marker on each corner. Every
//! cycle the loop grabs a frame, corrects lens distortion, detects the four
//! markers, orders and validates them, and computes the homography from
//! camera pixels to the game rectangle. Renderers read the latest frame and
//! `projection × homography` from any thread.
//!
//! ## Quickstart
//!
//! ```no_run
//! use nalgebra::Matrix4;
//! use surface_capture::{CaptureConfig, CaptureLoop, ImageSequenceSource, RecordedDetector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig {
//!     run_on_own_thread: false,
//!     ..CaptureConfig::default()
//! };
//! let source = ImageSequenceSource::from_dir("session/frames")?;
//! let detector = RecordedDetector::load_json("session/detections.json")?;
//! let mut capture = CaptureLoop::new(config, source, detector)?;
//! capture.start()?;
//! while capture.work() {
//!     if let Some(m) = capture.transform_matrix(&Matrix4::identity()) {
//!         println!("{m}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - [`CaptureLoop`]: the loop and every reader-facing accessor.
//! - [`CaptureConfig`]: JSON configuration.
//! - [`FrameSource`], [`MarkerDetector`], [`CalibrationStore`],
//!   [`FrameSink`]: the collaborators a host plugs in.
//! - [`analyze_corners`]: the geometry stages on a single set of corners.
//! - `surface_capture::core`: geometry primitives.

mod calibration;
mod capture;
mod config;
mod error;
#[cfg(feature = "image")]
mod imageio;
mod locator;
mod logging;
mod report;
mod shared;
mod source;
mod state;
mod undistort;

pub use surface_capture_core as core;

pub use calibration::{CalibrationStore, LensCalibration, LensCalibrationFile};
pub use capture::{CaptureLoop, FrameSink};
pub use config::CaptureConfig;
pub use error::{CalibrationError, ConfigError, CycleError, SourceError};
pub use locator::{CornerLocator, MarkerDetector, RecordedDetector};
pub use logging::{GlobalLogger, LogHandle};
pub use report::{analyze_corners, SnapshotReport, SurfaceReport};
pub use shared::{pixel_distance, SurfaceSnapshot, TrackedSurface};
pub use source::{ChannelSource, FrameSource};
pub use state::{SurfaceState, SurfaceTracker, Transition};
pub use undistort::Undistorter;

#[cfg(feature = "image")]
pub use imageio::{frame_from_image, frame_to_image, load_frame, save_frame};
#[cfg(feature = "image")]
pub use source::ImageSequenceSource;
