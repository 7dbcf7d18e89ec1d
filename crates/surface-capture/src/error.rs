use surface_capture_core::{FrameError, GeometryError};

/// Why one capture cycle produced no usable surface.
///
/// Cycle errors never leave the loop: they are logged, counted toward
/// [`SurfaceState::Lost`](crate::SurfaceState::Lost) and the next cycle
/// starts from scratch.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    #[error("frame acquisition failed: {0}")]
    AcquisitionFailure(String),
    #[error("no lens calibration available")]
    CalibrationMissing,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl From<SourceError> for CycleError {
    fn from(err: SourceError) -> Self {
        CycleError::AcquisitionFailure(err.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("frame source is exhausted")]
    Exhausted,
    #[error("frame source is disconnected")]
    Disconnected,
    #[error("no frame within {0:?}")]
    Timeout(std::time::Duration),
    #[error("source produced an empty frame")]
    EmptyFrame,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "image")]
    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("invalid camera intrinsics (fx and fy must be finite and positive)")]
    InvalidIntrinsics,
    #[error("frame is {got_width}x{got_height}, calibration expects {width}x{height}")]
    SizeMismatch {
        width: usize,
        height: usize,
        got_width: usize,
        got_height: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
