//! Marker detection adapters.

use crate::ConfigError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fs, path::Path};
use surface_capture_core::{CornerSet, Frame, GeometryError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Finds fiducial marker centres in a rectified frame.
///
/// Implementations may return any number of points, in any order; ordering
/// and validation happen downstream.
pub trait MarkerDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Vec<Point2<f64>>;
}

impl<F> MarkerDetector for F
where
    F: FnMut(&Frame) -> Vec<Point2<f64>> + Send,
{
    fn detect(&mut self, frame: &Frame) -> Vec<Point2<f64>> {
        self(frame)
    }
}

/// Runs the detector and enforces the minimum candidate count.
pub struct CornerLocator {
    detector: Box<dyn MarkerDetector>,
}

impl CornerLocator {
    pub fn new(detector: Box<dyn MarkerDetector>) -> Self {
        Self { detector }
    }

    /// Candidate corners for `frame`, still unordered.
    ///
    /// Fewer than four candidates is [`GeometryError::InsufficientCorners`];
    /// missing corners are never synthesized.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn locate(&mut self, frame: &Frame) -> Result<CornerSet, GeometryError> {
        let points = self.detector.detect(frame);
        if points.len() < 4 {
            return Err(GeometryError::InsufficientCorners {
                found: points.len(),
            });
        }
        Ok(CornerSet::Unvalidated(points))
    }
}

impl std::fmt::Debug for CornerLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CornerLocator").finish_non_exhaustive()
    }
}

/// Detections captured offline, replayed one entry per detection call.
///
/// Used to rerun a recorded session without the marker detector. Once the
/// recording is exhausted every call returns no points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordedDetector {
    detections: VecDeque<Vec<Point2<f64>>>,
}

impl RecordedDetector {
    pub fn new(detections: Vec<Vec<Point2<f64>>>) -> Self {
        Self {
            detections: detections.into(),
        }
    }

    /// Load a JSON array of per-frame point lists, e.g.
    /// `[[[10, 10], [90, 12], [88, 70], [12, 68]], []]`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn remaining(&self) -> usize {
        self.detections.len()
    }
}

impl MarkerDetector for RecordedDetector {
    fn detect(&mut self, _frame: &Frame) -> Vec<Point2<f64>> {
        self.detections.pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surface_capture_core::PixelFormat;

    fn frame() -> Frame {
        Frame::blank(4, 4, PixelFormat::Gray8)
    }

    #[test]
    fn three_points_are_insufficient() {
        let mut locator = CornerLocator::new(Box::new(|_: &Frame| {
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
            ]
        }));
        assert_eq!(
            locator.locate(&frame()).unwrap_err(),
            GeometryError::InsufficientCorners { found: 3 }
        );
    }

    #[test]
    fn extra_points_are_passed_through_unvalidated() {
        let pts: Vec<Point2<f64>> = (0..5).map(|i| Point2::new(i as f64, 0.0)).collect();
        let expected = pts.clone();
        let mut locator = CornerLocator::new(Box::new(move |_: &Frame| pts.clone()));
        assert_eq!(
            locator.locate(&frame()).expect("candidates"),
            CornerSet::Unvalidated(expected)
        );
    }

    #[test]
    fn recorded_detector_replays_in_order() {
        let mut recorded: RecordedDetector =
            serde_json::from_str("[[[1, 2]], [], [[3, 4], [5, 6]]]").expect("parse");
        assert_eq!(recorded.remaining(), 3);
        assert_eq!(recorded.detect(&frame()), vec![Point2::new(1.0, 2.0)]);
        assert!(recorded.detect(&frame()).is_empty());
        assert_eq!(recorded.detect(&frame()).len(), 2);
        assert!(recorded.detect(&frame()).is_empty());
    }
}
