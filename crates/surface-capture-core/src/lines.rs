//! Segments and the two-line intersection used to validate quadrilaterals.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Below this |det| two lines are treated as parallel.
const PARALLEL_EPS: f64 = 1e-9;

/// A line segment between two points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

/// A reference line in game coordinates (e.g. the shortest table edge as the
/// game sees it).
pub type GameLine = Segment;

impl Segment {
    pub fn new(start: Point2<f64>, end: Point2<f64>) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn direction(&self) -> Vector2<f64> {
        self.end - self.start
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.direction().norm()
    }

    /// The segment scaled about its start point so its length is `length`.
    /// A zero-length segment is returned unchanged.
    pub fn with_length(&self, length: f64) -> Self {
        let len = self.length();
        if len <= f64::EPSILON {
            return *self;
        }
        Self::new(self.start, self.start + self.direction() * (length / len))
    }
}

// Solve start_a + t * da = start_b + u * db; returns (t, u).
fn cross_params(a: &Segment, b: &Segment) -> Option<(f64, f64)> {
    let da = a.direction();
    let db = b.direction();
    let det = da.x * db.y - da.y * db.x;
    let scale = da.norm() * db.norm();
    if scale <= f64::EPSILON || det.abs() <= PARALLEL_EPS * scale {
        return None;
    }
    let w = b.start - a.start;
    let t = (w.x * db.y - w.y * db.x) / det;
    let u = (w.x * da.y - w.y * da.x) / det;
    Some((t, u))
}

/// Intersection of the infinite lines through `a` and `b`.
///
/// Returns `None` when the lines are (nearly) parallel or either segment has
/// zero length.
pub fn compute_cross(a: &Segment, b: &Segment) -> Option<Point2<f64>> {
    let (t, _) = cross_params(a, b)?;
    Some(a.start + a.direction() * t)
}

/// Intersection of the two segments themselves, endpoints included.
pub fn segment_cross(a: &Segment, b: &Segment) -> Option<Point2<f64>> {
    const SLACK: f64 = 1e-12;
    let (t, u) = cross_params(a, b)?;
    let inside = |s: f64| (-SLACK..=1.0 + SLACK).contains(&s);
    (inside(t) && inside(u)).then(|| a.start + a.direction() * t)
}
