//! Canonical ordering of the four surface corners.
//!
//! Candidates are sorted by their angle around a centroid. In image
//! coordinates (y down) ascending `atan2` angle walks the quadrilateral
//! top-left → top-right → bottom-right → bottom-left. The cycle is then
//! rotated so it starts at the corner closest to the image origin, which
//! keeps the labelling stable when the table is slightly rotated.

use crate::{segment_cross, GeometryError, Segment};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Four corners in canonical cyclic order: TL, TR, BR, BL.
///
/// Only produced by [`CornerOrderer`], so the order and the
/// non-self-intersection invariant always hold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderedCorners {
    pub(crate) points: [Point2<f64>; 4],
}

impl OrderedCorners {
    #[inline]
    pub fn points(&self) -> &[Point2<f64>; 4] {
        &self.points
    }

    pub fn top_left(&self) -> Point2<f64> {
        self.points[0]
    }

    pub fn top_right(&self) -> Point2<f64> {
        self.points[1]
    }

    pub fn bottom_right(&self) -> Point2<f64> {
        self.points[2]
    }

    pub fn bottom_left(&self) -> Point2<f64> {
        self.points[3]
    }

    /// The four boundary segments, `i -> i+1` with wrap-around.
    pub fn edges(&self) -> [Segment; 4] {
        std::array::from_fn(|i| Segment::new(self.points[i], self.points[(i + 1) % 4]))
    }

    /// `TL -> BR` and `TR -> BL`.
    pub fn diagonals(&self) -> [Segment; 2] {
        [
            Segment::new(self.points[0], self.points[2]),
            Segment::new(self.points[1], self.points[3]),
        ]
    }
}

/// Corner candidates before and after ordering.
#[derive(Clone, Debug, PartialEq)]
pub enum CornerSet {
    /// Raw detector output, any count.
    Unvalidated(Vec<Point2<f64>>),
    /// Exactly four corners in canonical order.
    Ordered(OrderedCorners),
}

impl CornerSet {
    pub fn len(&self) -> usize {
        match self {
            CornerSet::Unvalidated(points) => points.len(),
            CornerSet::Ordered(_) => 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> &[Point2<f64>] {
        match self {
            CornerSet::Unvalidated(points) => points,
            CornerSet::Ordered(ordered) => ordered.points(),
        }
    }

    /// Order an unvalidated set; an already ordered set is returned as is.
    pub fn into_ordered(self, orderer: &CornerOrderer) -> Result<OrderedCorners, GeometryError> {
        match self {
            CornerSet::Unvalidated(points) => orderer.order(&points, None),
            CornerSet::Ordered(ordered) => Ok(ordered),
        }
    }
}

/// Mean of the points, or `None` for an empty slice.
pub fn centroid(points: &[Point2<f64>]) -> Option<Point2<f64>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point2::new(sx / n, sy / n))
}

fn ambiguous(reason: impl Into<String>) -> GeometryError {
    GeometryError::AmbiguousCorners {
        reason: reason.into(),
    }
}

/// Sort exactly four candidates around `center`.
///
/// Two candidates whose angles around `center` differ by less than
/// `angle_epsilon` radians (the wrap-around gap included) make the order
/// ambiguous; the cycle is rejected rather than tie-broken.
pub fn order_corners(
    candidates: &[Point2<f64>],
    center: Point2<f64>,
    angle_epsilon: f64,
) -> Result<OrderedCorners, GeometryError> {
    if candidates.len() < 4 {
        return Err(GeometryError::InsufficientCorners {
            found: candidates.len(),
        });
    }
    if candidates.len() > 4 {
        return Err(ambiguous(format!(
            "{} candidates, expected exactly 4",
            candidates.len()
        )));
    }

    let mut by_angle: Vec<(f64, Point2<f64>)> = Vec::with_capacity(4);
    for &p in candidates {
        let d = p - center;
        if d.norm() <= 1e-9 {
            return Err(ambiguous("candidate coincides with the centroid"));
        }
        by_angle.push((d.y.atan2(d.x), p));
    }
    by_angle.sort_by(|a, b| a.0.total_cmp(&b.0));

    for i in 0..4 {
        let gap = if i == 3 {
            by_angle[0].0 + TAU - by_angle[3].0
        } else {
            by_angle[i + 1].0 - by_angle[i].0
        };
        if gap < angle_epsilon {
            return Err(ambiguous(format!(
                "angular gap {gap:.2e} rad below epsilon {angle_epsilon:.2e}"
            )));
        }
    }

    let start = (0..4)
        .min_by(|&a, &b| {
            let ka = by_angle[a].1.x + by_angle[a].1.y;
            let kb = by_angle[b].1.x + by_angle[b].1.y;
            ka.total_cmp(&kb)
        })
        .unwrap_or(0);
    let points: [Point2<f64>; 4] = std::array::from_fn(|i| by_angle[(start + i) % 4].1);
    let ordered = OrderedCorners { points };

    let [e0, e1, e2, e3] = ordered.edges();
    if segment_cross(&e0, &e2).is_some() || segment_cross(&e1, &e3).is_some() {
        return Err(ambiguous("ordered corners form a self-intersecting quad"));
    }

    Ok(ordered)
}

/// Angle-around-centroid corner sorter with an explicit ambiguity threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerOrderer {
    /// Minimum angular separation (radians) between neighbouring corners.
    pub angle_epsilon: f64,
}

impl Default for CornerOrderer {
    fn default() -> Self {
        Self {
            angle_epsilon: 1e-3,
        }
    }
}

impl CornerOrderer {
    pub fn new(angle_epsilon: f64) -> Self {
        Self { angle_epsilon }
    }

    /// Order `candidates` around `center`, or around their mean when `None`.
    pub fn order(
        &self,
        candidates: &[Point2<f64>],
        center: Option<Point2<f64>>,
    ) -> Result<OrderedCorners, GeometryError> {
        let center = match center {
            Some(c) => c,
            None => centroid(candidates).ok_or(GeometryError::InsufficientCorners { found: 0 })?,
        };
        order_corners(candidates, center, self.angle_epsilon)
    }
}
