//! Edge analysis of an ordered surface quadrilateral.
//!
//! Two ratios come out of this module and they mean different things:
//! - [`SurfaceGeometry::edge_ratio`] is shortest/longest camera edge and only
//!   validates the detection against the expected table aspect;
//! - [`SurfaceGeometry::game_scale`] converts camera pixels into game units
//!   through the configured shortest game line.

use crate::{segment_cross, GameLine, GeometryError, OrderedCorners, Segment};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Why a quadrilateral was rejected.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DegenerateKind {
    #[error("edge {index} is shorter than {min_length} px")]
    ShortEdge { index: usize, min_length: f64 },
    #[error("diagonals do not intersect inside the quad (not convex)")]
    NotConvex,
    #[error("edge ratio {ratio:.3} outside {expected:.3} ± {tolerance:.3}")]
    AspectOutOfTolerance {
        ratio: f64,
        expected: f64,
        tolerance: f64,
    },
    #[error("homography is singular")]
    SingularHomography,
}

/// One boundary edge of the ordered quad; `index` 0 is TL→TR.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub index: usize,
    pub segment: Segment,
    pub length: f64,
}

/// Axis-aligned bounds in camera pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl BoundingBox {
    pub fn from_points(points: &[Point2<f64>]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points.iter().fold((first, first), |(lo, hi), p| {
            (
                Point2::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point2::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        });
        Some(Self { min, max })
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, p: Point2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Measurements of a validated surface quad.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceGeometry {
    pub corners: OrderedCorners,
    pub edges: [Edge; 4],
    pub shortest: Edge,
    pub longest: Edge,
    /// `shortest.length / longest.length`, in `(0, 1]`.
    pub edge_ratio: f64,
    pub bounding_box: BoundingBox,
    /// Intersection of the diagonals.
    pub center: Point2<f64>,
}

impl SurfaceGeometry {
    /// Game units per camera pixel along the shortest edge.
    pub fn game_scale(&self, shortest_game_line: &GameLine) -> f64 {
        shortest_game_line.length() / self.shortest.length
    }

    /// The game line stretched to the game-space length of the longest edge.
    pub fn calculated_longest_game_line(&self, shortest_game_line: &GameLine) -> GameLine {
        shortest_game_line.with_length(shortest_game_line.length() / self.edge_ratio)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerParams {
    /// Expected shortest/longest edge ratio of the table as seen by the
    /// camera. `None` accepts any positive ratio.
    pub expected_aspect_ratio: Option<f64>,
    /// Allowed absolute deviation from `expected_aspect_ratio`.
    pub aspect_tolerance: f64,
    /// Edges shorter than this (pixels) reject the quad.
    pub min_edge_length: f64,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        Self {
            expected_aspect_ratio: None,
            aspect_tolerance: 0.25,
            min_edge_length: 4.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GeometryAnalyzer {
    params: AnalyzerParams,
}

impl GeometryAnalyzer {
    pub fn new(params: AnalyzerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AnalyzerParams {
        &self.params
    }

    pub fn analyze(&self, corners: &OrderedCorners) -> Result<SurfaceGeometry, GeometryError> {
        let segments = corners.edges();
        let edges: [Edge; 4] = std::array::from_fn(|index| Edge {
            index,
            segment: segments[index],
            length: segments[index].length(),
        });

        if let Some(short) = edges
            .iter()
            .find(|e| !(e.length >= self.params.min_edge_length) || e.length <= 0.0)
        {
            return Err(GeometryError::DegenerateGeometry(DegenerateKind::ShortEdge {
                index: short.index,
                min_length: self.params.min_edge_length,
            }));
        }

        let shortest = *edges
            .iter()
            .min_by(|a, b| a.length.total_cmp(&b.length))
            .unwrap_or(&edges[0]);
        let longest = *edges
            .iter()
            .max_by(|a, b| a.length.total_cmp(&b.length))
            .unwrap_or(&edges[0]);
        let edge_ratio = shortest.length / longest.length;

        let [d0, d1] = corners.diagonals();
        let center = segment_cross(&d0, &d1)
            .ok_or(GeometryError::DegenerateGeometry(DegenerateKind::NotConvex))?;

        if let Some(expected) = self.params.expected_aspect_ratio {
            let tolerance = self.params.aspect_tolerance;
            if (edge_ratio - expected).abs() > tolerance {
                return Err(GeometryError::DegenerateGeometry(
                    DegenerateKind::AspectOutOfTolerance {
                        ratio: edge_ratio,
                        expected,
                        tolerance,
                    },
                ));
            }
        }

        let bounding_box = BoundingBox::from_points(corners.points())
            .ok_or(GeometryError::InsufficientCorners { found: 0 })?;

        Ok(SurfaceGeometry {
            corners: *corners,
            edges,
            shortest,
            longest,
            edge_ratio,
            bounding_box,
            center,
        })
    }
}
