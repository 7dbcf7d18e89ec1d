//! One-shot surface analysis and JSON reports.

use crate::shared::TrackedSurface;
use crate::{CaptureConfig, SurfaceSnapshot, SurfaceState};
use nalgebra::{Matrix4, Point2};
use serde::Serialize;
use surface_capture_core::{GameLine, GeometryAnalyzer, GeometryError, TransformBuilder};

/// Order, validate and map four corner candidates without a capture loop.
pub fn analyze_corners(
    candidates: &[Point2<f64>],
    config: &CaptureConfig,
) -> Result<TrackedSurface, GeometryError> {
    let corners = config.corner_orderer().order(candidates, None)?;
    let geometry = GeometryAnalyzer::new(config.analyzer_params()).analyze(&corners)?;
    let transform = TransformBuilder::new(config.target_rect())
        .build(Some(&geometry.corners), &Matrix4::identity())?;
    Ok(TrackedSurface {
        geometry,
        transform,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceReport {
    /// TL, TR, BR, BL in camera pixels.
    pub corners: [[f64; 2]; 4],
    pub edge_lengths: [f64; 4],
    pub shortest_edge: usize,
    pub longest_edge: usize,
    pub edge_ratio: f64,
    pub center: [f64; 2],
    pub bounding_box: [[f64; 2]; 2],
    pub game_scale: f64,
    pub calculated_longest_game_line: GameLine,
    /// Camera → game homography, row-major.
    pub homography: [[f64; 3]; 3],
    /// The homography embedded in 4x4, row-major.
    pub matrix: [[f64; 4]; 4],
    pub stale: bool,
}

impl SurfaceReport {
    pub fn new(surface: &TrackedSurface, shortest_game_line: &GameLine) -> Self {
        let g = &surface.geometry;
        let point = |p: Point2<f64>| [p.x, p.y];
        let m = &surface.transform.matrix;
        Self {
            corners: g.corners.points().map(point),
            edge_lengths: g.edges.map(|e| e.length),
            shortest_edge: g.shortest.index,
            longest_edge: g.longest.index,
            edge_ratio: g.edge_ratio,
            center: point(g.center),
            bounding_box: [point(g.bounding_box.min), point(g.bounding_box.max)],
            game_scale: g.game_scale(shortest_game_line),
            calculated_longest_game_line: g.calculated_longest_game_line(shortest_game_line),
            homography: surface.transform.camera_to_game.to_array(),
            matrix: std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)])),
            stale: surface.transform.stale,
        }
    }
}

/// Summary of a [`SurfaceSnapshot`] without the pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotReport {
    pub frame_id: u64,
    pub cycles: u64,
    pub state: SurfaceState,
    pub consecutive_failures: u32,
    pub capture_size: Option<(usize, usize)>,
    pub fov: f64,
    pub pixel_distance: f64,
    pub last_error: Option<String>,
    pub surface: Option<SurfaceReport>,
}

impl From<&SurfaceSnapshot> for SnapshotReport {
    fn from(snap: &SurfaceSnapshot) -> Self {
        Self {
            frame_id: snap.frame_id,
            cycles: snap.cycles,
            state: snap.state,
            consecutive_failures: snap.consecutive_failures,
            capture_size: snap.capture_size,
            fov: snap.fov,
            pixel_distance: snap.pixel_distance,
            last_error: snap.last_error.as_ref().map(ToString::to_string),
            surface: snap
                .surface
                .as_ref()
                .map(|s| SurfaceReport::new(s, &snap.shortest_game_line)),
        }
    }
}
