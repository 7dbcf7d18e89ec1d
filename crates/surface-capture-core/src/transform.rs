//! Camera-to-game transform.
//!
//! The planar homography from camera pixels to the target rectangle is
//! embedded in a 4×4 matrix acting on `(x, y, z, w)` with `z` passed through,
//! and composed as `projection × homography` so a renderer can append it to
//! its own camera projection.

use crate::{homography_from_4pt, DegenerateKind, GeometryError, Homography, OrderedCorners};
use nalgebra::{Matrix4, Point2};
use serde::{Deserialize, Serialize};

/// Axis-aligned game-space rectangle with its origin at `(0, 0)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetRect {
    pub width: f64,
    pub height: f64,
}

impl TargetRect {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Corners in the same TL, TR, BR, BL order as [`OrderedCorners`].
    pub fn corners(&self) -> [Point2<f64>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(self.width, 0.0),
            Point2::new(self.width, self.height),
            Point2::new(0.0, self.height),
        ]
    }
}

impl Default for TargetRect {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Embed a 3×3 homography into a 4×4 matrix that leaves `z` untouched.
pub fn homography_to_matrix4(h: &Homography) -> Matrix4<f64> {
    let m = &h.h;
    Matrix4::new(
        m[(0, 0)], m[(0, 1)], 0.0, m[(0, 2)], //
        m[(1, 0)], m[(1, 1)], 0.0, m[(1, 2)], //
        0.0, 0.0, 1.0, 0.0, //
        m[(2, 0)], m[(2, 1)], 0.0, m[(2, 2)],
    )
}

/// `projection × homography`; the order matters.
#[inline]
pub fn compose(projection: &Matrix4<f64>, homography: &Matrix4<f64>) -> Matrix4<f64> {
    projection * homography
}

/// Output of [`TransformBuilder::build`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformMatrix {
    /// `projection × embedded homography`.
    pub matrix: Matrix4<f64>,
    /// Camera pixels → target rectangle.
    pub camera_to_game: Homography,
    /// True when this is a previous cycle's matrix returned because the
    /// current cycle failed.
    pub stale: bool,
}

impl TransformMatrix {
    pub fn game_to_camera(&self) -> Option<Homography> {
        self.camera_to_game.inverse()
    }
}

/// Builds the camera-to-game matrix and remembers the last good one.
#[derive(Clone, Debug)]
pub struct TransformBuilder {
    target: TargetRect,
    last: Option<TransformMatrix>,
}

impl TransformBuilder {
    pub fn new(target: TargetRect) -> Self {
        Self { target, last: None }
    }

    /// Homography mapping the camera quad onto the target rectangle.
    pub fn camera_to_game(&self, corners: &OrderedCorners) -> Result<Homography, GeometryError> {
        homography_from_4pt(corners.points(), &self.target.corners()).ok_or(
            GeometryError::DegenerateGeometry(DegenerateKind::SingularHomography),
        )
    }

    /// Build `projection × homography` for `corners`.
    ///
    /// `None` corners (the cycle failed validation) or a singular homography
    /// return the previous matrix with `stale` set. Without a previous
    /// matrix this is [`GeometryError::MatrixBuildFailure`].
    pub fn build(
        &mut self,
        corners: Option<&OrderedCorners>,
        projection: &Matrix4<f64>,
    ) -> Result<TransformMatrix, GeometryError> {
        let fresh = corners.map(|c| self.camera_to_game(c));
        match fresh {
            Some(Ok(camera_to_game)) => {
                let out = TransformMatrix {
                    matrix: compose(projection, &homography_to_matrix4(&camera_to_game)),
                    camera_to_game,
                    stale: false,
                };
                self.last = Some(out);
                Ok(out)
            }
            Some(Err(_)) | None => self.stale_or_fail(),
        }
    }

    fn stale_or_fail(&self) -> Result<TransformMatrix, GeometryError> {
        self.last
            .map(|last| TransformMatrix {
                stale: true,
                ..last
            })
            .ok_or(GeometryError::MatrixBuildFailure)
    }
}
