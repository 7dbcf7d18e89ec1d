//! Pinhole + Brown-Conrady lens model and the per-size remap table used to
//! undistort whole frames.

use crate::{sample_bilinear_into, Frame};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Horizontal field of view (radians) for an image `width` pixels wide.
    pub fn horizontal_fov(&self, width: usize) -> f64 {
        2.0 * (width as f64 / (2.0 * self.fx)).atan()
    }

    pub fn is_valid(&self) -> bool {
        self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl RadialTangentialDistortion {
    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        let x = normalized_xy[0];
        let y = normalized_xy[1];
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [x * radial + x_tan, y * radial + y_tan]
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Intrinsics plus distortion of one camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LensModel {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: RadialTangentialDistortion,
}

impl LensModel {
    /// Where an ideal (undistorted) pixel lands in the raw camera image.
    pub fn distort_pixel(&self, undistorted: [f64; 2]) -> [f64; 2] {
        let k = &self.intrinsics;
        let xn = (undistorted[0] - k.cx) / k.fx;
        let yn = (undistorted[1] - k.cy) / k.fy;
        let [xd, yd] = self.distortion.distort_normalized([xn, yn]);
        [k.fx * xd + k.cx, k.fy * yd + k.cy]
    }

    /// Inverse of [`distort_pixel`](Self::distort_pixel) by fixed-point
    /// iteration; `None` when it does not converge.
    pub fn undistort_pixel(&self, distorted: [f64; 2]) -> Option<[f64; 2]> {
        let k = &self.intrinsics;
        let xd = (distorted[0] - k.cx) / k.fx;
        let yd = (distorted[1] - k.cy) / k.fy;
        let (mut x, mut y) = (xd, yd);
        for _ in 0..50 {
            let [dx, dy] = self.distortion.distort_normalized([x, y]);
            let (ex, ey) = (dx - xd, dy - yd);
            x -= ex;
            y -= ey;
            if !x.is_finite() || !y.is_finite() {
                return None;
            }
            if ex * ex + ey * ey < 1e-24 {
                return Some([k.fx * x + k.cx, k.fy * y + k.cy]);
            }
        }
        None
    }

    /// Precompute the source position of every output pixel.
    pub fn remap_table(&self, width: usize, height: usize) -> RemapTable {
        let mut map = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let [sx, sy] = self.distort_pixel([x as f64, y as f64]);
                map.push((sx as f32, sy as f32));
            }
        }
        RemapTable { width, height, map }
    }
}

/// Output pixel → source position lookup for one frame size.
#[derive(Clone, Debug)]
pub struct RemapTable {
    width: usize,
    height: usize,
    map: Vec<(f32, f32)>,
}

impl RemapTable {
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// True when the table was built for frames of this size.
    pub fn fits(&self, frame: &Frame) -> bool {
        frame.width == self.width && frame.height == self.height
    }

    /// Resample `src` through the table; `src` must have the table's size.
    pub fn apply(&self, src: &Frame) -> Frame {
        let channels = src.channels();
        let mut out = Frame::blank(self.width, self.height, src.format);
        let mut px = [0u8; 4];
        for (i, &(sx, sy)) in self.map.iter().enumerate() {
            sample_bilinear_into(src, sx, sy, &mut px[..channels]);
            out.data[i * channels..(i + 1) * channels].copy_from_slice(&px[..channels]);
        }
        out
    }
}
