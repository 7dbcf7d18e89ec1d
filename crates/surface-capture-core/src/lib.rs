//! Core types and geometry for camera-tracked play surfaces.
//!
//! This crate is purely geometric: it knows nothing about cameras, threads or
//! marker detectors. It provides the frame buffer type, bilinear sampling,
//! homographies, line intersection, corner ordering, edge analysis and the
//! camera-to-game transform builder used by `surface-capture`.

mod analysis;
mod corners;
mod error;
mod homography;
mod image;
mod lens;
mod lines;
mod logger;
mod transform;

pub use analysis::{
    AnalyzerParams, BoundingBox, DegenerateKind, Edge, GeometryAnalyzer, SurfaceGeometry,
};
pub use corners::{centroid, order_corners, CornerOrderer, CornerSet, OrderedCorners};
pub use error::GeometryError;
pub use homography::{homography_from_4pt, warp_perspective, Homography};
pub use image::{sample_bilinear, sample_bilinear_into, Frame, FrameError, PixelFormat};
pub use lens::{CameraIntrinsics, LensModel, RadialTangentialDistortion, RemapTable};
pub use lines::{compute_cross, segment_cross, GameLine, Segment};
pub use transform::{compose, homography_to_matrix4, TargetRect, TransformBuilder, TransformMatrix};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, TraceFormat};

pub use logger::init_with_level;
