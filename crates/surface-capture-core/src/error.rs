use crate::DegenerateKind;

/// Reasons a detection cycle's geometry is rejected.
///
/// Every variant is recoverable: the caller drops the cycle and tries again
/// on the next frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("not enough corner candidates (need 4, got {found})")]
    InsufficientCorners { found: usize },
    #[error("corner order is ambiguous: {reason}")]
    AmbiguousCorners { reason: String },
    #[error("degenerate surface geometry: {0}")]
    DegenerateGeometry(DegenerateKind),
    #[error("no transform available: surface geometry has never been valid")]
    MatrixBuildFailure,
}
