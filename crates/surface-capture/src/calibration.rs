//! Lens calibration stores.

use crate::CalibrationError;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};
use surface_capture_core::{CameraIntrinsics, Frame, LensModel, RemapTable};

/// Source of lens correction for raw camera frames.
pub trait CalibrationStore: Send {
    /// Rectify one frame. Must not modify `frame`.
    fn undistort(&mut self, frame: &Frame) -> Result<Frame, CalibrationError>;

    /// Pinhole intrinsics, when the store knows them.
    fn intrinsics(&self) -> Option<CameraIntrinsics>;
}

/// On-disk form of a [`LensCalibration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensCalibrationFile {
    #[serde(flatten)]
    pub model: LensModel,
    /// `[width, height]` the calibration was computed for; frames of any
    /// other size are rejected when set.
    #[serde(default)]
    pub image_size: Option<[usize; 2]>,
}

/// Brown-Conrady calibration with a remap table cached per frame size.
#[derive(Debug, Clone)]
pub struct LensCalibration {
    model: LensModel,
    image_size: Option<[usize; 2]>,
    table: Option<Arc<RemapTable>>,
}

impl LensCalibration {
    pub fn new(model: LensModel) -> Result<Self, CalibrationError> {
        if !model.intrinsics.is_valid() {
            return Err(CalibrationError::InvalidIntrinsics);
        }
        Ok(Self {
            model,
            image_size: None,
            table: None,
        })
    }

    pub fn with_image_size(mut self, width: usize, height: usize) -> Self {
        self.image_size = Some([width, height]);
        self
    }

    pub fn model(&self) -> &LensModel {
        &self.model
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let raw = fs::read_to_string(path)?;
        let file: LensCalibrationFile = serde_json::from_str(&raw)?;
        let mut calib = Self::new(file.model)?;
        calib.image_size = file.image_size;
        Ok(calib)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let file = LensCalibrationFile {
            model: self.model,
            image_size: self.image_size,
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    fn table_for(&mut self, frame: &Frame) -> Arc<RemapTable> {
        match &self.table {
            Some(table) if table.fits(frame) => Arc::clone(table),
            _ => {
                let table = Arc::new(self.model.remap_table(frame.width, frame.height));
                self.table = Some(Arc::clone(&table));
                table
            }
        }
    }
}

impl CalibrationStore for LensCalibration {
    fn undistort(&mut self, frame: &Frame) -> Result<Frame, CalibrationError> {
        if let Some([width, height]) = self.image_size {
            if frame.size() != (width, height) {
                return Err(CalibrationError::SizeMismatch {
                    width,
                    height,
                    got_width: frame.width,
                    got_height: frame.height,
                });
            }
        }
        if self.model.distortion.is_zero() {
            return Ok(frame.clone());
        }
        Ok(self.table_for(frame).apply(frame))
    }

    fn intrinsics(&self) -> Option<CameraIntrinsics> {
        Some(self.model.intrinsics)
    }
}
