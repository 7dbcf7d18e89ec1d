use crate::{CalibrationStore, CycleError, LogHandle};
use surface_capture_core::{CameraIntrinsics, Frame};

/// Applies lens correction, degrading to pass-through.
///
/// Without a calibration store every frame is returned unchanged and a
/// single warning is logged for the lifetime of the undistorter. A store
/// error affects only the frame it happened on.
pub struct Undistorter {
    store: Option<Box<dyn CalibrationStore>>,
    warned_missing: bool,
    log: LogHandle,
}

impl Undistorter {
    pub fn new(store: Option<Box<dyn CalibrationStore>>, log: LogHandle) -> Self {
        Self {
            store,
            warned_missing: false,
            log,
        }
    }

    pub fn set_store(&mut self, store: Box<dyn CalibrationStore>) {
        self.store = Some(store);
        self.warned_missing = false;
    }

    pub fn set_log(&mut self, log: LogHandle) {
        self.log = log;
    }

    pub fn has_calibration(&self) -> bool {
        self.store.is_some()
    }

    pub fn intrinsics(&self) -> Option<CameraIntrinsics> {
        self.store.as_ref().and_then(|s| s.intrinsics())
    }

    pub fn apply(&mut self, raw: Frame) -> Frame {
        match self.try_apply(&raw) {
            Ok(rectified) => rectified,
            Err(CycleError::CalibrationMissing) => {
                if !self.warned_missing {
                    self.warned_missing = true;
                    self.log.warn(format_args!(
                        "no lens calibration available; frames are used without undistortion"
                    ));
                }
                raw
            }
            Err(err) => {
                self.log
                    .debug(format_args!("undistortion skipped for this frame: {err}"));
                raw
            }
        }
    }

    fn try_apply(&mut self, raw: &Frame) -> Result<Frame, CycleError> {
        let store = self.store.as_mut().ok_or(CycleError::CalibrationMissing)?;
        store
            .undistort(raw)
            .map_err(|err| CycleError::AcquisitionFailure(format!("undistortion: {err}")))
    }
}

impl std::fmt::Debug for Undistorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Undistorter")
            .field("has_calibration", &self.has_calibration())
            .field("warned_missing", &self.warned_missing)
            .finish()
    }
}
