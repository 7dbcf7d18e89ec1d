//! JSON configuration of the capture loop.

use crate::ConfigError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use surface_capture_core::{AnalyzerParams, CornerOrderer, GameLine, TargetRect};

fn default_true() -> bool {
    true
}

fn default_target_resolution() -> [usize; 2] {
    [1280, 720]
}

fn default_field_of_view() -> f64 {
    std::f64::consts::FRAC_PI_4
}

fn default_aspect_tolerance() -> f64 {
    0.25
}

fn default_min_edge_length() -> f64 {
    4.0
}

fn default_shortest_game_line() -> GameLine {
    GameLine::new(Point2::new(0.0, 0.0), Point2::new(0.0, 720.0))
}

fn default_lost_threshold_cycles() -> u32 {
    30
}

fn default_angle_epsilon() -> f64 {
    1e-3
}

fn default_detection_interval() -> u32 {
    1
}

/// Capture loop configuration.
///
/// Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Run cycles on a dedicated worker thread; otherwise the host calls
    /// [`CaptureLoop::work`](crate::CaptureLoop::work) every tick.
    #[serde(default = "default_true")]
    pub run_on_own_thread: bool,
    /// Game-space rectangle `[width, height]` the surface maps onto. Also the
    /// default size of [`CaptureLoop::surface_image`](crate::CaptureLoop::surface_image).
    #[serde(default = "default_target_resolution")]
    pub target_resolution: [usize; 2],
    /// Horizontal field of view of the camera, radians.
    #[serde(default = "default_field_of_view")]
    pub field_of_view: f64,
    /// Expected shortest/longest camera edge ratio; `None` disables the check.
    #[serde(default)]
    pub expected_aspect_ratio: Option<f64>,
    #[serde(default = "default_aspect_tolerance")]
    pub aspect_tolerance: f64,
    #[serde(default = "default_min_edge_length")]
    pub min_edge_length: f64,
    /// Game-space reference segment matching the shortest camera edge.
    #[serde(default = "default_shortest_game_line")]
    pub shortest_game_line: GameLine,
    /// Consecutive failed cycles after which a chosen surface is lost.
    #[serde(default = "default_lost_threshold_cycles")]
    pub lost_threshold_cycles: u32,
    /// Minimum angular gap (radians) between corners around their centroid.
    #[serde(default = "default_angle_epsilon")]
    pub angle_epsilon: f64,
    /// Run detection every n-th frame.
    #[serde(default = "default_detection_interval")]
    pub detection_interval: u32,
    /// Worker pacing; 0 runs as fast as the source delivers.
    #[serde(default)]
    pub frame_interval_ms: u64,
    /// Commit to the first valid surface without waiting for
    /// [`CaptureLoop::confirm_surface`](crate::CaptureLoop::confirm_surface).
    #[serde(default = "default_true")]
    pub auto_choose: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            run_on_own_thread: true,
            target_resolution: default_target_resolution(),
            field_of_view: default_field_of_view(),
            expected_aspect_ratio: None,
            aspect_tolerance: default_aspect_tolerance(),
            min_edge_length: default_min_edge_length(),
            shortest_game_line: default_shortest_game_line(),
            lost_threshold_cycles: default_lost_threshold_cycles(),
            angle_epsilon: default_angle_epsilon(),
            detection_interval: default_detection_interval(),
            frame_interval_ms: 0,
            auto_choose: true,
        }
    }
}

impl CaptureConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.target_resolution.contains(&0) {
            return Err(invalid("target_resolution", "width and height must be positive"));
        }
        if !(self.field_of_view > 0.0 && self.field_of_view < std::f64::consts::PI) {
            return Err(invalid("field_of_view", "must be in (0, pi) radians"));
        }
        if let Some(ratio) = self.expected_aspect_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(invalid("expected_aspect_ratio", "must be in (0, 1]"));
            }
        }
        if !(self.aspect_tolerance >= 0.0) {
            return Err(invalid("aspect_tolerance", "must be non-negative"));
        }
        if !(self.min_edge_length >= 0.0) {
            return Err(invalid("min_edge_length", "must be non-negative"));
        }
        if !(self.shortest_game_line.length() > 0.0) {
            return Err(invalid("shortest_game_line", "must have positive length"));
        }
        if self.lost_threshold_cycles == 0 {
            return Err(invalid("lost_threshold_cycles", "must be at least 1"));
        }
        if !(self.angle_epsilon >= 0.0) {
            return Err(invalid("angle_epsilon", "must be non-negative"));
        }
        if self.detection_interval == 0 {
            return Err(invalid("detection_interval", "must be at least 1"));
        }
        Ok(())
    }

    pub fn analyzer_params(&self) -> AnalyzerParams {
        AnalyzerParams {
            expected_aspect_ratio: self.expected_aspect_ratio,
            aspect_tolerance: self.aspect_tolerance,
            min_edge_length: self.min_edge_length,
        }
    }

    pub fn corner_orderer(&self) -> CornerOrderer {
        CornerOrderer::new(self.angle_epsilon)
    }

    pub fn target_rect(&self) -> TargetRect {
        let [w, h] = self.target_resolution;
        TargetRect::new(w as f64, h as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: CaptureConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config, CaptureConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config: CaptureConfig = serde_json::from_str(
            r#"{ "run_on_own_thread": false, "shortest_game_line": { "start": [0, 0], "end": [10, 0] } }"#,
        )
        .expect("parse");
        assert!(!config.run_on_own_thread);
        assert_eq!(config.shortest_game_line.length(), 10.0);
        assert_eq!(config.lost_threshold_cycles, 30);
        assert!(config.auto_choose);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let zero_interval = CaptureConfig {
            detection_interval: 0,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(ConfigError::Invalid {
                field: "detection_interval",
                ..
            })
        ));

        let degrees = CaptureConfig {
            field_of_view: 60.0,
            ..CaptureConfig::default()
        };
        assert!(degrees.validate().is_err());

        let point_line = CaptureConfig {
            shortest_game_line: GameLine::new(Point2::origin(), Point2::origin()),
            ..CaptureConfig::default()
        };
        assert!(point_line.validate().is_err());
    }

    #[test]
    fn target_rect_follows_resolution() {
        let config = CaptureConfig {
            target_resolution: [800, 600],
            ..CaptureConfig::default()
        };
        assert_eq!(config.target_rect(), TargetRect::new(800.0, 600.0));
    }
}
