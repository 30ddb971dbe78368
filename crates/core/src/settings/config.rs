//! Typed view of the YAML configuration.
//!
//! Every section defaults field by field, so a partial document still
//! deserializes. Free-form values such as the protection mode and the camera
//! resolution stay strings here and are checked by validation.

use serde::{Deserialize, Serialize};

use crate::capture::domain::capture_settings::{CaptureSettings, Resolution};
use crate::detection::face_locator::FaceLocatorConfig;
use crate::gaze::gaze_estimator::GazeEstimatorConfig;
use crate::protection::controller::PresencePolicy;
use crate::protection::domain::effect_parameters::EffectParameters;
use crate::protection::domain::protection_mode::ProtectionMode;

pub const SECTIONS: &[&str] = &[
    "protection",
    "camera",
    "face_detection",
    "gaze_detection",
    "performance",
    "security",
    "ui",
    "logging",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    pub mode: String,
    pub sensitivity: f64,
    pub reaction_time: u32,
    pub blur_intensity: u32,
    pub pixel_block_size: u32,
    pub brightness_reduction: f64,
    pub overlay_opacity: f64,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        let effects = EffectParameters::default();
        Self {
            mode: ProtectionMode::Blur.name().to_string(),
            sensitivity: 0.8,
            reaction_time: 200,
            blur_intensity: effects.blur_intensity,
            pixel_block_size: effects.pixel_block_size,
            brightness_reduction: effects.brightness_reduction,
            overlay_opacity: effects.overlay_opacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device_index: u32,
    pub resolution: String,
    pub fps: u32,
    pub flip_horizontal: bool,
    pub auto_focus: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: Resolution::Hd720.name().to_string(),
            fps: 30,
            flip_horizontal: true,
            auto_focus: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionConfig {
    pub confidence_threshold: f64,
    pub tracking_enabled: bool,
    pub max_faces: usize,
    pub model: String,
    pub recognition_tolerance: f64,
    pub recognition_enabled: bool,
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            tracking_enabled: true,
            max_faces: 5,
            model: "hog".to_string(),
            recognition_tolerance: 0.6,
            recognition_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeDetectionConfig {
    pub enabled: bool,
    pub precision: f64,
    pub tolerance_degrees: f64,
    pub calibration_points: usize,
}

impl Default for GazeDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            precision: 0.8,
            tolerance_degrees: 15.0,
            calibration_points: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub max_cpu_usage: f64,
    pub battery_optimization: bool,
    pub power_saving: bool,
    pub memory_limit: u32,
    pub gpu_acceleration: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_cpu_usage: 0.3,
            battery_optimization: true,
            power_saving: false,
            memory_limit: 100,
            gpu_acceleration: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub stealth_mode: bool,
    pub local_processing: bool,
    pub encrypt_data: bool,
    pub auto_lock_timeout: u32,
    pub require_auth: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            stealth_mode: false,
            local_processing: true,
            encrypt_data: true,
            auto_lock_timeout: 300,
            require_auth: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub theme: String,
    pub language: String,
    pub show_status: bool,
    pub minimize_to_tray: bool,
    pub start_with_boot: bool,
    pub show_notifications: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "auto".to_string(),
            language: "auto".to_string(),
            show_status: true,
            minimize_to_tray: true,
            start_with_boot: false,
            show_notifications: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub max_log_size: u32,
    pub log_rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            log_to_file: true,
            log_file: "logs/privacy_screen.log".to_string(),
            max_log_size: 10,
            log_rotation: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub protection: ProtectionConfig,
    pub camera: CameraConfig,
    pub face_detection: FaceDetectionConfig,
    pub gaze_detection: GazeDetectionConfig,
    pub performance: PerformanceConfig,
    pub security: SecurityConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Configured mode, or blur when the name is not recognised.
    pub fn protection_mode(&self) -> ProtectionMode {
        self.protection.mode.parse().unwrap_or_else(|e| {
            log::warn!("{e}, falling back to {}", ProtectionMode::Blur);
            ProtectionMode::Blur
        })
    }

    pub fn effect_parameters(&self) -> EffectParameters {
        EffectParameters {
            blur_intensity: self.protection.blur_intensity,
            pixel_block_size: self.protection.pixel_block_size.max(1),
            brightness_reduction: self.protection.brightness_reduction.clamp(0.0, 1.0),
            overlay_opacity: self.protection.overlay_opacity.clamp(0.0, 1.0),
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            device_index: self.camera.device_index,
            resolution: Resolution::from_name_or_default(&self.camera.resolution),
            fps: self.camera.fps,
            flip_horizontal: self.camera.flip_horizontal,
        }
    }

    /// Seeds the primary-path threshold from `face_detection`; sensitivity
    /// only rewrites it through an explicit `set_sensitivity`.
    pub fn face_locator_config(&self) -> FaceLocatorConfig {
        FaceLocatorConfig {
            confidence_threshold: self.face_detection.confidence_threshold,
            max_faces: self.face_detection.max_faces,
            tracking_enabled: self.face_detection.tracking_enabled,
            recognition_tolerance: self.face_detection.recognition_tolerance,
        }
    }

    pub fn gaze_config(&self) -> GazeEstimatorConfig {
        GazeEstimatorConfig {
            enabled: self.gaze_detection.enabled,
            calibration_points: self.gaze_detection.calibration_points,
        }
    }

    pub fn presence_policy(&self) -> PresencePolicy {
        PresencePolicy {
            recognition_enabled: self.face_detection.recognition_enabled,
            gaze_enabled: self.gaze_detection.enabled,
            tolerance_degrees: self.gaze_detection.tolerance_degrees,
        }
    }

    /// `logging.level` as an `env_logger` filter string.
    pub fn log_filter(&self) -> String {
        match self.logging.level.to_ascii_lowercase().as_str() {
            "critical" | "fatal" => "error".to_string(),
            "warning" => "warn".to_string(),
            level @ ("error" | "warn" | "info" | "debug" | "trace" | "off") => level.to_string(),
            _ => "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config: Config = serde_yaml::from_str("camera:\n  fps: 15\n").unwrap();
        assert_eq!(config.camera.fps, 15);
        assert_eq!(config.camera.resolution, "720p");
        assert_eq!(config.protection, ProtectionConfig::default());
    }

    #[test]
    fn test_default_serializes_every_section() {
        let value = serde_yaml::to_value(Config::default()).unwrap();
        let mapping = value.as_mapping().unwrap();
        let keys: Vec<&str> = mapping.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys, SECTIONS);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_blur() {
        let mut config = Config::default();
        config.protection.mode = "sparkle".into();
        assert_eq!(config.protection_mode(), ProtectionMode::Blur);
        config.protection.mode = "overlay".into();
        assert_eq!(config.protection_mode(), ProtectionMode::Overlay);
    }

    #[test]
    fn test_threshold_comes_from_face_detection_section() {
        let config = Config::default();
        assert_relative_eq!(config.face_locator_config().confidence_threshold, 0.7);
    }

    #[rstest]
    #[case(0.2)]
    #[case(0.8)]
    #[case(3.0)]
    fn test_sensitivity_does_not_seed_threshold(#[case] sensitivity: f64) {
        let mut config = Config::default();
        config.protection.sensitivity = sensitivity;
        config.face_detection.confidence_threshold = 0.55;
        assert_relative_eq!(config.face_locator_config().confidence_threshold, 0.55);
    }

    #[test]
    fn test_capture_settings_from_camera_section() {
        let mut config = Config::default();
        config.camera.resolution = "1080p".into();
        config.camera.device_index = 2;
        let settings = config.capture_settings();
        assert_eq!(settings.resolution, Resolution::Hd1080);
        assert_eq!(settings.device_index, 2);
        assert_eq!(settings.fps, 30);
    }

    #[rstest]
    #[case::python_info("INFO", "info")]
    #[case::python_warning("WARNING", "warn")]
    #[case::critical("CRITICAL", "error")]
    #[case::debug("debug", "debug")]
    #[case::garbage("loud", "info")]
    fn test_log_filter(#[case] level: &str, #[case] expected: &str) {
        let mut config = Config::default();
        config.logging.level = level.into();
        assert_eq!(config.log_filter(), expected);
    }
}
