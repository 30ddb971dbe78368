use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use sysinfo::System;

use crate::app::components::Components;
use crate::capture::frame_source::{CameraStatus, FrameSource};
use crate::detection::face_locator::{DetectionStats, FaceLocator};
use crate::detection::infrastructure::known_faces_store::KnownFacesError;
use crate::gaze::domain::calibration::CalibrationStatus;
use crate::gaze::domain::eye_geometry::GazePoint;
use crate::gaze::gaze_estimator::GazeEstimator;
use crate::protection::controller::ProtectionController;
use crate::protection::domain::effect_parameters::EffectParameter;
use crate::protection::domain::protection_mode::ProtectionMode;
use crate::protection::screen_protector::ScreenProtector;
use crate::settings::settings_store::SettingsStore;
use crate::shared::model_resolver::ModelSource;
use crate::shared::thread_util::lock;

const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub is_protected: bool,
    pub protection_mode: ProtectionMode,
    pub sensitivity: f64,
    pub fps: f64,
    pub avg_reaction_time: f64,
    pub face_detected: Option<bool>,
    pub gaze_direction: Option<GazePoint>,
    pub camera_status: CameraStatus,
    pub detection: DetectionStats,
    pub calibration: Option<CalibrationStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub fps: f64,
    pub avg_reaction_time: f64,
    pub cpu_usage: f32,
    pub memory_usage_mb: f64,
    pub camera_fps: f64,
}

/// Owns the camera, detectors, gaze estimator, screen protector and the
/// protection loop, configured from one settings file.
pub struct PrivacyScreenApp {
    settings: Mutex<SettingsStore>,
    frames: Arc<FrameSource>,
    locator: Arc<Mutex<FaceLocator>>,
    gaze: Arc<Mutex<GazeEstimator>>,
    protector: Arc<Mutex<ScreenProtector>>,
    controller: ProtectionController,
    system: Mutex<System>,
}

impl PrivacyScreenApp {
    /// Wire real devices and models according to `settings`.
    pub fn from_settings(settings: SettingsStore) -> Self {
        let components = Components::load(&settings.config(), &ModelSource::from_env());
        Self::new(settings, components)
    }

    pub fn new(settings: SettingsStore, components: Components) -> Self {
        let config = settings.config();

        let frames = Arc::new(FrameSource::new(components.capture, config.capture_settings()));
        let locator = FaceLocator::new(
            components.primary_detector,
            components.fallback_detector,
            config.face_locator_config(),
        )
        .with_recognition(components.embedder, components.known_faces);
        let locator = Arc::new(Mutex::new(locator));
        let gaze = Arc::new(Mutex::new(GazeEstimator::new(
            components.landmarker,
            config.gaze_config(),
        )));
        let protector = Arc::new(Mutex::new(ScreenProtector::new(
            components.effects,
            config.protection_mode(),
            config.effect_parameters(),
        )));
        let controller = ProtectionController::new(
            frames.clone(),
            locator.clone(),
            gaze.clone(),
            protector.clone(),
            config.presence_policy(),
            config.camera.fps,
        );

        log::info!("Privacy Screen App initialized successfully");
        Self {
            settings: Mutex::new(settings),
            frames,
            locator,
            gaze,
            protector,
            controller,
            system: Mutex::new(System::new()),
        }
    }

    pub fn start_protection(&self) -> bool {
        log::info!("Starting privacy protection system");
        if !self.frames.start() {
            log::error!("Failed to start camera");
            return false;
        }
        self.controller.set_target_fps(self.frames.settings().fps);
        if !self.controller.start() {
            self.frames.stop();
            return false;
        }
        log::info!("Privacy protection system started successfully");
        true
    }

    /// Stop the loop and camera; any active protection is lifted.
    pub fn stop_protection(&self) -> bool {
        log::info!("Stopping privacy protection system");
        let loop_stopped = self.controller.stop();
        let camera_stopped = self.frames.stop();
        if loop_stopped && camera_stopped {
            log::info!("Privacy protection system stopped successfully");
        }
        loop_stopped && camera_stopped
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    pub fn set_protection_mode(&self, name: &str) -> bool {
        let mode = match name.parse::<ProtectionMode>() {
            Ok(mode) => mode,
            Err(e) => {
                log::error!("Failed to set protection mode: {e}");
                return false;
            }
        };
        if !lock(&self.protector).set_protection_mode(mode) {
            return false;
        }
        self.persist("protection", "mode", Value::from(mode.name()))
    }

    pub fn set_sensitivity(&self, sensitivity: f64) -> bool {
        if !(0.0..=1.0).contains(&sensitivity) {
            log::error!("Failed to set sensitivity: must be between 0.0 and 1.0, got {sensitivity}");
            return false;
        }
        if !self.persist("protection", "sensitivity", Value::from(sensitivity)) {
            return false;
        }
        lock(&self.locator).set_sensitivity(sensitivity)
    }

    /// Update one effect parameter by name, e.g. `("blur_intensity", "25")`.
    pub fn set_effect_parameter(&self, name: &str, value: &str) -> bool {
        let param = match EffectParameter::parse(name, value) {
            Ok(param) => param,
            Err(e) => {
                log::error!("Failed to set effect parameter: {e}");
                return false;
            }
        };
        if let Err(e) = lock(&self.protector).set_parameter(param) {
            log::error!("Failed to set effect parameter: {e}");
            return false;
        }
        self.persist("protection", name, param_value(param))
    }

    pub fn test_protection(&self, name: &str) -> bool {
        match name.parse::<ProtectionMode>() {
            Ok(mode) => lock(&self.protector).test_protection(mode),
            Err(e) => {
                log::error!("Cannot test protection: {e}");
                false
            }
        }
    }

    /// Capture a frame, take its first face and remember it as `name`.
    /// The camera is started for the duration if it is not already running.
    pub fn add_known_face(&self, name: &str, timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
        let started_here = !self.frames.is_running();
        if started_here && !self.frames.start() {
            return Err("camera could not be started".into());
        }
        let result = self.enroll_from_camera(name, timeout);
        if started_here {
            self.frames.stop();
        }
        result
    }

    pub fn remove_known_face(&self, name: &str) -> Result<bool, KnownFacesError> {
        lock(&self.locator).remove_known_face(name)
    }

    pub fn known_faces(&self) -> Vec<String> {
        lock(&self.locator).known_face_names()
    }

    pub fn start_calibration(&self) -> bool {
        lock(&self.gaze).start_calibration()
    }

    pub fn add_calibration_sample(&self, point_id: &str, gaze: GazePoint) -> bool {
        lock(&self.gaze).add_calibration_sample(point_id, gaze)
    }

    pub fn finish_calibration(&self) -> bool {
        lock(&self.gaze).finish_calibration()
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.controller.state();
        let protection_mode = lock(&self.protector).mode();
        StatusSnapshot {
            is_running: self.controller.is_running(),
            is_protected: state.is_protected,
            protection_mode,
            sensitivity: lock(&self.settings).config().protection.sensitivity,
            fps: state.fps,
            avg_reaction_time: state.avg_reaction_time_ms,
            face_detected: state.face_detected,
            gaze_direction: state.gaze_direction,
            camera_status: self.frames.status(),
            detection: lock(&self.locator).detection_stats(),
            calibration: lock(&self.gaze).calibration_status(),
        }
    }

    /// Process CPU and memory figures are 0 when the platform does not report them.
    pub fn performance(&self) -> PerformanceSnapshot {
        let state = self.controller.state();
        let (cpu_usage, memory_usage_mb) = self.process_usage();
        PerformanceSnapshot {
            fps: state.fps,
            avg_reaction_time: state.avg_reaction_time_ms,
            cpu_usage,
            memory_usage_mb,
            camera_fps: self.frames.current_fps(),
        }
    }

    fn process_usage(&self) -> (f32, f64) {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return (0.0, 0.0);
        };
        let mut system = lock(&self.system);
        if !system.refresh_process(pid) {
            return (0.0, 0.0);
        }
        system
            .process(pid)
            .map(|p| (p.cpu_usage(), p.memory() as f64 / 1024.0 / 1024.0))
            .unwrap_or((0.0, 0.0))
    }

    fn enroll_from_camera(&self, name: &str, timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.frames.get_frame() {
                let mut locator = lock(&self.locator);
                let faces = locator.detect_faces(&frame);
                if let Some(face) = faces.first() {
                    return locator.add_known_face(name, &frame, face);
                }
            }
            if Instant::now() >= deadline {
                return Err(format!("no face seen within {} s", timeout.as_secs()).into());
            }
            std::thread::sleep(FRAME_POLL_INTERVAL);
        }
    }

    /// Merge `{section: {key: value}}` into the settings file.
    fn persist(&self, section: &str, key: &str, value: Value) -> bool {
        let mut inner = Mapping::new();
        inner.insert(Value::from(key), value);
        let mut patch = Mapping::new();
        patch.insert(Value::from(section), Value::Mapping(inner));
        match lock(&self.settings).update(Value::Mapping(patch)) {
            Ok(()) => {
                log::info!("{section}.{key} updated");
                true
            }
            Err(e) => {
                log::error!("Failed to save {section}.{key}: {e}");
                false
            }
        }
    }
}

impl Drop for PrivacyScreenApp {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop_protection();
        }
    }
}

fn param_value(param: EffectParameter) -> Value {
    match param {
        EffectParameter::BlurIntensity(v) | EffectParameter::PixelBlockSize(v) => Value::from(v),
        EffectParameter::BrightnessReduction(v) | EffectParameter::OverlayOpacity(v) => Value::from(v),
    }
}
