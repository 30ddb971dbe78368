use crate::detection::domain::detected_face::DetectedFace;
use crate::gaze::domain::calibration::{CalibrationError, CalibrationSession, CalibrationStatus};
use crate::gaze::domain::eye_geometry::{eyes_open, raw_gaze, GazePoint};
use crate::gaze::domain::face_landmarker::FaceLandmarker;
use crate::gaze::domain::gaze_smoother::GazeSmoother;
use crate::shared::frame::Frame;

#[derive(Debug, Clone, PartialEq)]
pub struct GazeEstimatorConfig {
    pub enabled: bool,
    pub calibration_points: usize,
}

impl Default for GazeEstimatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            calibration_points: 9,
        }
    }
}

/// Turns a detected face into a smoothed, normalized gaze point.
pub struct GazeEstimator {
    landmarker: Option<Box<dyn FaceLandmarker>>,
    smoother: GazeSmoother,
    config: GazeEstimatorConfig,
    calibration: Option<CalibrationSession>,
}

impl GazeEstimator {
    pub fn new(landmarker: Option<Box<dyn FaceLandmarker>>, config: GazeEstimatorConfig) -> Self {
        if config.enabled && landmarker.is_none() {
            log::warn!("Gaze tracking enabled but no landmark model is loaded");
        }
        Self {
            landmarker,
            smoother: GazeSmoother::default(),
            config,
            calibration: None,
        }
    }

    /// `None` when disabled, when no mesh is found, or when either eye is closed.
    pub fn estimate(&mut self, frame: &Frame, face: &DetectedFace) -> Option<GazePoint> {
        if !self.config.enabled {
            return None;
        }
        let landmarker = self.landmarker.as_mut()?;
        let landmarks = match landmarker.landmarks(frame, face) {
            Ok(Some(points)) => points,
            Ok(None) => return None,
            Err(e) => {
                log::error!("Gaze tracking failed: {e}");
                return None;
            }
        };

        if !eyes_open(&landmarks) {
            log::debug!("Eyes closed, skipping gaze tracking");
            return None;
        }

        let smoothed = self.smoother.smooth(raw_gaze(&landmarks));
        Some(match &self.calibration {
            Some(c) if c.is_finished() => c.apply(smoothed),
            _ => smoothed,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.smoother.clear();
        }
    }

    pub fn start_calibration(&mut self) -> bool {
        let session = CalibrationSession::new(self.config.calibration_points);
        log::info!(
            "Starting gaze calibration with {} points",
            session.points().len()
        );
        self.calibration = Some(session);
        true
    }

    pub fn add_calibration_sample(&mut self, point_id: &str, gaze: GazePoint) -> bool {
        let result = match self.calibration.as_mut() {
            Some(session) => session.add_sample(point_id, gaze),
            None => Err(CalibrationError::NotStarted),
        };
        match result {
            Ok(complete) => {
                if complete {
                    log::debug!("Calibration point {point_id} complete");
                }
                true
            }
            Err(e) => {
                log::warn!("Calibration sample rejected: {e}");
                false
            }
        }
    }

    pub fn finish_calibration(&mut self) -> bool {
        let result = match self.calibration.as_mut() {
            Some(session) => session.finish(),
            None => Err(CalibrationError::NotStarted),
        };
        match result {
            Ok(()) => {
                log::info!("Gaze calibration completed");
                true
            }
            Err(e) => {
                log::warn!("Gaze calibration not finished: {e}");
                false
            }
        }
    }

    pub fn calibration_status(&self) -> Option<CalibrationStatus> {
        self.calibration.as_ref().map(CalibrationSession::status)
    }
}

/// Square region test around the screen center with half-side `tolerance / 90`,
/// inclusive on both axes.
pub fn is_gaze_valid(gaze: GazePoint, tolerance_degrees: f64) -> bool {
    let radius = tolerance_degrees / 90.0;
    (gaze.x - 0.5).abs() <= radius && (gaze.y - 0.5).abs() <= radius
}
