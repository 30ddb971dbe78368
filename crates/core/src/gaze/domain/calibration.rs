use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::gaze::domain::eye_geometry::GazePoint;
use crate::shared::constants::{CALIBRATION_MIN_COMPLETION, CALIBRATION_SAMPLES_PER_POINT};

#[derive(Error, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("no calibration in progress")]
    NotStarted,
    #[error("unknown calibration point {0}")]
    UnknownPoint(String),
    #[error("only {completed} of {required} calibration points completed")]
    Incomplete { completed: usize, required: usize },
}

#[derive(Clone, Debug, Serialize)]
pub struct CalibrationPoint {
    pub target: GazePoint,
    pub samples: Vec<GazePoint>,
}

impl CalibrationPoint {
    pub fn is_complete(&self) -> bool {
        self.samples.len() >= CALIBRATION_SAMPLES_PER_POINT
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CalibrationStatus {
    pub is_calibrated: bool,
    pub total_points: usize,
    pub calibrated_points: usize,
    pub progress: f64,
}

/// Grid of on-screen targets the user looks at while gaze samples are collected.
///
/// Points are keyed `point_<i>_<j>` for column `i`, row `j`.
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    requested_points: usize,
    points: BTreeMap<String, CalibrationPoint>,
    finished: bool,
}

impl CalibrationSession {
    /// `floor(sqrt(requested_points))` squared targets at cell centers.
    pub fn new(requested_points: usize) -> Self {
        let grid = (requested_points as f64).sqrt().floor() as usize;
        let mut points = BTreeMap::new();
        for i in 0..grid {
            for j in 0..grid {
                let target = GazePoint::new(
                    (i as f64 + 0.5) / grid as f64,
                    (j as f64 + 0.5) / grid as f64,
                );
                points.insert(
                    format!("point_{i}_{j}"),
                    CalibrationPoint {
                        target,
                        samples: Vec::new(),
                    },
                );
            }
        }
        Self {
            requested_points,
            points,
            finished: false,
        }
    }

    pub fn points(&self) -> &BTreeMap<String, CalibrationPoint> {
        &self.points
    }

    /// Record a sample; returns whether the point is now complete.
    pub fn add_sample(&mut self, point_id: &str, gaze: GazePoint) -> Result<bool, CalibrationError> {
        let point = self
            .points
            .get_mut(point_id)
            .ok_or_else(|| CalibrationError::UnknownPoint(point_id.to_string()))?;
        point.samples.push(gaze);
        Ok(point.is_complete())
    }

    pub fn completed_points(&self) -> usize {
        self.points.values().filter(|p| p.is_complete()).count()
    }

    /// Succeeds once at least 80% of the requested points are complete.
    pub fn finish(&mut self) -> Result<(), CalibrationError> {
        let completed = self.completed_points();
        let required = self.required_points();
        if completed < required {
            return Err(CalibrationError::Incomplete {
                completed,
                required,
            });
        }
        self.finished = true;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Maps a raw gaze sample to screen space. Identity for now: collected
    /// samples are kept but no transform is fitted to them.
    pub fn apply(&self, gaze: GazePoint) -> GazePoint {
        gaze
    }

    pub fn status(&self) -> CalibrationStatus {
        let total = self.points.len();
        let done = self.completed_points();
        CalibrationStatus {
            is_calibrated: self.finished,
            total_points: total,
            calibrated_points: done,
            progress: if total > 0 {
                done as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn required_points(&self) -> usize {
        (self.requested_points as f64 * CALIBRATION_MIN_COMPLETION).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn fill(session: &mut CalibrationSession, count: usize) {
        let ids: Vec<String> = session.points().keys().take(count).cloned().collect();
        for id in ids {
            for _ in 0..CALIBRATION_SAMPLES_PER_POINT {
                session.add_sample(&id, GazePoint::CENTER).unwrap();
            }
        }
    }

    #[rstest]
    #[case::nine(9, 9)]
    #[case::ten(10, 9)]
    #[case::four(4, 4)]
    #[case::fifteen(15, 9)]
    #[case::one(1, 1)]
    fn test_grid_size(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(CalibrationSession::new(requested).points().len(), expected);
    }

    #[test]
    fn test_targets_at_cell_centers() {
        let session = CalibrationSession::new(4);
        let p = &session.points()["point_1_0"];
        assert_relative_eq!(p.target.x, 0.75);
        assert_relative_eq!(p.target.y, 0.25);
    }

    #[test]
    fn test_point_completes_at_fifth_sample() {
        let mut session = CalibrationSession::new(9);
        for _ in 0..4 {
            assert!(!session.add_sample("point_0_0", GazePoint::CENTER).unwrap());
        }
        assert!(session.add_sample("point_0_0", GazePoint::CENTER).unwrap());
        assert_eq!(session.completed_points(), 1);
    }

    #[test]
    fn test_unknown_point_rejected() {
        let mut session = CalibrationSession::new(9);
        assert_eq!(
            session.add_sample("point_9_9", GazePoint::CENTER),
            Err(CalibrationError::UnknownPoint("point_9_9".into()))
        );
    }

    #[test]
    fn test_finish_requires_eighty_percent() {
        let mut session = CalibrationSession::new(9);
        fill(&mut session, 7);
        assert_eq!(
            session.finish(),
            Err(CalibrationError::Incomplete {
                completed: 7,
                required: 8
            })
        );
        fill(&mut session, 8);
        assert!(session.finish().is_ok());
        assert!(session.status().is_calibrated);
    }

    #[test]
    fn test_status_progress() {
        let mut session = CalibrationSession::new(4);
        fill(&mut session, 1);
        let status = session.status();
        assert_eq!(status.total_points, 4);
        assert_eq!(status.calibrated_points, 1);
        assert_relative_eq!(status.progress, 0.25);
        assert!(!status.is_calibrated);
    }

    #[test]
    fn test_apply_is_identity() {
        let session = CalibrationSession::new(9);
        let g = GazePoint::new(0.1, 0.8);
        assert_eq!(session.apply(g), g);
    }
}
