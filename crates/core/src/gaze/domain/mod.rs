pub mod calibration;
pub mod eye_geometry;
pub mod face_landmarker;
pub mod gaze_smoother;
