pub mod domain;
pub mod gaze_estimator;
pub mod infrastructure;
