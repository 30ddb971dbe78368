use std::time::Duration;

/// Directory name used under the platform cache/data/home directories.
pub const APP_DIR_NAME: &str = "SafeView";

/// Environment variable holding the base URL models are downloaded from.
pub const MODEL_BASE_URL_ENV: &str = "SAFEVIEW_MODEL_BASE_URL";

pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const SEETAFACE_MODEL_NAME: &str = "seeta_fd_frontal_v1.0.bin";
pub const FACE_MESH_MODEL_NAME: &str = "face_mesh_with_iris.onnx";
pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";

/// Confidence reported for every face found by the cascade fallback.
pub const FALLBACK_CONFIDENCE: f64 = 0.8;

/// A tracked record only follows a face whose center is closer than this (pixels).
pub const TRACKING_MAX_DISTANCE: f64 = 100.0;

/// Consecutive misses tolerated before a tracked record is retired.
pub const TRACKING_MAX_LOST: u32 = 10;

/// Eye aspect ratio below which an eye counts as closed.
pub const EAR_THRESHOLD: f64 = 0.2;

pub const GAZE_HISTORY_LEN: usize = 5;

pub const CALIBRATION_SAMPLES_PER_POINT: usize = 5;

/// Fraction of calibration points that must be completed.
pub const CALIBRATION_MIN_COMPLETION: f64 = 0.8;

/// Upper bound on waiting for a worker thread to exit.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub const KNOWN_FACES_FILE: &str = "known_faces.json";
