//! Eye openness and iris-offset gaze from face mesh landmarks.
//!
//! Eye index sets list the six contour points in EAR order: outer corner,
//! two upper-lid points, inner corner, two lower-lid points.

use serde::Serialize;

use crate::shared::constants::EAR_THRESHOLD;

pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
pub const LEFT_IRIS: [usize; 5] = [468, 469, 470, 471, 472];
pub const RIGHT_IRIS: [usize; 5] = [473, 474, 475, 476, 477];

/// Normalized point of regard; both axes in [0, 1], (0.5, 0.5) is straight ahead.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,
}

impl GazePoint {
    pub const CENTER: GazePoint = GazePoint { x: 0.5, y: 0.5 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn centroid(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    Some((sx / n, sy / n))
}

/// Pick `indices` out of `landmarks`, skipping indices the mesh doesn't have.
pub fn select(landmarks: &[(f64, f64)], indices: &[usize]) -> Vec<(f64, f64)> {
    indices
        .iter()
        .filter_map(|&i| landmarks.get(i).copied())
        .collect()
}

/// `(|p1 - p5| + |p2 - p4|) / (2 |p0 - p3|)`; 0 with fewer than six points
/// or a degenerate eye width.
pub fn eye_aspect_ratio(eye: &[(f64, f64)]) -> f64 {
    if eye.len() < 6 {
        return 0.0;
    }
    let width = distance(eye[0], eye[3]);
    if width == 0.0 {
        return 0.0;
    }
    (distance(eye[1], eye[5]) + distance(eye[2], eye[4])) / (2.0 * width)
}

pub fn eyes_open(landmarks: &[(f64, f64)]) -> bool {
    let left = eye_aspect_ratio(&select(landmarks, &LEFT_EYE));
    let right = eye_aspect_ratio(&select(landmarks, &RIGHT_EYE));
    left >= EAR_THRESHOLD && right >= EAR_THRESHOLD
}

/// `0.5 + 2 * (iris - eye)` per axis, clamped to [0, 1].
fn eye_gaze(eye: &[(f64, f64)], iris_center: (f64, f64)) -> GazePoint {
    let Some((ex, ey)) = centroid(eye) else {
        return GazePoint::CENTER;
    };
    GazePoint::new(
        (0.5 + (iris_center.0 - ex) * 2.0).clamp(0.0, 1.0),
        (0.5 + (iris_center.1 - ey) * 2.0).clamp(0.0, 1.0),
    )
}

/// Average of both eyes' gaze; the center when either iris is missing.
pub fn raw_gaze(landmarks: &[(f64, f64)]) -> GazePoint {
    let left_iris = centroid(&select(landmarks, &LEFT_IRIS));
    let right_iris = centroid(&select(landmarks, &RIGHT_IRIS));
    let (Some(li), Some(ri)) = (left_iris, right_iris) else {
        return GazePoint::CENTER;
    };
    let l = eye_gaze(&select(landmarks, &LEFT_EYE), li);
    let r = eye_gaze(&select(landmarks, &RIGHT_EYE), ri);
    GazePoint::new((l.x + r.x) / 2.0, (l.y + r.y) / 2.0)
}
