use std::io::BufReader;
use std::path::Path;

use crate::detection::domain::detected_face::{BoundingBox, DetectedFace, DetectionMethod};
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::FALLBACK_CONFIDENCE;
use crate::shared::frame::Frame;

const MIN_FACE_SIZE: u32 = 20;

/// Fallback detector backed by the `rustface` crate (SeetaFace funnel cascade).
///
/// The cascade's raw score is not a probability, so every face is reported
/// with [`FALLBACK_CONFIDENCE`] and approximate landmarks derived from the box.
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file = std::fs::File::open(model_path)
            .map_err(|e| format!("cannot open {}: {e}", model_path.display()))?;
        let model = rustface::read_model(BufReader::new(file))?;
        Ok(Self { model })
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
        let gray = frame.to_gray();
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(&gray, frame.width(), frame.height()));
        Ok(faces
            .iter()
            .filter_map(|face| {
                let b = face.bbox();
                clamp_box(b.x(), b.y(), b.width(), b.height(), frame.width(), frame.height())
            })
            .map(|bbox| {
                DetectedFace::new(
                    bbox,
                    FALLBACK_CONFIDENCE,
                    approximate_landmarks(&bbox),
                    DetectionMethod::Cascade,
                )
            })
            .collect())
    }
}

/// Clip a possibly negative cascade box to the frame; `None` if nothing is left.
fn clamp_box(x: i32, y: i32, w: u32, h: u32, fw: u32, fh: u32) -> Option<BoundingBox> {
    let x1 = x.max(0) as u32;
    let y1 = y.max(0) as u32;
    let x2 = (x + w as i32).clamp(0, fw as i32) as u32;
    let y2 = (y + h as i32).clamp(0, fh as i32) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
}

/// Eye, eye, nose, mouth positions on the vertical center line of the box.
fn approximate_landmarks(b: &BoundingBox) -> Vec<(f64, f64)> {
    let cx = b.x as f64 + b.width as f64 / 2.0;
    let y = b.y as f64;
    let h = b.height as f64;
    vec![
        (cx, y + h / 3.0),
        (cx, y + h / 3.0),
        (cx, y + h / 2.0),
        (cx, y + 2.0 * h / 3.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case::inside(10, 10, 20, 20, Some(BoundingBox::new(10, 10, 20, 20)))]
    #[case::negative_origin(-5, -5, 20, 20, Some(BoundingBox::new(0, 0, 15, 15)))]
    #[case::past_right_edge(90, 0, 20, 20, Some(BoundingBox::new(90, 0, 10, 20)))]
    #[case::fully_outside(-30, 0, 20, 20, None)]
    fn test_clamp_box(
        #[case] x: i32,
        #[case] y: i32,
        #[case] w: u32,
        #[case] h: u32,
        #[case] expected: Option<BoundingBox>,
    ) {
        assert_eq!(clamp_box(x, y, w, h, 100, 100), expected);
    }

    #[test]
    fn test_approximate_landmarks() {
        let lm = approximate_landmarks(&BoundingBox::new(0, 0, 60, 90));
        assert_eq!(lm.len(), 4);
        assert_relative_eq!(lm[0].0, 30.0);
        assert_relative_eq!(lm[0].1, 30.0);
        assert_eq!(lm[0], lm[1]);
        assert_relative_eq!(lm[2].1, 45.0);
        assert_relative_eq!(lm[3].1, 60.0);
    }

    #[test]
    fn test_missing_model_is_error() {
        assert!(RustfaceDetector::new(Path::new("/nonexistent/seeta.bin")).is_err());
    }
}
