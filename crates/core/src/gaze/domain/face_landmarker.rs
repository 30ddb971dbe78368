use crate::detection::domain::detected_face::DetectedFace;
use crate::shared::frame::Frame;

/// Domain interface for dense facial landmarks.
///
/// Points are normalized to the frame (`x / width`, `y / height`) and
/// indexed the way the face mesh topology defines them. `Ok(None)` means
/// the model ran but found no face in the crop.
pub trait FaceLandmarker: Send {
    fn landmarks(
        &mut self,
        frame: &Frame,
        face: &DetectedFace,
    ) -> Result<Option<Vec<(f64, f64)>>, Box<dyn std::error::Error>>;
}
