use serde::Serialize;

use crate::detection::domain::detected_face::{DetectedFace, DetectionMethod};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::domain::face_tracker::FaceTracker;
use crate::detection::infrastructure::known_faces_store::{KnownFacesError, KnownFacesStore};
use crate::shared::constants::FALLBACK_CONFIDENCE;
use crate::shared::frame::Frame;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceLocatorConfig {
    pub confidence_threshold: f64,
    pub max_faces: usize,
    pub tracking_enabled: bool,
    pub recognition_tolerance: f64,
}

impl Default for FaceLocatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_faces: 5,
            tracking_enabled: true,
            recognition_tolerance: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionStats {
    pub total_faces_tracked: usize,
    pub active_faces: usize,
    pub known_faces: usize,
    pub confidence_threshold: f64,
    pub methods: Vec<String>,
}

/// Finds faces in a frame: neural detector first, cascade fallback when it
/// finds nothing, then the face cap and continuity tracking.
pub struct FaceLocator {
    primary: Option<Box<dyn FaceDetector>>,
    fallback: Option<Box<dyn FaceDetector>>,
    embedder: Option<Box<dyn FaceEmbedder>>,
    known_faces: KnownFacesStore,
    tracker: FaceTracker,
    config: FaceLocatorConfig,
}

impl FaceLocator {
    pub fn new(
        primary: Option<Box<dyn FaceDetector>>,
        fallback: Option<Box<dyn FaceDetector>>,
        config: FaceLocatorConfig,
    ) -> Self {
        if primary.is_none() && fallback.is_none() {
            log::warn!("No face detector available; every frame will report no faces");
        }
        Self {
            primary,
            fallback,
            embedder: None,
            known_faces: KnownFacesStore::in_memory(),
            tracker: FaceTracker::default(),
            config,
        }
    }

    pub fn with_recognition(
        mut self,
        embedder: Option<Box<dyn FaceEmbedder>>,
        known_faces: KnownFacesStore,
    ) -> Self {
        self.embedder = embedder;
        self.known_faces = known_faces;
        self
    }

    pub fn detect_faces(&mut self, frame: &Frame) -> Vec<DetectedFace> {
        let threshold = self.config.confidence_threshold;
        let mut faces: Vec<DetectedFace> = run_detector(&mut self.primary, frame)
            .into_iter()
            .filter(|f| f.confidence >= threshold)
            .collect();

        if faces.is_empty() {
            faces = run_detector(&mut self.fallback, frame)
                .into_iter()
                .map(|mut f| {
                    f.confidence = FALLBACK_CONFIDENCE;
                    f
                })
                .collect();
        }

        faces.truncate(self.config.max_faces);

        if self.config.tracking_enabled {
            self.tracker.update(&mut faces);
        }
        faces
    }

    /// Threshold becomes `1 - sensitivity`; rejects values outside [0, 1].
    pub fn set_sensitivity(&mut self, sensitivity: f64) -> bool {
        if !(0.0..=1.0).contains(&sensitivity) {
            log::error!("Sensitivity {sensitivity} out of range [0, 1]");
            return false;
        }
        self.config.confidence_threshold = 1.0 - sensitivity;
        log::info!(
            "Face detection threshold set to {:.2}",
            self.config.confidence_threshold
        );
        true
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.config.confidence_threshold
    }

    /// Name of the first known face matching `face`, if recognition is set up.
    pub fn recognize_face(&mut self, frame: &Frame, face: &DetectedFace) -> Option<String> {
        if self.known_faces.is_empty() {
            return None;
        }
        let embedding = match self.embed_face(frame, face) {
            Ok(e) => e,
            Err(e) => {
                log::debug!("Face recognition skipped: {e}");
                return None;
            }
        };
        self.known_faces
            .find_match(&embedding, self.config.recognition_tolerance)
            .map(str::to_string)
    }

    /// Embed `face` and store it under `name`.
    pub fn add_known_face(
        &mut self,
        name: &str,
        frame: &Frame,
        face: &DetectedFace,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let embedding = self.embed_face(frame, face)?;
        self.known_faces.add(name, embedding)?;
        log::info!("Added known face {name}");
        Ok(())
    }

    pub fn remove_known_face(&mut self, name: &str) -> Result<bool, KnownFacesError> {
        self.known_faces.remove(name)
    }

    pub fn known_face_names(&self) -> Vec<String> {
        self.known_faces.names().into_iter().map(String::from).collect()
    }

    pub fn detection_stats(&self) -> DetectionStats {
        let mut methods = Vec::new();
        if self.primary.is_some() {
            methods.push(DetectionMethod::Neural.to_string());
        }
        if self.fallback.is_some() {
            methods.push(DetectionMethod::Cascade.to_string());
        }
        DetectionStats {
            total_faces_tracked: self.tracker.total(),
            active_faces: self.tracker.active_count(),
            known_faces: self.known_faces.len(),
            confidence_threshold: self.config.confidence_threshold,
            methods,
        }
    }

    fn embed_face(
        &mut self,
        frame: &Frame,
        face: &DetectedFace,
    ) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let embedder = self
            .embedder
            .as_mut()
            .ok_or("face recognition model not loaded")?;
        let b = face.bbox;
        let (crop, w, h) = frame
            .crop(b.x, b.y, b.width, b.height)
            .ok_or("face box lies outside the frame")?;
        embedder.embed(&crop, w, h)
    }
}

/// Detector errors are logged and count as "no faces".
fn run_detector(detector: &mut Option<Box<dyn FaceDetector>>, frame: &Frame) -> Vec<DetectedFace> {
    let Some(detector) = detector.as_mut() else {
        return Vec::new();
    };
    match detector.detect(frame) {
        Ok(faces) => faces,
        Err(e) => {
            log::error!("Face detection failed: {e}");
            Vec::new()
        }
    }
}
