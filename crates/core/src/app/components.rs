use std::path::Path;

use crate::capture::domain::capture_device::CaptureDevice;
use crate::capture::infrastructure::ffmpeg_capture_device::FfmpegCaptureDevice;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::infrastructure::known_faces_store::KnownFacesStore;
use crate::detection::infrastructure::onnx_arcface_embedder::OnnxArcFaceEmbedder;
use crate::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use crate::detection::infrastructure::rustface_detector::RustfaceDetector;
use crate::gaze::domain::face_landmarker::FaceLandmarker;
use crate::gaze::infrastructure::onnx_face_mesh_landmarker::OnnxFaceMeshLandmarker;
use crate::protection::domain::effect_handler::EffectHandler;
use crate::protection::infrastructure::logging_effect_handler::LoggingEffectHandler;
use crate::settings::config::Config;
use crate::shared::constants::{
    BLAZEFACE_MODEL_NAME, EMBEDDING_MODEL_NAME, FACE_MESH_MODEL_NAME, SEETAFACE_MODEL_NAME,
};
use crate::shared::model_resolver::ModelSource;

/// The pluggable parts of the application: camera, models and screen effects.
pub struct Components {
    pub capture: Box<dyn CaptureDevice>,
    pub primary_detector: Option<Box<dyn FaceDetector>>,
    pub fallback_detector: Option<Box<dyn FaceDetector>>,
    pub landmarker: Option<Box<dyn FaceLandmarker>>,
    pub embedder: Option<Box<dyn FaceEmbedder>>,
    pub known_faces: KnownFacesStore,
    pub effects: Box<dyn EffectHandler>,
}

impl Components {
    /// Real devices and models. A model that cannot be found or loaded is
    /// logged and left out; the application runs with what remains.
    pub fn load(config: &Config, source: &ModelSource) -> Self {
        let gpu = config.performance.gpu_acceleration;

        let primary_detector = load_model(source, BLAZEFACE_MODEL_NAME, "face detection", |p| {
            Ok(Box::new(OnnxBlazefaceDetector::new(p, gpu)?) as Box<dyn FaceDetector>)
        });
        let fallback_detector = load_model(source, SEETAFACE_MODEL_NAME, "fallback face detection", |p| {
            Ok(Box::new(RustfaceDetector::new(p)?) as Box<dyn FaceDetector>)
        });
        let landmarker = if config.gaze_detection.enabled {
            load_model(source, FACE_MESH_MODEL_NAME, "face mesh", |p| {
                Ok(Box::new(OnnxFaceMeshLandmarker::new(p, gpu)?) as Box<dyn FaceLandmarker>)
            })
        } else {
            None
        };
        let embedder = load_model(source, EMBEDDING_MODEL_NAME, "face recognition", |p| {
            Ok(Box::new(OnnxArcFaceEmbedder::new(p, gpu)?) as Box<dyn FaceEmbedder>)
        });
        if config.face_detection.recognition_enabled && embedder.is_none() {
            log::warn!("Face recognition enabled but no embedding model is loaded; nobody will be recognised");
        }

        Self {
            capture: Box::new(FfmpegCaptureDevice::new()),
            primary_detector,
            fallback_detector,
            landmarker,
            embedder,
            known_faces: load_known_faces(),
            effects: Box::new(LoggingEffectHandler::new()),
        }
    }
}

fn load_model<T>(
    source: &ModelSource,
    name: &str,
    purpose: &str,
    build: impl FnOnce(&Path) -> Result<T, Box<dyn std::error::Error>>,
) -> Option<T> {
    let path = match source.resolve(name, None) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("No {purpose} model: {e}");
            return None;
        }
    };
    match build(&path) {
        Ok(model) => {
            log::info!("Loaded {purpose} model from {}", path.display());
            Some(model)
        }
        Err(e) => {
            log::warn!("Failed to load {purpose} model {}: {e}", path.display());
            None
        }
    }
}

fn load_known_faces() -> KnownFacesStore {
    let Some(path) = KnownFacesStore::default_path() else {
        log::warn!("No data directory; known faces will not be saved");
        return KnownFacesStore::in_memory();
    };
    KnownFacesStore::load(&path).unwrap_or_else(|e| {
        log::warn!("Ignoring known faces: {e}");
        KnownFacesStore::in_memory()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_model_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = ModelSource {
            bundled_dir: Some(dir.path().to_path_buf()),
            base_url: None,
        };
        let loaded = load_model(&source, "definitely_absent_model.onnx", "test", |_| Ok(1u8));
        assert_eq!(loaded, None);
    }

    #[test]
    fn test_load_model_build_failure_is_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken_model.onnx"), b"not a model").unwrap();
        let source = ModelSource {
            bundled_dir: Some(dir.path().to_path_buf()),
            base_url: None,
        };
        let loaded: Option<u8> = load_model(&source, "broken_model.onnx", "test", |_| {
            Err("unreadable".into())
        });
        assert_eq!(loaded, None);
    }

    #[test]
    fn test_load_model_passes_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny_model.onnx"), b"x").unwrap();
        let source = ModelSource {
            bundled_dir: Some(dir.path().to_path_buf()),
            base_url: None,
        };
        let loaded = load_model(&source, "tiny_model.onnx", "test", |p| {
            Ok(p.file_name().map(|n| n.to_string_lossy().into_owned()))
        });
        assert_eq!(loaded, Some(Some("tiny_model.onnx".to_string())));
    }
}
