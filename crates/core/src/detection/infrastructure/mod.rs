pub mod known_faces_store;
pub mod onnx_arcface_embedder;
pub mod onnx_blazeface_detector;
pub mod rustface_detector;
