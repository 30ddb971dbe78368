pub mod onnx_face_mesh_landmarker;
