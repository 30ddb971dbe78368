/// ArcFace identity embeddings using ONNX Runtime.
use std::path::Path;

use crate::detection::domain::face_embedder::{l2_normalize, FaceEmbedder};
use crate::shared::onnx_session::load_session;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceEmbedder {
    session: ort::session::Session,
}

impl OnnxArcFaceEmbedder {
    pub fn new(model_path: &Path, gpu_acceleration: bool) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: load_session(model_path, gpu_acceleration)?,
        })
    }
}

impl FaceEmbedder for OnnxArcFaceEmbedder {
    fn embed(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        if width == 0 || height == 0 {
            return Err("empty face crop".into());
        }
        let tensor = preprocess(rgb, width, height);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let mut embedding = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?
            .to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Resize crop to 112x112, normalize to [-1, 1], NCHW layout.
fn preprocess(rgb: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }
    tensor
}
