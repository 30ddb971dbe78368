/// Dense face mesh (468 points + 10 iris points) using ONNX Runtime.
///
/// The model sees a square-ish crop around the detected face and returns
/// landmark coordinates in input pixels; they are mapped back to
/// frame-normalized coordinates here.
use std::path::Path;

use crate::detection::domain::detected_face::{BoundingBox, DetectedFace};
use crate::gaze::domain::face_landmarker::FaceLandmarker;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::load_session;

const INPUT_SIZE: usize = 192;

/// Extra context around the detector box, per side, as a fraction of its size.
const CROP_MARGIN: f64 = 0.25;

pub const NUM_LANDMARKS: usize = 478;

/// Minimum face-presence probability from the model's second output.
const MIN_PRESENCE: f32 = 0.5;

pub struct OnnxFaceMeshLandmarker {
    session: ort::session::Session,
}

impl OnnxFaceMeshLandmarker {
    pub fn new(model_path: &Path, gpu_acceleration: bool) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: load_session(model_path, gpu_acceleration)?,
        })
    }
}

impl FaceLandmarker for OnnxFaceMeshLandmarker {
    fn landmarks(
        &mut self,
        frame: &Frame,
        face: &DetectedFace,
    ) -> Result<Option<Vec<(f64, f64)>>, Box<dyn std::error::Error>> {
        let crop_box = face
            .bbox
            .expanded(CROP_MARGIN, frame.width(), frame.height());
        let Some((crop, cw, ch)) =
            frame.crop(crop_box.x, crop_box.y, crop_box.width, crop_box.height)
        else {
            return Ok(None);
        };

        let tensor = preprocess(&crop, cw, ch);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        if outputs.len() > 1 {
            let presence = outputs[1].try_extract_array::<f32>()?;
            if let Some(&logit) = presence.iter().next() {
                if sigmoid(logit) < MIN_PRESENCE {
                    return Ok(None);
                }
            }
        }

        let raw = outputs[0].try_extract_array::<f32>()?;
        let values = raw.as_slice().ok_or("Cannot get landmark slice")?;
        if values.len() < NUM_LANDMARKS * 3 {
            return Err(format!(
                "face mesh model returned {} values, expected {}",
                values.len(),
                NUM_LANDMARKS * 3
            )
            .into());
        }

        let BoundingBox { x, y, .. } = crop_box;
        Ok(Some(to_frame_normalized(
            values,
            (x, y, cw, ch),
            frame.width(),
            frame.height(),
        )))
    }
}

/// Resize crop to 192x192, scale to [0,1], NHWC layout.
fn preprocess(rgb: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, INPUT_SIZE, INPUT_SIZE, 3));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            for c in 0..3 {
                tensor[[0, y, x, c]] = rgb[offset + c] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// `values` holds `(x, y, z)` triples in model input pixels.
fn to_frame_normalized(
    values: &[f32],
    crop: (u32, u32, u32, u32),
    frame_w: u32,
    frame_h: u32,
) -> Vec<(f64, f64)> {
    let (cx, cy, cw, ch) = crop;
    let sx = cw as f64 / INPUT_SIZE as f64;
    let sy = ch as f64 / INPUT_SIZE as f64;
    values
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|p| {
            let fx = cx as f64 + p[0] as f64 * sx;
            let fy = cy as f64 + p[1] as f64 * sy;
            (fx / frame_w as f64, fy / frame_h as f64)
        })
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
