/// BlazeFace short-range face detector using ONNX Runtime via `ort`.
///
/// Produces boxes plus the six BlazeFace keypoints (eyes, nose, mouth,
/// ears) in frame pixels. Confidence filtering against the user threshold
/// happens in the locator; only a low candidate floor is applied here.
use std::path::Path;

use crate::detection::domain::detected_face::{BoundingBox, DetectedFace, DetectionMethod};
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::load_session;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Candidates below this score are dropped before NMS.
pub const MIN_CANDIDATE_SCORE: f32 = 0.1;

const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

const NUM_KEYPOINTS: usize = 6;

/// Values per anchor in the regressor output: 4 box + 6 * 2 keypoints.
const REG_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, gpu_acceleration: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path, gpu_acceleration)?;
        Ok(Self {
            session,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
        let input_tensor = preprocess(frame, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors [1, 896, 16], classificators [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut candidates = decode(
            reg_data,
            score_data,
            &self.anchors,
            frame.width(),
            frame.height(),
            MIN_CANDIDATE_SCORE,
        );
        let kept = nms(&mut candidates, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .map(|d| d.into_face(frame.width(), frame.height()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

// ---------------------------------------------------------------------------
// Anchors and decoding
// ---------------------------------------------------------------------------

/// Short-range anchors: a 16×16 grid with 2 anchors per cell followed by an
/// 8×8 grid with 6 anchors per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
    keypoints: Vec<(f64, f64)>,
}

impl RawDet {
    fn into_face(self, fw: u32, fh: u32) -> DetectedFace {
        // x1/y1 are clamped to >= 0 during decoding
        let x = (self.x1 as u32).min(fw.saturating_sub(1));
        let y = (self.y1 as u32).min(fh.saturating_sub(1));
        let w = ((self.x2 - self.x1).max(0.0) as u32).min(fw - x);
        let h = ((self.y2 - self.y1).max(0.0) as u32).min(fh - y);
        DetectedFace::new(
            BoundingBox::new(x, y, w, h),
            self.score.clamp(0.0, 1.0),
            self.keypoints,
            DetectionMethod::Neural,
        )
    }
}

fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    fw: u32,
    fh: u32,
    min_score: f32,
) -> Vec<RawDet> {
    let size = INPUT_SIZE as f32;
    let (fwf, fhf) = (fw as f32, fh as f32);
    let mut dets = Vec::new();

    for (i, &raw_score) in score_data.iter().enumerate().take(anchors.len()) {
        let score = sigmoid(raw_score);
        if score < min_score {
            continue;
        }
        let off = i * REG_STRIDE;
        if off + REG_STRIDE > reg_data.len() {
            break;
        }
        let anchor = anchors[i];

        let cx = anchor[0] + reg_data[off] / size;
        let cy = anchor[1] + reg_data[off + 1] / size;
        let w = reg_data[off + 2] / size;
        let h = reg_data[off + 3] / size;

        let keypoints = (0..NUM_KEYPOINTS)
            .map(|k| {
                let kx = anchor[0] + reg_data[off + 4 + 2 * k] / size;
                let ky = anchor[1] + reg_data[off + 5 + 2 * k] / size;
                ((kx * fwf) as f64, (ky * fhf) as f64)
            })
            .collect();

        dets.push(RawDet {
            x1: ((cx - w / 2.0) * fwf).max(0.0) as f64,
            y1: ((cy - h / 2.0) * fhf).max(0.0) as f64,
            x2: ((cx + w / 2.0) * fwf).min(fwf) as f64,
            y2: ((cy + h / 2.0) * fhf).min(fhf) as f64,
            score: score as f64,
            keypoints,
        });
    }
    dets
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];
    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
