use serde::{Deserialize, Serialize};

/// Axis-aligned face box in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Integer center, `(x + w/2, y + h/2)`.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Grow by `ratio` of the size on every side, clipped to `(frame_w, frame_h)`.
    pub fn expanded(&self, ratio: f64, frame_w: u32, frame_h: u32) -> BoundingBox {
        let mx = (self.width as f64 * ratio).round() as u32;
        let my = (self.height as f64 * ratio).round() as u32;
        let x1 = self.x.saturating_sub(mx);
        let y1 = self.y.saturating_sub(my);
        let x2 = (self.x + self.width + mx).min(frame_w);
        let y2 = (self.y + self.height + my).min(frame_h);
        BoundingBox::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMethod {
    /// Primary neural detector.
    #[serde(rename = "blazeface")]
    Neural,
    /// Classical cascade fallback.
    #[serde(rename = "seetaface")]
    Cascade,
}

impl DetectionMethod {
    pub const ALL: &[DetectionMethod] = &[DetectionMethod::Neural, DetectionMethod::Cascade];

    pub fn name(self) -> &'static str {
        match self {
            DetectionMethod::Neural => "blazeface",
            DetectionMethod::Cascade => "seetaface",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One face found in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// Pixel coordinates; order depends on the detector.
    pub landmarks: Vec<(f64, f64)>,
    pub method: DetectionMethod,
    pub tracking_id: Option<u32>,
}

impl DetectedFace {
    pub fn new(
        bbox: BoundingBox,
        confidence: f64,
        landmarks: Vec<(f64, f64)>,
        method: DetectionMethod,
    ) -> Self {
        Self {
            bbox,
            confidence,
            landmarks,
            method,
            tracking_id: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }

    pub fn center(&self) -> (u32, u32) {
        self.bbox.center()
    }

    pub fn area(&self) -> u64 {
        self.bbox.area()
    }
}
