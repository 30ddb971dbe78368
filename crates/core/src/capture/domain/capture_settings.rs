use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    Sd480,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
}

impl Resolution {
    pub const ALL: &[Resolution] = &[Resolution::Sd480, Resolution::Hd720, Resolution::Hd1080];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "480p" => Some(Resolution::Sd480),
            "720p" => Some(Resolution::Hd720),
            "1080p" => Some(Resolution::Hd1080),
            _ => None,
        }
    }

    /// Like [`Resolution::from_name`], falling back to 720p for unknown names.
    pub fn from_name_or_default(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            log::warn!("Unknown camera resolution {name:?}, using 720p");
            Resolution::Hd720
        })
    }

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Sd480 => (640, 480),
            Resolution::Hd720 => (1280, 720),
            Resolution::Hd1080 => (1920, 1080),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Resolution::Sd480 => "480p",
            Resolution::Hd720 => "720p",
            Resolution::Hd1080 => "1080p",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 60;

/// Parameters the capture device is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub device_index: u32,
    pub resolution: Resolution,
    pub fps: u32,
    pub flip_horizontal: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: Resolution::Hd720,
            fps: 30,
            flip_horizontal: true,
        }
    }
}

impl CaptureSettings {
    /// Time budget for one capture iteration.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps.clamp(MIN_FPS, MAX_FPS) as f64)
    }
}
