use thiserror::Error;

use crate::capture::domain::capture_settings::CaptureSettings;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera {0} could not be opened: {1}")]
    Open(u32, String),
    #[error("camera is not open")]
    NotOpen,
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("camera capture is not supported on this platform")]
    UnsupportedPlatform,
}

/// Domain interface for a live camera.
///
/// Implementations are driven from the capture thread only, hence `Send`
/// and `&mut self`.
pub trait CaptureDevice: Send {
    fn open(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError>;
    fn read(&mut self) -> Result<Frame, CaptureError>;
    fn is_open(&self) -> bool;
    fn release(&mut self);
}
