use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::domain::capture_device::CaptureDevice;
use crate::capture::domain::capture_settings::{CaptureSettings, Resolution, MAX_FPS, MIN_FPS};
use crate::shared::constants::STOP_JOIN_TIMEOUT;
use crate::shared::frame::Frame;
use crate::shared::thread_util::{join_with_timeout, lock};

const READ_RETRY_DELAY: Duration = Duration::from_millis(10);
const FPS_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub is_running: bool,
    pub is_opened: bool,
    pub device_index: u32,
    pub resolution: String,
    pub fps: u32,
    pub current_fps: f64,
    pub platform: String,
}

/// Owns a capture device and keeps the most recent frame available.
///
/// A background thread reads from the device at the configured rate and
/// swaps each frame into a single shared slot; consumers clone out of it
/// with [`FrameSource::get_frame`] and never wait on the camera.
pub struct FrameSource {
    device: Mutex<Option<Box<dyn CaptureDevice>>>,
    settings: Arc<Mutex<CaptureSettings>>,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    current_fps: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<Box<dyn CaptureDevice>>>>,
}

impl FrameSource {
    pub fn new(device: Box<dyn CaptureDevice>, settings: CaptureSettings) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            settings: Arc::new(Mutex::new(settings)),
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            current_fps: Arc::new(AtomicU64::new(0f64.to_bits())),
            worker: Mutex::new(None),
        }
    }

    /// Open the device and start the capture thread.
    pub fn start(&self) -> bool {
        if self.is_running() {
            log::debug!("Frame source already running");
            return true;
        }

        let Some(mut device) = lock(&self.device).take() else {
            log::error!("Capture device unavailable (previous capture thread never exited)");
            return false;
        };

        let settings = lock(&self.settings).clone();
        if let Err(e) = device.open(&settings) {
            log::error!("Failed to start camera: {e}");
            *lock(&self.device) = Some(device);
            return false;
        }

        self.running.store(true, Ordering::SeqCst);
        let handle = spawn_capture_loop(
            device,
            self.settings.clone(),
            self.latest.clone(),
            self.running.clone(),
            self.current_fps.clone(),
        );
        *lock(&self.worker) = Some(handle);
        log::info!(
            "Camera {} started ({}, {} fps)",
            settings.device_index,
            settings.resolution,
            settings.fps
        );
        true
    }

    /// Stop the capture thread and release the device. Safe to call repeatedly.
    pub fn stop(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = lock(&self.worker).take() else {
            return true;
        };

        match join_with_timeout(handle, STOP_JOIN_TIMEOUT) {
            Some(mut device) => {
                device.release();
                *lock(&self.device) = Some(device);
            }
            None => log::warn!("Capture thread did not exit cleanly; device left to the thread"),
        }
        self.current_fps.store(0f64.to_bits(), Ordering::Relaxed);
        log::info!("Camera stopped");
        true
    }

    /// Clone of the most recent frame, if any has been captured.
    pub fn get_frame(&self) -> Option<Frame> {
        lock(&self.latest).clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames per second actually delivered, recomputed once per second.
    pub fn current_fps(&self) -> f64 {
        f64::from_bits(self.current_fps.load(Ordering::Relaxed))
    }

    pub fn settings(&self) -> CaptureSettings {
        lock(&self.settings).clone()
    }

    /// Switch resolution by name, restarting capture if it is running.
    pub fn set_resolution(&self, name: &str) -> bool {
        let Some(resolution) = Resolution::from_name(name) else {
            log::error!("Unsupported resolution {name:?}");
            return false;
        };
        lock(&self.settings).resolution = resolution;
        if self.is_running() {
            self.stop();
            return self.start();
        }
        true
    }

    /// Change the target frame rate; accepted range is 1..=60.
    pub fn set_fps(&self, fps: u32) -> bool {
        if !(MIN_FPS..=MAX_FPS).contains(&fps) {
            log::error!("Invalid fps {fps}, must be between {MIN_FPS} and {MAX_FPS}");
            return false;
        }
        lock(&self.settings).fps = fps;
        true
    }

    pub fn status(&self) -> CameraStatus {
        let settings = self.settings();
        let running = self.is_running();
        let opened = running
            || lock(&self.device)
                .as_ref()
                .map(|d| d.is_open())
                .unwrap_or(false);
        CameraStatus {
            is_running: running,
            is_opened: opened,
            device_index: settings.device_index,
            resolution: settings.resolution.to_string(),
            fps: settings.fps,
            current_fps: self.current_fps(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn spawn_capture_loop(
    mut device: Box<dyn CaptureDevice>,
    settings: Arc<Mutex<CaptureSettings>>,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
    current_fps: Arc<AtomicU64>,
) -> JoinHandle<Box<dyn CaptureDevice>> {
    std::thread::spawn(move || {
        let mut window_start = Instant::now();
        let mut frames_in_window: u32 = 0;

        while running.load(Ordering::SeqCst) {
            let current = lock(&settings).clone();
            match device.read() {
                Ok(mut frame) => {
                    if current.flip_horizontal {
                        frame.mirror_horizontal();
                    }
                    *lock(&latest) = Some(frame);
                    frames_in_window += 1;
                }
                Err(e) => {
                    log::warn!("Failed to read frame from camera: {e}");
                    std::thread::sleep(READ_RETRY_DELAY);
                    continue;
                }
            }

            let elapsed = window_start.elapsed();
            if elapsed >= FPS_WINDOW {
                let fps = frames_in_window as f64 / elapsed.as_secs_f64();
                current_fps.store(fps.to_bits(), Ordering::Relaxed);
                frames_in_window = 0;
                window_start = Instant::now();
            }

            std::thread::sleep(current.frame_interval());
        }

        device.release();
        device
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::capture_device::CaptureError;
    use std::sync::atomic::AtomicUsize;

    /// Produces 2x1 frames whose first byte is the frame index.
    struct FakeDevice {
        open: bool,
        fail_open: bool,
        fail_reads: bool,
        next: usize,
        releases: Arc<AtomicUsize>,
    }

    impl FakeDevice {
        fn boxed(releases: Arc<AtomicUsize>) -> Box<dyn CaptureDevice> {
            Box::new(Self {
                open: false,
                fail_open: false,
                fail_reads: false,
                next: 0,
                releases,
            })
        }
    }

    impl CaptureDevice for FakeDevice {
        fn open(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
            if self.fail_open {
                return Err(CaptureError::Open(settings.device_index, "no camera".into()));
            }
            self.open = true;
            Ok(())
        }

        fn read(&mut self) -> Result<Frame, CaptureError> {
            if self.fail_reads {
                return Err(CaptureError::Read("unplugged".into()));
            }
            let i = self.next;
            self.next += 1;
            Ok(Frame::new(vec![i as u8, 0, 0, 9, 9, 9], 2, 1, 3, i))
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn release(&mut self) {
            self.open = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_settings(flip: bool) -> CaptureSettings {
        CaptureSettings {
            fps: 60,
            flip_horizontal: flip,
            ..Default::default()
        }
    }

    fn wait_for_frame(source: &FrameSource) -> Option<Frame> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(f) = source.get_frame() {
                return Some(f);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_no_frame_before_start() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(false),
        );
        assert!(source.get_frame().is_none());
        assert!(!source.is_running());
    }

    #[test]
    fn test_start_delivers_frames_and_stop_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        let source = FrameSource::new(FakeDevice::boxed(releases.clone()), fast_settings(false));

        assert!(source.start());
        assert!(source.is_running());
        let frame = wait_for_frame(&source).expect("frame within 2s");
        assert_eq!(frame.width(), 2);

        assert!(source.stop());
        assert!(!source.is_running());
        assert!(releases.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(false),
        );
        assert!(source.stop());
        assert!(source.start());
        assert!(source.stop());
        assert!(source.stop());
    }

    #[test]
    fn test_restart_after_stop() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(false),
        );
        assert!(source.start());
        assert!(source.stop());
        assert!(source.start());
        assert!(wait_for_frame(&source).is_some());
        source.stop();
    }

    #[test]
    fn test_frames_are_mirrored_when_flip_enabled() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(true),
        );
        assert!(source.start());
        let frame = wait_for_frame(&source).unwrap();
        source.stop();
        // Second pixel (9,9,9) moves to the front
        assert_eq!(&frame.data()[0..3], &[9, 9, 9]);
    }

    #[test]
    fn test_open_failure_returns_false_and_keeps_device() {
        let device = Box::new(FakeDevice {
            open: false,
            fail_open: true,
            fail_reads: false,
            next: 0,
            releases: Arc::new(AtomicUsize::new(0)),
        });
        let source = FrameSource::new(device, fast_settings(false));
        assert!(!source.start());
        assert!(!source.is_running());
        // Device is still owned, so a second attempt reaches open() again
        assert!(!source.start());
    }

    #[test]
    fn test_read_failures_keep_loop_alive() {
        let device = Box::new(FakeDevice {
            open: false,
            fail_open: false,
            fail_reads: true,
            next: 0,
            releases: Arc::new(AtomicUsize::new(0)),
        });
        let source = FrameSource::new(device, fast_settings(false));
        assert!(source.start());
        std::thread::sleep(Duration::from_millis(50));
        assert!(source.is_running());
        assert!(source.get_frame().is_none());
        assert!(source.stop());
    }

    #[test]
    fn test_set_fps_range() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(false),
        );
        assert!(source.set_fps(1));
        assert!(source.set_fps(60));
        assert!(!source.set_fps(0));
        assert!(!source.set_fps(61));
        assert_eq!(source.settings().fps, 60);
    }

    #[test]
    fn test_set_resolution_rejects_unknown() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(false),
        );
        assert!(!source.set_resolution("8k"));
        assert!(source.set_resolution("1080p"));
        assert_eq!(source.settings().resolution, Resolution::Hd1080);
    }

    #[test]
    fn test_set_resolution_restarts_running_source() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(false),
        );
        assert!(source.start());
        assert!(source.set_resolution("480p"));
        assert!(source.is_running());
        assert_eq!(source.status().resolution, "480p");
        source.stop();
    }

    #[test]
    fn test_status_reflects_settings() {
        let source = FrameSource::new(
            FakeDevice::boxed(Arc::new(AtomicUsize::new(0))),
            fast_settings(false),
        );
        let status = source.status();
        assert!(!status.is_running);
        assert!(!status.is_opened);
        assert_eq!(status.device_index, 0);
        assert_eq!(status.resolution, "720p");
        assert_eq!(status.fps, 60);
        assert_eq!(status.platform, std::env::consts::OS);
    }
}
