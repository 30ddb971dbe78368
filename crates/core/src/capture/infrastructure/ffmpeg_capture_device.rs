use crate::capture::domain::capture_device::{CaptureDevice, CaptureError};
use crate::capture::domain::capture_settings::CaptureSettings;
use crate::shared::frame::Frame;

/// Fraction of the requested resolution below which a warning is logged.
const MIN_RESOLUTION_RATIO: f64 = 0.8;

/// Live camera input through libavdevice (`v4l2`, `avfoundation`, `vfwcap`).
///
/// Every decoded frame is converted to RGB24 and wrapped in a [`Frame`].
pub struct FfmpegCaptureDevice {
    session: Option<Session>,
    frame_index: usize,
}

struct Session {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: the device is owned by the capture thread once started; the raw
// ffmpeg pointers are never shared between threads.
unsafe impl Send for FfmpegCaptureDevice {}

impl FfmpegCaptureDevice {
    pub fn new() -> Self {
        Self {
            session: None,
            frame_index: 0,
        }
    }
}

impl Default for FfmpegCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for FfmpegCaptureDevice {
    fn open(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        let index = settings.device_index;
        let open_err = |e: ffmpeg_next::Error| CaptureError::Open(index, e.to_string());

        ffmpeg_next::init().map_err(open_err)?;
        ffmpeg_next::device::register_all();

        let (format_name, url) = platform_input(index)?;
        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == format_name)
            .ok_or_else(|| {
                CaptureError::Open(index, format!("input format {format_name} unavailable"))
            })?;

        let (req_w, req_h) = settings.resolution.dimensions();
        let mut options = ffmpeg_next::Dictionary::new();
        options.set("video_size", &format!("{req_w}x{req_h}"));
        options.set("framerate", &settings.fps.to_string());

        let ictx = ffmpeg_next::format::open_with(&url, &format, options)
            .map_err(open_err)?
            .input();

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::Open(index, "no video stream".into()))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err)?;
        let decoder = codec_ctx.decoder().video().map_err(open_err)?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;

        self.session = Some(Session {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        });
        self.frame_index = 0;

        // Test read: the device must actually deliver frames.
        let first_frame = match self.read() {
            Ok(frame) => frame,
            Err(e) => {
                self.release();
                return Err(CaptureError::Open(index, format!("test read failed: {e}")));
            }
        };
        if resolution_too_low((first_frame.width(), first_frame.height()), (req_w, req_h)) {
            log::warn!(
                "Camera delivers {}x{}, requested {req_w}x{req_h}",
                first_frame.width(),
                first_frame.height()
            );
        }
        log::info!(
            "Camera {index} opened via {format_name} at {}x{} @ {} fps",
            first_frame.width(),
            first_frame.height(),
            settings.fps
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let session = self.session.as_mut().ok_or(CaptureError::NotOpen)?;
        let pixels = session.next_rgb()?;
        let frame = Frame::new(pixels, session.width, session.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(frame)
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn release(&mut self) {
        if self.session.take().is_some() {
            log::info!("Camera released");
        }
    }
}

impl Session {
    fn next_rgb(&mut self) -> Result<Vec<u8>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb)
                    .map_err(|e| CaptureError::Read(e.to_string()))?;
                return Ok(extract_rgb_pixels(&rgb, self.width, self.height));
            }

            let mut packet = ffmpeg_next::Packet::empty();
            packet
                .read(&mut self.ictx)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            if packet.stream() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
        }
    }
}

/// Input format name and device URL for camera `index` on this platform.
fn platform_input(index: u32) -> Result<(&'static str, String), CaptureError> {
    #[cfg(target_os = "linux")]
    {
        Ok(("video4linux2,v4l2", format!("/dev/video{index}")))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(("avfoundation", index.to_string()))
    }
    #[cfg(target_os = "windows")]
    {
        Ok(("vfwcap", index.to_string()))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = index;
        Err(CaptureError::UnsupportedPlatform)
    }
}

fn resolution_too_low(actual: (u32, u32), requested: (u32, u32)) -> bool {
    (actual.0 as f64) < requested.0 as f64 * MIN_RESOLUTION_RATIO
        || (actual.1 as f64) < requested.1 as f64 * MIN_RESOLUTION_RATIO
}

/// Copies an RGB24 ffmpeg frame into a tightly packed buffer, dropping the
/// per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
