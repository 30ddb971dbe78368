use std::time::Instant;

use ndarray::{ArrayView3, ArrayViewMut3};

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at the capture boundary only; detection and
/// gaze code read pixels through [`Frame::as_ndarray`] or the raw slice.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            captured_at: Instant::now(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Sequence number assigned by the capture device.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Mirrors the frame around its vertical axis in place.
    pub fn mirror_horizontal(&mut self) {
        let row_len = self.width as usize * self.channels as usize;
        let ch = self.channels as usize;
        if row_len == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(row_len) {
            let w = row.len() / ch;
            for x in 0..w / 2 {
                let (a, b) = (x * ch, (w - 1 - x) * ch);
                for c in 0..ch {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    /// Luma plane (BT.601 weights), one byte per pixel.
    pub fn to_gray(&self) -> Vec<u8> {
        if self.channels == 1 {
            return self.data.clone();
        }
        self.data
            .chunks_exact(self.channels as usize)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().min(255.0) as u8
            })
            .collect()
    }

    /// Copies out the pixels inside `(x, y, w, h)`, clipped to the frame.
    ///
    /// Returns `None` when the clipped rectangle is empty.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<(Vec<u8>, u32, u32)> {
        let x2 = x.saturating_add(w).min(self.width);
        let y2 = y.saturating_add(h).min(self.height);
        if x >= x2 || y >= y2 {
            return None;
        }
        let ch = self.channels as usize;
        let cw = (x2 - x) as usize;
        let mut out = Vec::with_capacity(cw * (y2 - y) as usize * ch);
        for row in y..y2 {
            let start = (row as usize * self.width as usize + x as usize) * ch;
            out.extend_from_slice(&self.data[start..start + cw * ch]);
        }
        Some((out, x2 - x, y2 - y))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    fn test_clone_is_independent() {
        let data = vec![100u8; 12];
        let frame = Frame::new(data, 2, 2, 3, 0);
        let mut cloned = frame.clone();
        cloned.data_mut()[0] = 0;
        assert_eq!(frame.data()[0], 100);
        assert_eq!(cloned.data()[0], 0);
        assert_eq!(frame.captured_at(), cloned.captured_at());
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        let mut data = vec![0u8; 12];
        data[6] = 255; // row=1, col=0, R
        let frame = Frame::new(data, 2, 2, 3, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[2, 2, 3]);
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 0);
    }

    #[test]
    fn test_mirror_horizontal_swaps_columns() {
        // 3x1 RGB: red, green, blue
        let data = vec![255, 0, 0, 0, 255, 0, 0, 0, 255];
        let mut frame = Frame::new(data, 3, 1, 3, 0);
        frame.mirror_horizontal();
        assert_eq!(frame.data(), &[0, 0, 255, 0, 255, 0, 255, 0, 0]);
    }

    #[test]
    fn test_mirror_twice_is_identity() {
        let data: Vec<u8> = (0..24).collect(); // 4x2x3
        let mut frame = Frame::new(data.clone(), 4, 2, 3, 0);
        frame.mirror_horizontal();
        frame.mirror_horizontal();
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    fn test_to_gray_white_and_black() {
        let data = vec![255, 255, 255, 0, 0, 0];
        let frame = Frame::new(data, 2, 1, 3, 0);
        assert_eq!(frame.to_gray(), vec![255, 0]);
    }

    #[test]
    fn test_crop_inside() {
        let data: Vec<u8> = (0..(4 * 4 * 3) as u8).collect();
        let frame = Frame::new(data, 4, 4, 3, 0);
        let (pixels, w, h) = frame.crop(1, 1, 2, 2).unwrap();
        assert_eq!((w, h), (2, 2));
        // first pixel of crop is (row=1, col=1)
        assert_eq!(&pixels[0..3], &[15, 16, 17]);
    }

    #[test]
    fn test_crop_clipped_at_edge() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3, 0);
        let (_, w, h) = frame.crop(3, 3, 10, 10).unwrap();
        assert_eq!((w, h), (1, 1));
    }

    #[test]
    fn test_crop_outside_is_none() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3, 0);
        assert!(frame.crop(4, 0, 2, 2).is_none());
    }
}
