//! Synthetic chat UI frames and scriptable surfaces
//!
//! The frames imitate a messaging screen: a light background, message
//! bubbles that appear one by one on alternating sides, and a pulsing typing
//! indicator. Enough structure to give the quantizer and the encoders
//! realistic work without shipping screenshots.

use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::capture::{scaled_size, Surface};
use crate::errors::ExportError;
use crate::types::Frame;

const BACKGROUND: Rgba<u8> = Rgba([242, 242, 247, 255]);
const HEADER: Rgba<u8> = Rgba([28, 28, 30, 255]);
const OUTGOING: Rgba<u8> = Rgba([0, 122, 255, 255]);
const INCOMING: Rgba<u8> = Rgba([229, 229, 234, 255]);
const TEXT_LIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TEXT_DARK: Rgba<u8> = Rgba([60, 60, 67, 255]);

/// Frames between two new chat bubbles
pub const FRAMES_PER_MESSAGE: u64 = 6;

fn fill_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y.min(y_end)..y_end {
        for px in x.min(x_end)..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

/// Render step `index` of the chat animation at `width × height`.
pub fn synthetic_chat_image(index: u64, width: u32, height: u32) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);
    let unit = (height / 24).max(1);

    fill_rect(&mut img, 0, 0, width, unit * 2, HEADER);

    let visible = (index / FRAMES_PER_MESSAGE + 1) as u32;
    let bubble_h = unit * 2;
    let mut y = unit * 3;
    for message in 0..visible {
        if y + bubble_h >= height.saturating_sub(unit * 2) {
            break;
        }
        let outgoing = message % 2 == 1;
        let bubble_w = width / 3 + (message * 37 % (width / 4).max(1));
        let x = if outgoing {
            width.saturating_sub(bubble_w + unit)
        } else {
            unit
        };
        let (fill, text) = if outgoing {
            (OUTGOING, TEXT_LIGHT)
        } else {
            (INCOMING, TEXT_DARK)
        };
        fill_rect(&mut img, x, y, bubble_w, bubble_h, fill);

        // text lines
        let line_h = (unit / 3).max(1);
        fill_rect(&mut img, x + unit / 2, y + unit / 2, bubble_w * 2 / 3, line_h, text);
        fill_rect(&mut img, x + unit / 2, y + unit + unit / 4, bubble_w / 2, line_h, text);

        y += bubble_h + unit;
    }

    // typing indicator, one dot highlighted per frame
    let dot = (unit / 2).max(1);
    let base_y = height.saturating_sub(unit + dot);
    for i in 0..3u32 {
        let shade = if (index % 3) as u32 == i { 142 } else { 199 };
        fill_rect(
            &mut img,
            unit + i * dot * 2,
            base_y,
            dot,
            dot,
            Rgba([shade, shade, shade + 5, 255]),
        );
    }

    img
}

/// [`synthetic_chat_image`] as a captured frame
pub fn synthetic_chat_frame(index: u64, width: u32, height: u32) -> Frame {
    Frame::from_image(synthetic_chat_image(index, width, height))
        .with_timing(index, index * 33_333)
}

/// `count` consecutive chat frames
pub fn synthetic_chat_frames(count: usize, width: u32, height: u32) -> Vec<Frame> {
    (0..count as u64)
        .map(|i| synthetic_chat_frame(i, width, height))
        .collect()
}

/// Chat animation surface that counts rasterizations.
pub struct CountingSurface {
    width: u32,
    height: u32,
    calls: Arc<AtomicUsize>,
}

impl CountingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter, readable after the surface moved into a capturer
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Surface for CountingSurface {
    fn logical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn rasterize(&mut self, pixel_ratio: f32) -> Result<Frame, ExportError> {
        let step = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
        let (w, h) = scaled_size((self.width, self.height), pixel_ratio);
        Ok(Frame::from_image(synthetic_chat_image(step, w, h)))
    }
}

/// Surface whose rasterization fails on a fixed schedule.
pub struct FailingSurface {
    inner: CountingSurface,
    every: usize,
}

impl FailingSurface {
    /// Fail every `n`-th rasterization (the n-th, 2n-th, ...).
    pub fn every(n: usize, width: u32, height: u32) -> Self {
        Self {
            inner: CountingSurface::new(width, height),
            every: n.max(1),
        }
    }

    /// Fail every rasterization.
    pub fn always(width: u32, height: u32) -> Self {
        Self::every(1, width, height)
    }
}

impl Surface for FailingSurface {
    fn logical_size(&self) -> (u32, u32) {
        self.inner.logical_size()
    }

    fn rasterize(&mut self, pixel_ratio: f32) -> Result<Frame, ExportError> {
        let attempt = self.inner.calls.load(Ordering::SeqCst) + 1;
        if attempt % self.every == 0 {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            return Err(ExportError::CaptureFailure(format!(
                "rasterization {} failed",
                attempt
            )));
        }
        self.inner.rasterize(pixel_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_chat_frame_correct_size() {
        let frame = synthetic_chat_frame(0, 320, 240);
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(frame.byte_len(), 320 * 240 * 4);
    }

    #[test]
    fn test_synthetic_chat_frames_differ() {
        let frame0 = synthetic_chat_frame(0, 160, 120);
        let frame1 = synthetic_chat_frame(1, 160, 120);
        assert_ne!(frame0.data, frame1.data);
    }

    #[test]
    fn test_bubbles_appear_over_time() {
        let count_blue = |img: &RgbaImage| img.pixels().filter(|p| **p == OUTGOING).count();
        let early = synthetic_chat_image(0, 200, 300);
        let later = synthetic_chat_image(FRAMES_PER_MESSAGE * 3, 200, 300);
        assert_eq!(count_blue(&early), 0);
        assert!(count_blue(&later) > 0);
    }

    #[test]
    fn test_tiny_canvas_does_not_panic() {
        let frame = synthetic_chat_frame(42, 1, 1);
        assert_eq!(frame.dimensions(), (1, 1));
    }

    #[test]
    fn test_failing_surface_schedule() {
        let mut surface = FailingSurface::every(3, 4, 4);
        let results: Vec<bool> = (0..6).map(|_| surface.rasterize(1.0).is_ok()).collect();
        assert_eq!(results, vec![true, true, false, true, true, false]);
        assert!(FailingSurface::always(4, 4).rasterize(1.0).is_err());
    }
}
