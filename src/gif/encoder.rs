//! GIF89a container writer

use bytes::Bytes;

use super::lzw::LzwCompressor;
use super::neuquant::NeuQuant;
use crate::errors::ExportError;
use crate::sink::ByteSink;
use crate::types::LoopCount;

/// Settings for one animated GIF
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GifOptions {
    pub width: u16,
    pub height: u16,
    /// Per-frame delay in centiseconds
    pub delay_cs: u16,
    /// Colors per frame palette; a power of two from 4 to 256
    pub palette_size: usize,
    /// NeuQuant sampling stride, 1 (every pixel) to 30
    pub sample_factor: u32,
    pub repeat: LoopCount,
}

impl GifOptions {
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.width == 0 || self.height == 0 {
            return Err(ExportError::InvalidArgument(format!(
                "GIF dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.palette_size.is_power_of_two() || !(4..=256).contains(&self.palette_size) {
            return Err(ExportError::InvalidArgument(format!(
                "GIF palette size must be a power of two from 4 to 256, got {}",
                self.palette_size
            )));
        }
        Ok(())
    }

    /// Bits per palette index
    pub fn color_depth(&self) -> u8 {
        self.palette_size.trailing_zeros() as u8
    }
}

/// Builds a multi-frame GIF one frame at a time.
///
/// Every frame gets its own NeuQuant palette: the first frame's palette is
/// the global color table, later frames carry a local one.
pub struct GifEncoder {
    options: GifOptions,
    sink: ByteSink,
    frames: usize,
}

impl GifEncoder {
    /// Create the encoder and write the `GIF89a` signature.
    pub fn new(options: GifOptions) -> Result<Self, ExportError> {
        options.validate()?;
        let sink = ByteSink::with_capacity(64 * 1024);
        sink.write_str("GIF89a");
        Ok(Self {
            options,
            sink,
            frames: 0,
        })
    }

    pub fn options(&self) -> &GifOptions {
        &self.options
    }

    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Quantize, compress and append one RGBA frame of exactly `width × height`.
    pub fn add_frame(&mut self, rgba: &[u8]) -> Result<(), ExportError> {
        let expected = self.options.width as usize * self.options.height as usize * 4;
        if rgba.len() != expected {
            return Err(ExportError::EncodeFailure(format!(
                "frame {} has {} bytes, expected {} for {}x{}",
                self.frames,
                rgba.len(),
                expected,
                self.options.width,
                self.options.height
            )));
        }

        let rgb: Vec<u8> = rgba
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();
        let quantizer = NeuQuant::train(
            &rgb,
            self.options.palette_size,
            self.options.sample_factor,
        )?;
        let palette = quantizer.palette();
        let indices = quantizer.index_rgb(&rgb);
        drop(rgb);

        let first = self.frames == 0;
        if first {
            self.write_logical_screen();
            self.sink.write_bytes(&palette);
            if let Some(repeat) = self.options.repeat.netscape_value() {
                self.write_netscape_ext(repeat);
            }
        }

        self.write_graphic_control();
        self.write_image_descriptor(first);
        if !first {
            self.sink.write_bytes(&palette);
        }

        LzwCompressor::new(self.options.color_depth()).compress(&indices, &self.sink);
        self.frames += 1;
        Ok(())
    }

    /// Append the trailer and hand back the finished file.
    pub fn finish(self) -> Bytes {
        self.sink.write_byte(0x3B);
        log::debug!(
            "GIF finished: {} frames, {} bytes",
            self.frames,
            self.sink.len()
        );
        self.sink.take()
    }

    /// Size field shared by the screen and image descriptors
    fn palette_size_field(&self) -> u8 {
        self.options.color_depth() - 1
    }

    fn write_logical_screen(&self) {
        self.sink.write_u16_le(self.options.width);
        self.sink.write_u16_le(self.options.height);
        // global color table, 8-bit color resolution, unsorted
        self.sink.write_byte(0x80 | 0x70 | self.palette_size_field());
        self.sink.write_byte(0); // background color index
        self.sink.write_byte(0); // square pixels
    }

    fn write_netscape_ext(&self, repeat: u16) {
        self.sink.write_byte(0x21);
        self.sink.write_byte(0xFF);
        self.sink.write_byte(11);
        self.sink.write_str("NETSCAPE2.0");
        self.sink.write_byte(3);
        self.sink.write_byte(1);
        self.sink.write_u16_le(repeat);
        self.sink.write_byte(0);
    }

    fn write_graphic_control(&self) {
        self.sink.write_byte(0x21);
        self.sink.write_byte(0xF9);
        self.sink.write_byte(4);
        // no disposal, no user input, no transparency
        self.sink.write_byte(0);
        self.sink.write_u16_le(self.options.delay_cs);
        self.sink.write_byte(0);
        self.sink.write_byte(0);
    }

    fn write_image_descriptor(&self, first: bool) {
        self.sink.write_byte(0x2C);
        self.sink.write_u16_le(0);
        self.sink.write_u16_le(0);
        self.sink.write_u16_le(self.options.width);
        self.sink.write_u16_le(self.options.height);
        if first {
            self.sink.write_byte(0);
        } else {
            self.sink.write_byte(0x80 | self.palette_size_field());
        }
    }
}
