//! Video encoder seam and the openh264-backed H.264 implementation

use image::RgbaImage;

use crate::errors::ExportError;
#[cfg(feature = "recording")]
use super::config::VideoConfig;

/// Opaque encoder output; only the muxer interprets `data`.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Encoded bitstream (Annex B for H.264)
    pub data: Vec<u8>,
    pub timestamp_us: u64,
    pub duration_us: u64,
    pub is_keyframe: bool,
}

/// A video encoder as provided by the host platform.
pub trait ChunkEncoder: Send {
    /// Encode one canvas-sized frame. `Ok(None)` means the encoder produced
    /// nothing for this frame.
    fn encode(
        &mut self,
        canvas: &RgbaImage,
        timestamp_us: u64,
        duration_us: u64,
        force_keyframe: bool,
    ) -> Result<Option<EncodedChunk>, ExportError>;

    /// Drain any frames still held by the encoder.
    fn flush(&mut self) -> Result<Vec<EncodedChunk>, ExportError> {
        Ok(Vec::new())
    }
}

/// H.264 encoder using openh264
#[cfg(feature = "recording")]
pub struct H264Encoder {
    encoder: openh264::encoder::Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

#[cfg(feature = "recording")]
impl H264Encoder {
    /// Create an encoder with the bitrate, frame rate and profile from `config`.
    pub fn new(config: &VideoConfig) -> Result<Self, ExportError> {
        use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, Profile, UsageType};
        use openh264::OpenH264API;

        let profile = match config.profile {
            crate::types::VideoProfile::Baseline => Profile::Baseline,
            crate::types::VideoProfile::Main => Profile::Main,
            crate::types::VideoProfile::High => Profile::High,
        };
        let encoder_config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(config.bitrate))
            .max_frame_rate(FrameRate::from_hz(config.fps as f32))
            .usage_type(UsageType::ScreenContentRealTime)
            .profile(profile);

        let encoder = Encoder::with_api_config(OpenH264API::from_source(), encoder_config)
            .map_err(|e| ExportError::EncodeFailure(format!("Failed to create encoder: {}", e)))?;

        log::debug!(
            "H.264 encoder ready: {}x{} @ {} fps, {} bps, {:?}",
            config.width,
            config.height,
            config.fps,
            config.bitrate,
            config.profile
        );

        Ok(Self {
            encoder,
            width: config.width,
            height: config.height,
            frame_count: 0,
        })
    }

    /// Get the number of frames encoded
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(feature = "recording")]
impl ChunkEncoder for H264Encoder {
    fn encode(
        &mut self,
        canvas: &RgbaImage,
        timestamp_us: u64,
        duration_us: u64,
        force_keyframe: bool,
    ) -> Result<Option<EncodedChunk>, ExportError> {
        use openh264::encoder::FrameType;
        use openh264::formats::YUVBuffer;

        if canvas.dimensions() != (self.width, self.height) {
            return Err(ExportError::EncodeFailure(format!(
                "Canvas {}x{} does not match encoder {}x{}",
                canvas.width(),
                canvas.height(),
                self.width,
                self.height
            )));
        }

        if force_keyframe {
            self.encoder.force_intra_frame();
        }

        let yuv = rgba_to_yuv420(canvas.as_raw(), self.width, self.height);
        let yuv_buffer = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| ExportError::EncodeFailure(format!("Encoding failed: {}", e)))?;
        self.frame_count += 1;

        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();
        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(EncodedChunk {
            data,
            timestamp_us,
            duration_us,
            is_keyframe,
        }))
    }
}

/// Convert packed RGBA to planar YUV420 (BT.601), dropping alpha.
///
/// Chroma is sampled from the top-left pixel of each 2×2 block.
pub fn rgba_to_yuv420(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 4;
            let r = rgba[idx] as i32;
            let g = rgba[idx + 1] as i32;
            let b = rgba[idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 && x / 2 < w / 2 && y / 2 < h / 2 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}
