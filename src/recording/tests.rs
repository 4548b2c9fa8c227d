//! Tests for the recording module

#[cfg(test)]
mod recording_tests {
    use crate::errors::ExportError;
    use crate::recording::{encode_frames, VideoConfig, VideoFrameEncoder, VideoHost};
    use crate::testing::{synthetic_chat_frames, FakeVideoHost, FAKE_CONTAINER_MAGIC};
    use crate::types::{EncodingOptions, ExportFormat, Frame, Quality, VideoProfile};
    use std::sync::atomic::AtomicBool;

    fn options(quality: Quality, fps: u32) -> EncodingOptions {
        EncodingOptions::new(ExportFormat::Mp4, quality, fps)
    }

    #[test]
    fn test_config_from_quality() {
        let low = VideoConfig::new(320, 240, &options(Quality::Low, 30));
        assert_eq!(low.bitrate, 2_000_000);
        assert_eq!(low.profile, VideoProfile::Baseline);

        let high = VideoConfig::new(320, 240, &options(Quality::High, 30));
        assert_eq!(high.bitrate, 10_000_000);
        assert_eq!(high.profile, VideoProfile::High);
    }

    #[test]
    fn test_config_rounds_up_to_even() {
        let config = VideoConfig::new(321, 239, &options(Quality::Medium, 30));
        assert_eq!((config.width, config.height), (322, 240));
        let config = VideoConfig::new(1, 1, &options(Quality::Medium, 30));
        assert_eq!((config.width, config.height), (2, 2));
    }

    #[test]
    fn test_config_with_title() {
        let config = VideoConfig::new(320, 240, &options(Quality::Medium, 30))
            .with_title("Chat export")
            .with_fast_start(false);
        assert_eq!(config.title, Some("Chat export".to_string()));
        assert!(!config.fast_start);
    }

    #[test]
    fn test_timestamps() {
        let config = VideoConfig::new(320, 240, &options(Quality::Medium, 30));
        assert_eq!(config.timestamp_us(0), 0);
        assert_eq!(config.timestamp_us(1), 33_333);
        assert_eq!(config.timestamp_us(30), 1_000_000);
        assert_eq!(config.frame_duration_us(), 33_333);
    }

    #[test]
    fn test_missing_host_is_unsupported() {
        let result = VideoFrameEncoder::new(None, 320, 240, &options(Quality::Medium, 30));
        assert!(matches!(result, Err(ExportError::UnsupportedPlatform(_))));
    }

    #[test]
    fn test_recording_workflow() {
        let host = FakeVideoHost::new();
        let mut encoder =
            VideoFrameEncoder::new(Some(&host as &dyn VideoHost), 319, 179, &options(Quality::Medium, 30))
                .expect("Failed to create encoder");

        for frame in synthetic_chat_frames(65, 319, 179) {
            encoder.write_frame(frame).expect("Failed to write frame");
        }
        assert_eq!(encoder.frame_count(), 65);

        let (data, stats) = encoder.finish().expect("Failed to finish");
        assert!(data.starts_with(FAKE_CONTAINER_MAGIC));
        assert!(data.ends_with(b"moov"));
        assert_eq!(stats.video_frames, 65);
        assert_eq!(stats.keyframes, 3);
        assert_eq!(stats.bytes_written, data.len() as u64);

        let log = host.log();
        assert!(log.finalized);
        assert_eq!(log.configs[0].width, 320);
        assert_eq!(log.configs[0].height, 180);
        assert!(log.canvases.iter().all(|&size| size == (320, 180)));

        let keyframes: Vec<usize> = log
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_keyframe)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(keyframes, vec![0, 30, 60]);

        for (i, chunk) in log.chunks.iter().enumerate() {
            assert_eq!(chunk.timestamp_us, i as u64 * 1_000_000 / 30);
            assert_eq!(chunk.duration_us, 33_333);
        }
    }

    #[test]
    fn test_smaller_frames_sit_on_black_canvas() {
        let host = FakeVideoHost::new();
        let white = |w: u32, h: u32| Frame::new(vec![255; (w * h * 4) as usize], w, h).unwrap();
        let frames = vec![white(20, 20), white(10, 10)];

        let cancelled = AtomicBool::new(false);
        encode_frames(Some(&host as &dyn VideoHost), frames, &options(Quality::Low, 30), &cancelled, |_, _| {})
            .unwrap();

        let log = host.log();
        assert_eq!(log.canvases, vec![(20, 20), (20, 20)]);
        assert_eq!(log.corner_pixels[0], [255, 255, 255, 255]);
        assert_eq!(log.corner_pixels[1], [0, 0, 0, 255]);
    }

    #[test]
    fn test_encode_frames_reports_progress() {
        let host = FakeVideoHost::new();
        let cancelled = AtomicBool::new(false);
        let mut seen = Vec::new();
        let (data, _) = encode_frames(
            Some(&host as &dyn VideoHost),
            synthetic_chat_frames(4, 64, 48),
            &options(Quality::Medium, 15),
            &cancelled,
            |current, total| seen.push((current, total)),
        )
        .unwrap();
        assert!(!data.is_empty());
        assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[test]
    fn test_encoder_error_is_encode_failure() {
        let host = FakeVideoHost::new().failing_at(2);
        let cancelled = AtomicBool::new(false);
        let result = encode_frames(
            Some(&host as &dyn VideoHost),
            synthetic_chat_frames(5, 32, 32),
            &options(Quality::Medium, 30),
            &cancelled,
            |_, _| {},
        );
        assert!(matches!(result, Err(ExportError::EncodeFailure(_))));
        assert!(!host.log().finalized);
    }

    #[test]
    fn test_finalize_error_is_encode_failure() {
        let host = FakeVideoHost::new().failing_finalize();
        let cancelled = AtomicBool::new(false);
        let result = encode_frames(
            Some(&host as &dyn VideoHost),
            synthetic_chat_frames(2, 32, 32),
            &options(Quality::Medium, 30),
            &cancelled,
            |_, _| {},
        );
        assert!(matches!(result, Err(ExportError::EncodeFailure(_))));
    }

    #[test]
    fn test_empty_input() {
        let host = FakeVideoHost::new();
        let cancelled = AtomicBool::new(false);
        let result = encode_frames(Some(&host as &dyn VideoHost), Vec::new(), &options(Quality::Medium, 30), &cancelled, |_, _| {});
        assert!(matches!(result, Err(ExportError::EmptyInput)));
    }

    #[test]
    fn test_cancelled_before_first_frame() {
        let host = FakeVideoHost::new();
        let cancelled = AtomicBool::new(true);
        let result = encode_frames(
            Some(&host as &dyn VideoHost),
            synthetic_chat_frames(3, 32, 32),
            &options(Quality::Medium, 30),
            &cancelled,
            |_, _| {},
        );
        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert!(host.log().chunks.is_empty());
    }
}
