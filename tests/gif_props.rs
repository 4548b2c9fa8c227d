//! Property-based tests for the GIF export path
//!
//! Produced files are decoded back with the `image` crate's GIF decoder to
//! check they are well-formed, not just well-framed.

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Rgba, RgbaImage};
use proptest::prelude::*;
use reelcap::gif::{encode_frames, GifEncoder, GifJob, GifOptions, LzwCompressor, NeuQuant};
use reelcap::testing::synthetic_chat_frames;
use reelcap::types::{EncodingOptions, ExportFormat, Frame, LoopCount, Quality};
use reelcap::ByteSink;
use std::io::Cursor;
use std::sync::atomic::AtomicBool;

fn decode(gif: &[u8]) -> Vec<image::Frame> {
    GifDecoder::new(Cursor::new(gif))
        .expect("valid GIF header")
        .into_frames()
        .collect_frames()
        .expect("valid GIF frames")
}

fn job(quality: Quality, fps: u32, repeat: LoopCount) -> GifJob {
    GifJob::new(EncodingOptions::new(ExportFormat::Gif, quality, fps), 10, repeat)
}

fn solid(width: u32, height: u32, color: [u8; 4]) -> Frame {
    Frame::from_image(RgbaImage::from_pixel(width, height, Rgba(color)))
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTAINER INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any number of frames at any quality yields GIF89a ... 0x3B
    #[test]
    fn header_and_trailer(
        frame_count in 1usize..6,
        quality in prop::sample::select(Quality::ALL.to_vec()),
        width in 8u32..64,
        height in 8u32..64,
    ) {
        let cancelled = AtomicBool::new(false);
        let gif = encode_frames(
            synthetic_chat_frames(frame_count, width, height),
            &job(quality, 30, LoopCount::Infinite),
            &cancelled,
            |_, _| {},
        ).expect("encode should succeed");

        prop_assert_eq!(&gif[..6], b"GIF89a");
        prop_assert_eq!(gif.last().copied(), Some(0x3B));

        let frames = decode(&gif);
        prop_assert_eq!(frames.len(), frame_count);
        for frame in &frames {
            prop_assert_eq!(frame.buffer().dimensions(), (width, height));
        }
    }

    /// Solid frames survive quantization almost unchanged
    #[test]
    fn solid_colors_round_trip(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
        let cancelled = AtomicBool::new(false);
        let gif = encode_frames(
            vec![solid(16, 16, [r, g, b, 255])],
            &job(Quality::High, 30, LoopCount::Once),
            &cancelled,
            |_, _| {},
        ).expect("encode should succeed");

        let frames = decode(&gif);
        let px = frames[0].buffer().get_pixel(7, 7).0;
        for (got, want) in px.iter().zip([r, g, b]) {
            prop_assert!((*got as i32 - want as i32).abs() <= 8, "got {:?}, want {:?}", px, (r, g, b));
        }
    }

    /// Same pixels and sample factor → same palette and indices
    #[test]
    fn quantizer_is_deterministic(
        pixels in prop::collection::vec(any::<u8>(), 3 * 64..3 * 600),
        sample_factor in 1u32..=30,
        net_size in prop::sample::select(vec![64usize, 128, 256]),
    ) {
        let len = pixels.len() / 3 * 3;
        let rgb = &pixels[..len];
        let a = NeuQuant::train(rgb, net_size, sample_factor).unwrap();
        let b = NeuQuant::train(rgb, net_size, sample_factor).unwrap();
        prop_assert_eq!(a.palette(), b.palette());
        prop_assert_eq!(a.index_rgb(rgb), b.index_rgb(rgb));
        prop_assert!(a.index_rgb(rgb).iter().all(|&i| (i as usize) < net_size));
    }

    /// LZW streams stay in 255-byte sub-blocks ending with a terminator
    #[test]
    fn lzw_sub_blocks_well_formed(
        indices in prop::collection::vec(0u8..16, 0..6000),
    ) {
        let sink = ByteSink::new();
        LzwCompressor::new(4).compress(&indices, &sink);
        let out = sink.snapshot();

        prop_assert_eq!(out[0], 4);
        let mut pos = 1;
        loop {
            let len = out[pos] as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            prop_assert!(len <= 255);
            pos += len;
            prop_assert!(pos < out.len());
        }
        prop_assert_eq!(pos, out.len());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn ten_medium_frames_at_thirty_fps() {
    let cancelled = AtomicBool::new(false);
    let mut progress = Vec::new();
    let gif = encode_frames(
        synthetic_chat_frames(10, 120, 90),
        &job(Quality::Medium, 30, LoopCount::Infinite),
        &cancelled,
        |current, total| progress.push((current, total)),
    )
    .unwrap();

    assert!(gif.starts_with(b"GIF89a"));
    assert_eq!(progress.last(), Some(&(10, 10)));

    let frames = decode(&gif);
    assert_eq!(frames.len(), 10);
    // 1000 / 30 ms rounds to 3 centiseconds
    let (numer, denom) = frames[0].delay().numer_denom_ms();
    assert_eq!(numer / denom, 30);
}

#[test]
fn netscape_extension_only_when_looping() {
    let cancelled = AtomicBool::new(false);
    let frames = || synthetic_chat_frames(2, 16, 16);
    let has_netscape = |gif: &[u8]| gif.windows(11).any(|w| w == b"NETSCAPE2.0");

    let once = encode_frames(frames(), &job(Quality::Low, 10, LoopCount::Once), &cancelled, |_, _| {}).unwrap();
    let infinite = encode_frames(frames(), &job(Quality::Low, 10, LoopCount::Infinite), &cancelled, |_, _| {}).unwrap();
    let times = encode_frames(frames(), &job(Quality::Low, 10, LoopCount::Times(3)), &cancelled, |_, _| {}).unwrap();

    assert!(!has_netscape(&once));
    assert!(has_netscape(&infinite));
    assert!(has_netscape(&times));
}

#[test]
fn mixed_frame_sizes_are_normalized() {
    let cancelled = AtomicBool::new(false);
    let frames = vec![
        solid(20, 10, [255, 255, 255, 255]),
        solid(10, 20, [255, 255, 255, 255]),
    ];
    let gif = encode_frames(frames, &job(Quality::Low, 10, LoopCount::Once), &cancelled, |_, _| {}).unwrap();

    let decoded = decode(&gif);
    assert_eq!(decoded.len(), 2);
    let second = decoded[1].buffer();
    assert_eq!(second.dimensions(), (20, 10));
    // right of the 10px-wide frame is black fill
    let px = second.get_pixel(15, 5).0;
    assert!(px[0] < 16 && px[1] < 16 && px[2] < 16, "expected black, got {:?}", px);
}

#[test]
fn encoder_used_directly() {
    let mut encoder = GifEncoder::new(GifOptions {
        width: 4,
        height: 4,
        delay_cs: 5,
        palette_size: 4,
        sample_factor: 1,
        repeat: LoopCount::Infinite,
    })
    .unwrap();
    encoder.add_frame(&[200u8; 4 * 4 * 4]).unwrap();
    encoder.add_frame(&[10u8; 4 * 4 * 4]).unwrap();
    assert_eq!(encoder.frames_written(), 2);

    let gif = encoder.finish();
    assert_eq!(decode(&gif).len(), 2);
}

#[test]
fn cancelled_encode_returns_no_output() {
    let cancelled = AtomicBool::new(true);
    let result = encode_frames(
        synthetic_chat_frames(3, 16, 16),
        &job(Quality::Low, 10, LoopCount::Once),
        &cancelled,
        |_, _| {},
    );
    assert!(matches!(result, Err(reelcap::ExportError::Cancelled)));
}
