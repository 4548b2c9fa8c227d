//! Export session scenarios driven through the public API

use reelcap::capture::CaptureSettings;
use reelcap::session::{ExportRequest, Phase, SessionManager};
use reelcap::testing::{CountingSurface, FailingSurface, FakeVideoHost};
use reelcap::types::{EncodingOptions, ExportFormat, Quality};
use reelcap::{ExportError, SharedSurface};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn request(format: ExportFormat, quality: Quality, fps: u32) -> ExportRequest {
    ExportRequest::new(EncodingOptions::new(format, quality, fps)).with_capture(
        CaptureSettings::new(fps, 1.0).with_paint_interval(Duration::from_millis(1)),
    )
}

fn manager() -> SessionManager {
    SessionManager::with_video_host(Some(Arc::new(FakeVideoHost::new())))
}

fn wait_for_frames(manager: &SessionManager, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.frame_count() < count {
        assert!(Instant::now() < deadline, "timed out waiting for {count} frames");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn ten_frames_medium_gif() {
    let manager = manager();
    let token = manager
        .start(
            Box::new(CountingSurface::new(64, 48)),
            request(ExportFormat::Gif, Quality::Medium, 30),
        )
        .unwrap()
        .unwrap();

    wait_for_frames(&manager, 10);
    let blob = manager.stop(&token).unwrap();

    assert_eq!(blob.mime_type, "image/gif");
    assert!(!blob.is_empty());
    assert_eq!(&blob.data[..6], b"GIF89a");
    assert!(manager.frame_count() >= 10);
    assert_eq!(manager.phase(), Phase::Done);
}

#[test]
fn stop_with_no_frames_is_an_error() {
    let manager = manager();
    let token = manager
        .start(
            Box::new(FailingSurface::always(32, 32)),
            request(ExportFormat::Gif, Quality::Low, 30),
        )
        .unwrap()
        .unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let err = manager.stop(&token).unwrap_err();
    assert_eq!(err.to_string(), "No frames captured");
    assert_eq!(manager.phase(), Phase::Error);
    assert_eq!(manager.error_message().as_deref(), Some("No frames captured"));
    assert!(manager.output().is_none());
}

#[test]
fn rapid_double_start_runs_one_capture_loop() {
    let manager = manager();
    let first = CountingSurface::new(16, 16);
    let second = CountingSurface::new(16, 16);
    let first_calls = first.calls();
    let second_calls = second.calls();

    let token = manager
        .start(Box::new(first), request(ExportFormat::Gif, Quality::Low, 60))
        .unwrap();
    let ignored = manager
        .start(Box::new(second), request(ExportFormat::Gif, Quality::Low, 60))
        .unwrap();

    assert!(token.is_some());
    assert!(ignored.is_none());

    std::thread::sleep(Duration::from_millis(100));
    assert!(first_calls.load(Ordering::SeqCst) > 0);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    manager.reset();
}

#[test]
fn duplicate_start_leaves_first_session_untouched() {
    let manager = manager();
    let token = manager
        .start(
            Box::new(CountingSurface::new(16, 16)),
            request(ExportFormat::Gif, Quality::Low, 60),
        )
        .unwrap()
        .unwrap();
    wait_for_frames(&manager, 3);

    let before = manager.frame_count();
    assert!(manager
        .start(
            Box::new(CountingSurface::new(99, 99)),
            request(ExportFormat::Mp4, Quality::High, 10),
        )
        .unwrap()
        .is_none());
    assert!(manager.frame_count() >= before);
    assert_eq!(manager.snapshot().unwrap().token, token);

    let blob = manager.stop(&token).unwrap();
    assert_eq!(blob.mime_type, "image/gif");
    assert_eq!(manager.output().unwrap().len(), blob.len());
}

#[test]
fn reset_after_completion_clears_everything() {
    let manager = manager();
    let token = manager
        .start(
            Box::new(CountingSurface::new(16, 16)),
            request(ExportFormat::Gif, Quality::Low, 60),
        )
        .unwrap()
        .unwrap();
    wait_for_frames(&manager, 3);
    manager.stop(&token).unwrap();
    assert!(manager.output().is_some());

    manager.reset();
    assert_eq!(manager.phase(), Phase::Idle);
    assert_eq!(manager.frame_count(), 0);
    assert_eq!(manager.progress(), 0);
    assert!(manager.output().is_none());

    let surface = CountingSurface::new(16, 16);
    let calls = surface.calls();
    let next = manager
        .start(Box::new(surface), request(ExportFormat::Gif, Quality::Low, 60))
        .unwrap()
        .unwrap();
    assert_ne!(next, token);
    // the new session only ever sees its own frames
    assert!(manager.frame_count() <= calls.load(Ordering::SeqCst));
    manager.reset();
}

#[test]
fn start_after_done_replaces_session() {
    let manager = manager();
    let first = manager
        .start(
            Box::new(CountingSurface::new(16, 16)),
            request(ExportFormat::Gif, Quality::Low, 60),
        )
        .unwrap()
        .unwrap();
    wait_for_frames(&manager, 2);
    manager.stop(&first).unwrap();

    let second = manager
        .start(
            Box::new(CountingSurface::new(16, 16)),
            request(ExportFormat::Gif, Quality::Low, 60),
        )
        .unwrap()
        .expect("a finished session does not block a new start");
    assert_ne!(first, second);
    assert!(matches!(
        manager.stop(&first),
        Err(ExportError::UnknownSession(_))
    ));
    manager.reset();
}

#[test]
fn progress_is_monotonic_and_ends_at_100() {
    let manager = manager();
    let token = manager
        .start(
            Box::new(CountingSurface::new(32, 32)),
            request(ExportFormat::Mp4, Quality::Medium, 60),
        )
        .unwrap()
        .unwrap();

    let mut last = 0;
    for _ in 0..10 {
        let p = manager.progress();
        assert!(p >= last);
        assert!(p <= 10, "capture share is 0-10 for MP4, got {p}");
        last = p;
        std::thread::sleep(Duration::from_millis(5));
    }

    manager.stop(&token).unwrap();
    assert_eq!(manager.progress(), 100);
}

#[test]
fn host_painted_surface_is_captured() {
    let surface = SharedSurface::new(image::RgbaImage::from_pixel(
        24,
        24,
        image::Rgba([10, 20, 30, 255]),
    ));
    let manager = manager();
    let token = manager
        .start(
            Box::new(surface.clone()),
            request(ExportFormat::Gif, Quality::Low, 60),
        )
        .unwrap()
        .unwrap();

    for step in 0..5u8 {
        surface.paint(|img| img.put_pixel(step as u32, 0, image::Rgba([255, 0, 0, 255])));
        std::thread::sleep(Duration::from_millis(20));
    }

    let blob = manager.stop(&token).unwrap();
    assert!(blob.data.starts_with(b"GIF89a"));

    let dir = tempfile::tempdir().unwrap();
    let path = blob.write_to_dir(dir.path()).unwrap();
    assert_eq!(std::fs::read(&path).unwrap().len(), blob.len());
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("chat-"));
}

#[test]
fn mp4_without_video_host_is_unsupported() {
    let manager = SessionManager::with_video_host(None);
    let token = manager
        .start(
            Box::new(CountingSurface::new(16, 16)),
            request(ExportFormat::Mp4, Quality::Low, 30),
        )
        .unwrap()
        .unwrap();
    wait_for_frames(&manager, 1);

    assert!(matches!(
        manager.stop(&token),
        Err(ExportError::UnsupportedPlatform(_))
    ));
    assert_eq!(manager.phase(), Phase::Error);
}
