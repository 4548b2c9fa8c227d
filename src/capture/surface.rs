//! Visual surfaces the capturer can rasterize

use image::{imageops, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::ExportError;
use crate::types::Frame;

/// A live visual surface.
///
/// `rasterize` is called from the capture thread and must return a frame of
/// roughly `logical_size × pixel_ratio`. Errors are treated as a single
/// skipped frame.
pub trait Surface: Send {
    /// Size in logical (unscaled) pixels
    fn logical_size(&self) -> (u32, u32);

    fn rasterize(&mut self, pixel_ratio: f32) -> Result<Frame, ExportError>;
}

/// Raster size for a logical size at the given pixel ratio, never zero.
pub fn scaled_size(logical: (u32, u32), pixel_ratio: f32) -> (u32, u32) {
    let scale = |v: u32| ((v as f32 * pixel_ratio).round() as u32).max(1);
    (scale(logical.0), scale(logical.1))
}

fn render_scaled(image: &RgbaImage, pixel_ratio: f32) -> RgbaImage {
    let (width, height) = scaled_size(image.dimensions(), pixel_ratio);
    if (width, height) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, width, height, imageops::FilterType::Triangle)
}

/// Surface backed by an image the host keeps updating.
///
/// Clones share the same image, so one clone can be handed to the capturer
/// while another is used to paint.
#[derive(Clone)]
pub struct SharedSurface {
    image: Arc<Mutex<RgbaImage>>,
}

impl SharedSurface {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(Mutex::new(image)),
        }
    }

    /// Replace the current contents.
    pub fn update(&self, image: RgbaImage) {
        *self.image.lock().expect("lock poisoned") = image;
    }

    /// Modify the current contents in place.
    pub fn paint<F: FnOnce(&mut RgbaImage)>(&self, f: F) {
        let mut guard = self.image.lock().expect("lock poisoned");
        f(&mut guard);
    }
}

impl Surface for SharedSurface {
    fn logical_size(&self) -> (u32, u32) {
        self.image.lock().expect("lock poisoned").dimensions()
    }

    fn rasterize(&mut self, pixel_ratio: f32) -> Result<Frame, ExportError> {
        let image = self.image.lock().expect("lock poisoned");
        if image.width() == 0 || image.height() == 0 {
            return Err(ExportError::CaptureFailure("surface is empty".to_string()));
        }
        Ok(Frame::from_image(render_scaled(&image, pixel_ratio)))
    }
}

/// Surface that replays a fixed list of screenshots, one per rasterization,
/// wrapping around at the end.
pub struct ImageSequenceSurface {
    images: Vec<RgbaImage>,
    cursor: usize,
}

impl ImageSequenceSurface {
    pub fn new(images: Vec<RgbaImage>) -> Result<Self, ExportError> {
        if images.is_empty() {
            return Err(ExportError::InvalidArgument(
                "image sequence needs at least one image".to_string(),
            ));
        }
        if let Some(image) = images.iter().find(|i| i.width() == 0 || i.height() == 0) {
            return Err(ExportError::InvalidArgument(format!(
                "image sequence contains an empty {}x{} image",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { images, cursor: 0 })
    }

    /// Load every `.png` in `dir`, ordered by file name.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ExportError> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(ExportError::InvalidArgument(format!(
                "no PNG files in {}",
                dir.display()
            )));
        }

        let images = paths
            .iter()
            .map(|path| {
                image::open(path)
                    .map(|img| img.to_rgba8())
                    .map_err(|e| ExportError::Io(format!("{}: {}", path.display(), e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("Loaded {} screenshots from {}", images.len(), dir.display());
        Self::new(images)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl Surface for ImageSequenceSurface {
    fn logical_size(&self) -> (u32, u32) {
        self.images[self.cursor].dimensions()
    }

    fn rasterize(&mut self, pixel_ratio: f32) -> Result<Frame, ExportError> {
        let frame = Frame::from_image(render_scaled(&self.images[self.cursor], pixel_ratio));
        self.cursor = (self.cursor + 1) % self.images.len();
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_scaled_size_rounds_and_clamps() {
        assert_eq!(scaled_size((100, 50), 1.0), (100, 50));
        assert_eq!(scaled_size((100, 50), 1.5), (150, 75));
        assert_eq!(scaled_size((101, 51), 1.5), (152, 77));
        assert_eq!(scaled_size((1, 1), 0.1), (1, 1));
    }

    #[test]
    fn test_shared_surface_scales_by_pixel_ratio() {
        let mut surface = SharedSurface::new(RgbaImage::from_pixel(40, 20, Rgba([9, 9, 9, 255])));
        let frame = surface.rasterize(2.0).unwrap();
        assert_eq!(frame.dimensions(), (80, 40));
        assert_eq!(surface.logical_size(), (40, 20));
    }

    #[test]
    fn test_shared_surface_sees_updates_from_clones() {
        let painter = SharedSurface::new(RgbaImage::new(4, 4));
        let mut capturer = painter.clone();
        painter.paint(|img| img.put_pixel(0, 0, Rgba([255, 0, 0, 255])));

        let frame = capturer.rasterize(1.0).unwrap();
        assert_eq!(&frame.data[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_image_sequence_cycles() {
        let images = vec![
            RgbaImage::from_pixel(2, 2, Rgba([1, 0, 0, 255])),
            RgbaImage::from_pixel(2, 2, Rgba([2, 0, 0, 255])),
        ];
        let mut surface = ImageSequenceSurface::new(images).unwrap();
        let firsts: Vec<u8> = (0..3)
            .map(|_| surface.rasterize(1.0).unwrap().data[0])
            .collect();
        assert_eq!(firsts, vec![1, 2, 1]);
    }

    #[test]
    fn test_image_sequence_rejects_empty() {
        assert!(matches!(
            ImageSequenceSurface::new(Vec::new()),
            Err(ExportError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_image_sequence_from_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(3, 3, Rgba([20, 0, 0, 255]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbaImage::from_pixel(3, 3, Rgba([10, 0, 0, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut surface = ImageSequenceSurface::from_dir(dir.path()).unwrap();
        assert_eq!(surface.len(), 2);
        assert_eq!(surface.rasterize(1.0).unwrap().data[0], 10);
        assert_eq!(surface.rasterize(1.0).unwrap().data[0], 20);
    }

    #[test]
    fn test_image_sequence_from_dir_without_pngs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSurface::from_dir(dir.path()).is_err());
    }
}
