//! Screen region capture.
//!
//! The orchestrator polls a [`CaptureSource`] once per tick. A source returns
//! `None` for a target that cannot be captured right now (hidden, minimized,
//! missing); the orchestrator treats that as a transient failure.

use crate::types::{CaptureFrame, ScreenRect};
use image::{DynamicImage, RgbaImage};
use std::path::PathBuf;
use tracing::{debug, trace};

/// Something that can produce frames of the monitored region
pub trait CaptureSource: Send + Sync {
    /// Capture the current contents, or `None` if the target is unavailable
    fn capture(&self) -> Option<CaptureFrame>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use core_graphics::geometry::{CGPoint, CGRect, CGSize};
    use core_graphics::image::CGImage;
    use core_graphics::window::{
        kCGNullWindowID, kCGWindowImageNominalResolution, kCGWindowListOptionOnScreenOnly,
        CGWindowListCreateImage,
    };
    use foreign_types_shared::ForeignType;

    /// Capture a rectangle of the composited desktop
    pub fn capture_region(region: &ScreenRect) -> Option<RgbaImage> {
        let rect = CGRect::new(
            &CGPoint::new(region.x as f64, region.y as f64),
            &CGSize::new(region.width as f64, region.height as f64),
        );

        // Nominal resolution keeps one pixel per point so recognized
        // rectangles line up with screen coordinates.
        let cg_image: CGImage = unsafe {
            let image_ref = CGWindowListCreateImage(
                rect,
                kCGWindowListOptionOnScreenOnly,
                kCGNullWindowID,
                kCGWindowImageNominalResolution,
            );
            if image_ref.is_null() {
                return None;
            }
            CGImage::from_ptr(image_ref)
        };

        convert_cgimage_to_rgba(&cg_image)
    }

    /// Convert CGImage to image crate's RgbaImage
    fn convert_cgimage_to_rgba(cg_image: &CGImage) -> Option<RgbaImage> {
        let width = cg_image.width();
        let height = cg_image.height();
        let bytes_per_row = cg_image.bytes_per_row();
        let bytes_per_pixel = cg_image.bits_per_pixel() / 8;

        let data = cg_image.data();
        let bytes = data.bytes();

        if bytes.is_empty() || width == 0 || height == 0 || bytes_per_pixel < 4 {
            return None;
        }

        let mut rgba_data = Vec::with_capacity(width * height * 4);

        for y in 0..height {
            let row_start = y * bytes_per_row;
            for x in 0..width {
                let pixel_start = row_start + x * bytes_per_pixel;
                if pixel_start + 3 >= bytes.len() {
                    return None;
                }
                // BGRA on macOS displays
                let b = bytes[pixel_start];
                let g = bytes[pixel_start + 1];
                let r = bytes[pixel_start + 2];
                let a = bytes[pixel_start + 3];
                rgba_data.extend_from_slice(&[r, g, b, a]);
            }
        }

        RgbaImage::from_raw(width as u32, height as u32, rgba_data)
    }
}

#[cfg(not(target_os = "macos"))]
mod macos {
    use super::*;

    pub fn capture_region(_region: &ScreenRect) -> Option<RgbaImage> {
        None
    }
}

/// Captures a fixed rectangle of the screen
pub struct RegionCapture {
    region: ScreenRect,
}

impl RegionCapture {
    pub fn new(region: ScreenRect) -> Self {
        Self { region }
    }

    pub fn region(&self) -> ScreenRect {
        self.region
    }
}

impl CaptureSource for RegionCapture {
    fn capture(&self) -> Option<CaptureFrame> {
        if self.region.is_empty() {
            return None;
        }

        trace!("Capturing region {:?}", self.region);

        let start = std::time::Instant::now();
        let result = macos::capture_region(&self.region);

        match result {
            Some(image) => {
                trace!("Region captured in {:?}", start.elapsed());
                let bounds = ScreenRect::new(self.region.x, self.region.y, image.width(), image.height());
                Some(CaptureFrame::new(DynamicImage::ImageRgba8(image), bounds))
            }
            None => {
                debug!("Region {:?} not capturable", self.region);
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "screen region {}x{} at ({}, {})",
            self.region.width, self.region.height, self.region.x, self.region.y
        )
    }
}

/// Reads frames from an image file that another tool keeps up to date
pub struct ImageFileCapture {
    path: PathBuf,
    origin: (i32, i32),
}

impl ImageFileCapture {
    pub fn new(path: PathBuf, origin: (i32, i32)) -> Self {
        Self { path, origin }
    }
}

impl CaptureSource for ImageFileCapture {
    fn capture(&self) -> Option<CaptureFrame> {
        match image::open(&self.path) {
            Ok(image) => {
                let bounds = ScreenRect::new(self.origin.0, self.origin.1, image.width(), image.height());
                if bounds.is_empty() {
                    return None;
                }
                Some(CaptureFrame::new(image, bounds))
            }
            Err(e) => {
                debug!("Failed to read frame from {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("image file {}", self.path.display())
    }
}
