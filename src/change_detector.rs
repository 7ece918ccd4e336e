//! Change detection using a full-frame luminance diff.
//!
//! Both frames are reduced to 8-bit luminance and compared pixel by pixel.
//! The summed absolute difference, normalized by the largest possible sum
//! (width x height x 255), gives the percentage of change that is compared
//! against the configured threshold.

use image::DynamicImage;
use tracing::{debug, trace};

/// Largest luminance value of an 8-bit channel
const MAX_LUMA: u64 = 255;

/// Outcome of comparing a new frame against the retained one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeDecision {
    /// Whether the change reaches the threshold
    pub changed: bool,
    /// Magnitude of change, 0-100
    pub percent: f64,
}

/// Change detector comparing consecutive frames
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    /// Minimum change percentage for "changed"
    threshold_percent: f64,
}

impl ChangeDetector {
    /// Create a new change detector with the given threshold percentage
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    /// Compare `current` against `previous`
    ///
    /// Returns changed when:
    /// - there is no previous frame (first cycle must run)
    /// - the frames differ in size
    /// - the luminance difference reaches the threshold
    pub fn evaluate(&self, current: &DynamicImage, previous: Option<&DynamicImage>) -> ChangeDecision {
        let previous = match previous {
            Some(p) => p,
            None => {
                trace!("No previous frame, marking as changed");
                return ChangeDecision {
                    changed: true,
                    percent: 100.0,
                };
            }
        };

        let percent = match diff_percentage(current, previous) {
            Some(p) => p,
            None => {
                debug!(
                    "Frame size changed {}x{} -> {}x{}, marking as changed",
                    previous.width(),
                    previous.height(),
                    current.width(),
                    current.height()
                );
                return ChangeDecision {
                    changed: true,
                    percent: 100.0,
                };
            }
        };

        debug!(
            "📊 Screen change: {:.2}% (threshold: {}%)",
            percent, self.threshold_percent
        );

        ChangeDecision {
            changed: percent >= self.threshold_percent,
            percent,
        }
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(0.1)
    }
}

/// Percentage of luminance difference between two frames
///
/// Returns `None` when the dimensions differ. An empty frame has no
/// difference.
pub fn diff_percentage(a: &DynamicImage, b: &DynamicImage) -> Option<f64> {
    if a.width() != b.width() || a.height() != b.height() {
        return None;
    }

    let max_sum = a.width() as u64 * a.height() as u64 * MAX_LUMA;
    if max_sum == 0 {
        return Some(0.0);
    }

    let luma_a = a.to_luma8();
    let luma_b = b.to_luma8();

    let sum: u64 = luma_a
        .as_raw()
        .iter()
        .zip(luma_b.as_raw().iter())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum();

    Some(sum as f64 / max_sum as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, GrayImage, Rgb, RgbImage};

    fn create_test_image(brightness: u8) -> DynamicImage {
        let mut img = RgbImage::new(100, 100);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([brightness, brightness, brightness]);
        }
        DynamicImage::ImageRgb8(img)
    }

    /// Black 100x100 frame with the first `count` pixels set to white
    fn create_speckled_image(count: u32) -> DynamicImage {
        let mut img = GrayImage::new(100, 100);
        for i in 0..count {
            img.put_pixel(i % 100, i / 100, Luma([255]));
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_identical_images_zero_diff() {
        let img1 = create_test_image(128);
        let img2 = create_test_image(128);
        assert_eq!(diff_percentage(&img1, &img2), Some(0.0));
    }

    #[test]
    fn test_identical_images_unchanged_for_any_positive_threshold() {
        let img = create_test_image(77);
        for threshold in [0.0001, 0.1, 5.0, 99.0] {
            let detector = ChangeDetector::new(threshold);
            let decision = detector.evaluate(&img, Some(&img));
            assert!(!decision.changed, "threshold {}", threshold);
            assert_eq!(decision.percent, 0.0);
        }
    }

    #[test]
    fn test_black_white_full_diff() {
        let img1 = create_test_image(0);
        let img2 = create_test_image(255);
        let percent = diff_percentage(&img1, &img2).unwrap();
        assert!((percent - 100.0).abs() < 1e-9, "percent was {}", percent);
    }

    #[test]
    fn test_first_frame_always_changed() {
        let detector = ChangeDetector::new(99.0);
        let img = create_test_image(128);
        assert!(detector.evaluate(&img, None).changed);
    }

    #[test]
    fn test_size_mismatch_is_changed() {
        let detector = ChangeDetector::new(50.0);
        let small = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let big = DynamicImage::ImageRgb8(RgbImage::new(20, 10));
        assert_eq!(diff_percentage(&small, &big), None);
        assert!(detector.evaluate(&big, Some(&small)).changed);
    }

    #[test]
    fn test_below_threshold_unchanged() {
        // 5 white pixels out of 10_000 = 0.05%
        let detector = ChangeDetector::new(0.1);
        let previous = create_speckled_image(0);
        let current = create_speckled_image(5);
        let decision = detector.evaluate(&current, Some(&previous));
        assert!((decision.percent - 0.05).abs() < 1e-9);
        assert!(!decision.changed);
    }

    #[test]
    fn test_above_threshold_changed() {
        // 50 white pixels out of 10_000 = 0.5%
        let detector = ChangeDetector::new(0.1);
        let previous = create_speckled_image(0);
        let current = create_speckled_image(50);
        let decision = detector.evaluate(&current, Some(&previous));
        assert!((decision.percent - 0.5).abs() < 1e-9);
        assert!(decision.changed);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let previous = create_speckled_image(0);
        let current = create_speckled_image(50);
        let percent = diff_percentage(&current, &previous).unwrap();
        let detector = ChangeDetector::new(percent);
        assert_eq!(detector.threshold_percent(), percent);
        assert!(detector.evaluate(&current, Some(&previous)).changed);
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(ChangeDetector::default().threshold_percent(), 0.1);
    }

    #[test]
    fn test_empty_frames_no_diff() {
        let a = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert_eq!(diff_percentage(&a, &a), Some(0.0));
    }
}
