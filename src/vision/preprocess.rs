//! Region preprocessing for OCR.
//!
//! Two fixed filter profiles, one per card region:
//!
//! - **Title** (card name): contrast boost, unsharp mask, brightness-adaptive
//!   binary threshold, morphological closing.
//! - **Body** (effect text): stronger contrast boost, light gaussian blur for
//!   noise suppression, brightness-adaptive threshold, morphological closing,
//!   final unsharp mask.
//!
//! All filters operate on the luminance plane (0.299R + 0.587G + 0.114B),
//! replicated back across RGB with alpha preserved. Average brightness is
//! sampled immediately before thresholding, after the contrast/blur steps.
//! Given identical input pixels the output is bit-for-bit identical.

use image::{imageops, GrayImage, Luma, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;
use tracing::debug;

use super::region::RegionKind;

// Title profile constants.
const TITLE_CONTRAST: f32 = 1.8;
const TITLE_SHARPEN_AMOUNT: f32 = 2.0;
const TITLE_SHARPEN_RADIUS: f32 = 1.0;
const TITLE_THRESHOLD_OFFSET: f32 = 20.0;
const TITLE_THRESHOLD_MIN: u8 = 100;
const TITLE_THRESHOLD_MAX: u8 = 180;

// Body profile constants.
const BODY_CONTRAST: f32 = 2.2;
const BODY_BLUR_SIGMA: f32 = 0.5;
const BODY_THRESHOLD_OFFSET: f32 = 10.0;
const BODY_THRESHOLD_MIN: u8 = 90;
const BODY_THRESHOLD_MAX: u8 = 160;
const BODY_SHARPEN_AMOUNT: f32 = 1.5;
const BODY_SHARPEN_RADIUS: f32 = 0.5;

// Closing kernel radius shared by both profiles.
const CLOSING_KERNEL: u8 = 1;

/// Preprocessing options. Upscaling, when enabled, is a fixed
/// nearest-neighbor 2x applied before any filter runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessOptions {
    pub upscale_2x: bool,
}

/// Run the filter profile for `kind` over an extracted region.
///
/// The output has the same dimensions as the input (doubled when
/// `upscale_2x` is set).
pub fn preprocess_region(
    region: &RgbaImage,
    kind: RegionKind,
    options: PreprocessOptions,
) -> RgbaImage {
    let source = if options.upscale_2x {
        let (w, h) = region.dimensions();
        imageops::resize(region, w * 2, h * 2, imageops::FilterType::Nearest)
    } else {
        region.clone()
    };

    let mut gray = luminance_plane(&source);

    match kind {
        RegionKind::CardName => {
            apply_contrast(&mut gray, TITLE_CONTRAST);
            gray = unsharp_mask(&gray, TITLE_SHARPEN_AMOUNT, TITLE_SHARPEN_RADIUS);
            let threshold = adaptive_threshold(
                average_brightness(&gray),
                TITLE_THRESHOLD_OFFSET,
                TITLE_THRESHOLD_MIN,
                TITLE_THRESHOLD_MAX,
            );
            debug!(threshold, "title region threshold");
            apply_threshold(&mut gray, threshold);
            gray = close(&gray, Norm::LInf, CLOSING_KERNEL);
        }
        RegionKind::EffectText => {
            apply_contrast(&mut gray, BODY_CONTRAST);
            gray = gaussian_blur_f32(&gray, BODY_BLUR_SIGMA);
            let threshold = adaptive_threshold(
                average_brightness(&gray),
                BODY_THRESHOLD_OFFSET,
                BODY_THRESHOLD_MIN,
                BODY_THRESHOLD_MAX,
            );
            debug!(threshold, "body region threshold");
            apply_threshold(&mut gray, threshold);
            gray = close(&gray, Norm::LInf, CLOSING_KERNEL);
            gray = unsharp_mask(&gray, BODY_SHARPEN_AMOUNT, BODY_SHARPEN_RADIUS);
        }
    }

    replicate_with_alpha(&gray, &source)
}

/// Extract the luminance plane from an RGBA image.
fn luminance_plane(image: &RgbaImage) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (x, y, pixel) in image.enumerate_pixels() {
        let lum = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
        gray.put_pixel(x, y, Luma([lum.round() as u8]));
    }
    gray
}

/// Replicate a grayscale plane across RGB, carrying alpha over from the
/// original pixels.
fn replicate_with_alpha(gray: &GrayImage, original: &RgbaImage) -> RgbaImage {
    let (w, h) = gray.dimensions();
    let mut out = RgbaImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v = gray.get_pixel(x, y)[0];
            let alpha = original.get_pixel(x, y)[3];
            out.put_pixel(x, y, image::Rgba([v, v, v, alpha]));
        }
    }
    out
}

/// Contrast around the midpoint (128). Factor > 1.0 increases contrast.
fn apply_contrast(gray: &mut GrayImage, factor: f32) {
    for pixel in gray.pixels_mut() {
        let adjusted = ((pixel[0] as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
        pixel[0] = adjusted as u8;
    }
}

/// Unsharp mask: out = center + amount * (center - blurred).
fn unsharp_mask(gray: &GrayImage, amount: f32, radius: f32) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, radius);
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let center = gray.get_pixel(x, y)[0] as f32;
            let blur = blurred.get_pixel(x, y)[0] as f32;
            let sharpened = (center + amount * (center - blur)).clamp(0.0, 255.0);
            out.put_pixel(x, y, Luma([sharpened as u8]));
        }
    }
    out
}

/// Mean luminance over every pixel in the region.
fn average_brightness(gray: &GrayImage) -> f32 {
    let count = (gray.width() * gray.height()) as f64;
    if count == 0.0 {
        return 0.0;
    }
    let sum: f64 = gray.pixels().map(|p| p[0] as f64).sum();
    (sum / count) as f32
}

/// Brightness-adaptive threshold: clamp(avg + offset, min, max).
fn adaptive_threshold(avg_brightness: f32, offset: f32, min: u8, max: u8) -> u8 {
    (avg_brightness + offset).clamp(min as f32, max as f32) as u8
}

/// Binary threshold: strictly above goes white, the rest black.
fn apply_threshold(gray: &mut GrayImage, threshold: u8) {
    for pixel in gray.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { 255 } else { 0 };
    }
}
