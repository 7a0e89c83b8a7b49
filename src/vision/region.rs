//! Rectangular OCR regions and clamped crop extraction.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Rectangular pixel sub-area of a source image designated for focused OCR.
///
/// Coordinates are in the pixel space of an 800px-wide normalized card image.
/// Values a few pixels past the image edge are tolerated and clamped at
/// extraction time rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Default card-name region for an 800px-wide normalized image.
    pub fn card_name_default() -> Self {
        Self::new(60, 70, 650, 160)
    }

    /// Default effect-text region for an 800px-wide normalized image.
    pub fn effect_text_default() -> Self {
        Self::new(60, 740, 680, 210)
    }

    /// Clamp this region to the given image bounds.
    pub fn clamped(&self, image_width: u32, image_height: u32) -> Self {
        let left = self.left.min(image_width);
        let top = self.top.min(image_height);
        Self {
            left,
            top,
            width: self.width.min(image_width.saturating_sub(left)),
            height: self.height.min(image_height.saturating_sub(top)),
        }
    }
}

/// Which of the two canonical card regions a crop came from. Selects the
/// preprocessing profile and the OCR configuration variants downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    CardName,
    EffectText,
}

impl RegionKind {
    pub fn label(&self) -> &'static str {
        match self {
            RegionKind::CardName => "card name",
            RegionKind::EffectText => "effect text",
        }
    }
}

/// The two regions the pipeline reads from every card image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegionMap {
    pub card_name: Region,
    pub effect_text: Region,
}

impl Default for RegionMap {
    fn default() -> Self {
        Self {
            card_name: Region::card_name_default(),
            effect_text: Region::effect_text_default(),
        }
    }
}

impl RegionMap {
    pub fn get(&self, kind: RegionKind) -> Region {
        match kind {
            RegionKind::CardName => self.card_name,
            RegionKind::EffectText => self.effect_text,
        }
    }
}

/// Crop a region out of the source image, clamping to image bounds.
///
/// Returns `InvalidRegion` if the clamped region has zero area.
pub fn extract_region(source: &RgbaImage, region: Region) -> Result<RgbaImage, ScanError> {
    let (img_w, img_h) = source.dimensions();
    let clamped = region.clamped(img_w, img_h);

    if clamped.width == 0 || clamped.height == 0 {
        return Err(ScanError::InvalidRegion {
            left: region.left,
            top: region.top,
            width: region.width,
            height: region.height,
            image_width: img_w,
            image_height: img_h,
        });
    }

    let mut out = RgbaImage::new(clamped.width, clamped.height);
    for y in 0..clamped.height {
        for x in 0..clamped.width {
            out.put_pixel(x, y, *source.get_pixel(clamped.left + x, clamped.top + y));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]))
    }

    #[test]
    fn test_extract_exact_pixels() {
        let src = gradient_image(100, 100);
        let region = Region::new(10, 20, 5, 5);
        let crop = extract_region(&src, region).unwrap();
        assert_eq!(crop.dimensions(), (5, 5));
        assert_eq!(crop.get_pixel(0, 0), src.get_pixel(10, 20));
        assert_eq!(crop.get_pixel(4, 4), src.get_pixel(14, 24));
    }

    #[test]
    fn test_region_clamped_to_bounds() {
        let src = gradient_image(100, 100);
        // Overshoots by a few pixels on both axes.
        let region = Region::new(95, 98, 10, 10);
        let crop = extract_region(&src, region).unwrap();
        assert_eq!(crop.dimensions(), (5, 2));
    }

    #[test]
    fn test_zero_area_region_rejected() {
        let src = gradient_image(100, 100);
        let err = extract_region(&src, Region::new(10, 10, 0, 50)).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRegion { .. }));

        // Entirely outside the image clamps to zero area.
        let err = extract_region(&src, Region::new(200, 200, 50, 50)).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRegion { .. }));
    }

    #[test]
    fn test_default_regions_fit_normalized_card() {
        // 800px-wide card at the standard aspect ratio.
        let map = RegionMap::default();
        let name = map.get(RegionKind::CardName).clamped(800, 1165);
        let effect = map.get(RegionKind::EffectText).clamped(800, 1165);
        assert_eq!(name, Region::card_name_default());
        assert_eq!(effect, Region::effect_text_default());
    }
}
