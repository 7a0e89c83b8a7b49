//! Error taxonomy for the scanning core.
//!
//! Failures inside the single-image pipeline never cross its boundary; they
//! are folded into the `ResultRecord` error field. The variants here classify
//! which stage gave up so callers and logs can tell them apart.

/// Errors produced by the scanning core.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A crop region collapsed to zero area after clamping to image bounds.
    #[error("invalid region {left},{top} {width}x{height} for {image_width}x{image_height} image")]
    InvalidRegion {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    /// The recognition engine failed after all attempts.
    #[error("ocr failed: {0}")]
    Ocr(String),

    /// A source image could not be read or decoded.
    #[error("failed to read image {path}: {message}")]
    ImageRead { path: String, message: String },

    /// Image host upload failed. Non-fatal: the pipeline falls back to a
    /// local reference.
    #[error("image upload failed: {0}")]
    Upload(String),

    /// Price lookup failed. Non-fatal: prices degrade to "0.00".
    #[error("price fetch failed for \"{card}\": {message}")]
    PriceFetch { card: String, message: String },

    /// The card database snapshot could not be loaded or parsed.
    #[error("card database error: {0}")]
    Database(String),

    /// A CSV line could not be parsed into an inventory row.
    #[error("csv parse error on line {line}: {message}")]
    Csv { line: usize, message: String },
}

impl ScanError {
    /// Non-fatal errors degrade the result instead of failing the image.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ScanError::Upload(_) | ScanError::PriceFetch { .. })
    }
}
