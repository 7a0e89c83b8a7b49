//! Vision layer
//!
//! Region extraction, per-region pixel preprocessing and the OCR adapter.
//! The recognition engine itself is an injected collaborator; the default
//! implementation shells out to the tesseract CLI.

pub mod ocr;
pub mod preprocess;
pub mod region;

pub use ocr::{OcrAdapter, OcrConfig, OcrOutcome, TesseractCli, TextRecognizer};
pub use preprocess::{preprocess_region, PreprocessOptions};
pub use region::{extract_region, Region, RegionKind, RegionMap};
