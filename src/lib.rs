//! cardscan - Trading card photo recognition
//!
//! Extracts the name and effect-text regions from a card photo, runs OCR on
//! each, matches the recognized text against a reference card database and an
//! optional user inventory, and aggregates results for export. A bulk
//! orchestrator fans the per-image pipeline out over a file queue with
//! bounded concurrency, retry and pause/resume/stop control.

pub mod bulk;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hosting;
pub mod inventory;
pub mod matching;
pub mod pipeline;
pub mod vision;

pub use bulk::{BulkHandle, BulkOrchestrator, BulkSnapshot, ScanEvent};
pub use config::{AppConfig, BulkSettings, ErrorHandling};
pub use error::ScanError;
pub use matching::{CardMatch, Matcher, MatcherConfig};
pub use pipeline::{ResultRecord, ScanPipeline, ScanStage};
pub use vision::{OcrAdapter, Region, RegionKind, TextRecognizer};
