//! OCR engine abstraction and the multi-variant adapter.
//!
//! The recognition engine is an injected capability behind [`TextRecognizer`].
//! The adapter tries up to three configuration variants per region kind
//! (different page segmentation modes and character whitelists), keeps the
//! variant with the highest reported confidence, and degrades to an empty
//! string when nothing usable comes back. This best-of strategy is the only
//! one deployed; there is no per-call fallback to a different scheme.

use async_trait::async_trait;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use super::region::RegionKind;
use crate::error::ScanError;

const NAME_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 -,'";
const EFFECT_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 -,'.:;()/!?\"&+";

/// A single recognition configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    /// Tesseract-style page segmentation mode.
    pub page_seg_mode: u32,
    /// Character whitelist, or None for unrestricted recognition.
    pub whitelist: Option<String>,
}

impl OcrConfig {
    pub fn new(page_seg_mode: u32, whitelist: Option<&str>) -> Self {
        Self {
            page_seg_mode,
            whitelist: whitelist.map(str::to_string),
        }
    }
}

/// Raw engine output for one recognition attempt.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub text: String,
    /// Mean confidence in [0,1] as reported by the engine.
    pub confidence: f32,
}

impl OcrOutcome {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

/// Injected text-recognition capability.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(
        &self,
        image: &RgbaImage,
        config: &OcrConfig,
    ) -> Result<OcrOutcome, ScanError>;
}

/// Runs the engine under several configuration variants and keeps the best.
pub struct OcrAdapter {
    engine: Arc<dyn TextRecognizer>,
    name_variants: Vec<OcrConfig>,
    effect_variants: Vec<OcrConfig>,
}

impl OcrAdapter {
    pub fn new(engine: Arc<dyn TextRecognizer>) -> Self {
        // Single line first, then uniform block, then a raw line without a
        // whitelist as the last resort.
        Self {
            engine,
            name_variants: vec![
                OcrConfig::new(7, Some(NAME_WHITELIST)),
                OcrConfig::new(6, Some(NAME_WHITELIST)),
                OcrConfig::new(13, None),
            ],
            effect_variants: vec![
                OcrConfig::new(6, Some(EFFECT_WHITELIST)),
                OcrConfig::new(4, Some(EFFECT_WHITELIST)),
                OcrConfig::new(3, None),
            ],
        }
    }

    /// Build an adapter with explicit variant lists for both region kinds.
    pub fn with_variants(
        engine: Arc<dyn TextRecognizer>,
        name_variants: Vec<OcrConfig>,
        effect_variants: Vec<OcrConfig>,
    ) -> Self {
        Self {
            engine,
            name_variants,
            effect_variants,
        }
    }

    /// Recognize text in a preprocessed region, selecting the
    /// highest-confidence result across the variants for `kind`.
    ///
    /// Returns an empty outcome (not an error) when every variant fails or
    /// none reports usable confidence.
    pub async fn recognize_best(&self, image: &RgbaImage, kind: RegionKind) -> OcrOutcome {
        let variants = match kind {
            RegionKind::CardName => &self.name_variants,
            RegionKind::EffectText => &self.effect_variants,
        };

        let mut best: Option<OcrOutcome> = None;
        for config in variants {
            match self.engine.recognize(image, config).await {
                Ok(outcome) => {
                    debug!(
                        psm = config.page_seg_mode,
                        confidence = outcome.confidence,
                        region = kind.label(),
                        "ocr variant finished"
                    );
                    if outcome.text.trim().is_empty() || outcome.confidence <= 0.0 {
                        continue;
                    }
                    let better = best
                        .as_ref()
                        .map(|b| outcome.confidence > b.confidence)
                        .unwrap_or(true);
                    if better {
                        best = Some(outcome);
                    }
                }
                Err(e) => {
                    warn!(
                        psm = config.page_seg_mode,
                        region = kind.label(),
                        "ocr variant failed: {e}"
                    );
                }
            }
        }

        best.unwrap_or_else(OcrOutcome::empty)
    }
}

/// Tesseract CLI engine: hands the region off as a temp PNG and parses the
/// TSV output for word-level confidence.
pub struct TesseractCli {
    executable: PathBuf,
    language: String,
}

impl TesseractCli {
    pub fn new(executable: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    async fn recognize(
        &self,
        image: &RgbaImage,
        config: &OcrConfig,
    ) -> Result<OcrOutcome, ScanError> {
        let input = NamedTempFile::with_suffix(".png")
            .map_err(|e| ScanError::Ocr(format!("temp file: {e}")))?;
        image
            .save(input.path())
            .map_err(|e| ScanError::Ocr(format!("temp image write: {e}")))?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(config.page_seg_mode.to_string());
        if let Some(ref whitelist) = config.whitelist {
            cmd.arg("-c")
                .arg(format!("tessedit_char_whitelist={whitelist}"));
        }
        cmd.arg("tsv");

        let output = cmd
            .output()
            .await
            .map_err(|e| ScanError::Ocr(format!("failed to launch tesseract: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::Ocr(format!("tesseract exited: {stderr}")));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse tesseract TSV output into joined text plus mean word confidence.
///
/// TSV columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Level 5 rows are words.
fn parse_tsv(tsv: &str) -> OcrOutcome {
    let mut words: Vec<String> = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0usize;
    let mut current_line: i32 = -1;
    let mut text = String::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let line_num: i32 = fields[4].parse().unwrap_or(-1);
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let word = fields[11].trim();
        if word.is_empty() || conf < 0.0 {
            continue;
        }

        if current_line >= 0 && line_num != current_line {
            text.push_str(&words.join(" "));
            text.push('\n');
            words.clear();
        }
        current_line = line_num;
        words.push(word.to_string());
        conf_sum += conf;
        conf_count += 1;
    }
    if !words.is_empty() {
        text.push_str(&words.join(" "));
    }

    let confidence = if conf_count > 0 {
        (conf_sum / conf_count as f32 / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };

    OcrOutcome {
        text: text.trim().to_string(),
        confidence,
    }
}
