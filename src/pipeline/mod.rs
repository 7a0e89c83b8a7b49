//! Single-image scan pipeline.
//!
//! One pass over a card photo: decode, normalize to the standard width, crop
//! and preprocess the two OCR regions, recognize, match against the card
//! database and inventory, then optionally upload the photo and fetch market
//! prices for matched cards.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{CardCatalog, PriceLookup, PriceQuote};
use crate::error::ScanError;
use crate::hosting::ImageHost;
use crate::inventory::InventoryRow;
use crate::matching::{score_match, normalize, CardMatch, Matcher};
use crate::vision::{
    extract_region, preprocess_region, OcrAdapter, PreprocessOptions, RegionKind, RegionMap,
};

/// Width every card photo is normalized to before region extraction.
pub const NORMALIZED_WIDTH: u32 = 800;

/// Where a scan currently is. Progress is a coarse percentage for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Pending,
    Reading,
    NamePreprocess,
    NameOcr,
    EffectPreprocess,
    EffectOcr,
    Matching,
    Uploading,
    Pricing,
    Complete,
    Failed,
}

impl ScanStage {
    pub fn progress(&self) -> u8 {
        match self {
            ScanStage::Pending => 0,
            ScanStage::Reading => 10,
            ScanStage::NamePreprocess => 25,
            ScanStage::NameOcr => 40,
            ScanStage::EffectPreprocess => 55,
            ScanStage::EffectOcr => 70,
            ScanStage::Matching => 80,
            ScanStage::Uploading => 85,
            ScanStage::Pricing => 95,
            ScanStage::Complete => 100,
            ScanStage::Failed => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScanStage::Pending => "pending",
            ScanStage::Reading => "reading",
            ScanStage::NamePreprocess => "preprocessing name",
            ScanStage::NameOcr => "recognizing name",
            ScanStage::EffectPreprocess => "preprocessing effect",
            ScanStage::EffectOcr => "recognizing effect",
            ScanStage::Matching => "matching",
            ScanStage::Uploading => "uploading",
            ScanStage::Pricing => "pricing",
            ScanStage::Complete => "complete",
            ScanStage::Failed => "failed",
        }
    }
}

/// Live view of one file moving through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessingQueueItem {
    pub id: Uuid,
    pub file: PathBuf,
    pub stage: ScanStage,
    pub progress: u8,
}

impl ProcessingQueueItem {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file: file.into(),
            stage: ScanStage::Pending,
            progress: 0,
        }
    }

    pub fn at_stage(&self, stage: ScanStage) -> Self {
        Self {
            id: self.id,
            file: self.file.clone(),
            stage,
            progress: stage.progress(),
        }
    }
}

/// Final outcome for one scanned file.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub filename: String,
    /// Normalized OCR text from the name region.
    pub card_name: String,
    /// Normalized OCR text from the effect region.
    pub effect_text: String,
    pub matched: bool,
    pub matched_name: Option<String>,
    pub match_result: CardMatch,
    /// Inventory rows whose card name equals the matched canonical name.
    pub matched_rows: Vec<InventoryRow>,
    pub prices: Option<PriceQuote>,
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub image_url: Option<String>,
    pub error: Option<String>,
}

impl ResultRecord {
    /// Record for a file that failed outright; still one record per file.
    pub fn degraded(filename: impl Into<String>, error: &ScanError, elapsed_ms: u64) -> Self {
        Self {
            filename: filename.into(),
            card_name: String::new(),
            effect_text: String::new(),
            matched: false,
            matched_name: None,
            match_result: CardMatch::None,
            matched_rows: Vec::new(),
            prices: None,
            confidence: 0.0,
            processing_time_ms: elapsed_ms,
            image_url: None,
            error: Some(error.to_string()),
        }
    }

    fn first_row_field(&self, pick: impl Fn(&InventoryRow) -> &str) -> Option<String> {
        self.matched_rows.first().map(|row| pick(row).to_string())
    }

    pub fn set_name(&self) -> Option<String> {
        self.first_row_field(|r| &r.set_name)
    }

    pub fn set_code(&self) -> Option<String> {
        self.first_row_field(|r| &r.set_code)
    }

    pub fn edition(&self) -> Option<String> {
        self.first_row_field(|r| &r.edition)
    }

    pub fn rarity(&self) -> Option<String> {
        self.first_row_field(|r| &r.rarity)
    }

    pub fn condition(&self) -> Option<String> {
        self.first_row_field(|r| &r.condition)
    }
}

/// Feature toggles for one pipeline instance.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub upscale_2x: bool,
    pub fetch_prices: bool,
    pub upload_images: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            upscale_2x: false,
            fetch_prices: false,
            upload_images: false,
        }
    }
}

pub type StageCallback<'a> = &'a (dyn Fn(ScanStage) + Send + Sync);

/// The scan pipeline with its injected capabilities.
pub struct ScanPipeline {
    adapter: OcrAdapter,
    regions: RegionMap,
    catalog: Arc<CardCatalog>,
    inventory: Vec<InventoryRow>,
    matcher: Matcher,
    prices: Option<Arc<dyn PriceLookup>>,
    host: Option<Arc<dyn ImageHost>>,
    options: PipelineOptions,
}

impl ScanPipeline {
    pub fn new(adapter: OcrAdapter, catalog: Arc<CardCatalog>) -> Self {
        Self {
            adapter,
            regions: RegionMap::default(),
            catalog,
            inventory: Vec::new(),
            matcher: Matcher::default(),
            prices: None,
            host: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_regions(mut self, regions: RegionMap) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_inventory(mut self, inventory: Vec<InventoryRow>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_price_lookup(mut self, prices: Arc<dyn PriceLookup>) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn with_image_host(mut self, host: Arc<dyn ImageHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the full pipeline on one file. Any error aborts the scan; callers
    /// wanting one record per file regardless use [`Self::process_file`].
    pub async fn try_process(
        &self,
        path: &Path,
        on_stage: StageCallback<'_>,
    ) -> Result<ResultRecord, ScanError> {
        let started = Instant::now();
        let filename = file_basename(path);

        on_stage(ScanStage::Reading);
        let bytes = tokio::fs::read(path).await.map_err(|e| ScanError::ImageRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| ScanError::ImageRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let normalized = normalize_width(&decoded);

        let preprocess = PreprocessOptions {
            upscale_2x: self.options.upscale_2x,
        };

        on_stage(ScanStage::NamePreprocess);
        let name_crop = extract_region(&normalized, self.regions.get(RegionKind::CardName))?;
        let name_ready = preprocess_region(&name_crop, RegionKind::CardName, preprocess);
        on_stage(ScanStage::NameOcr);
        let name_out = self
            .adapter
            .recognize_best(&name_ready, RegionKind::CardName)
            .await;
        let card_name = normalize(&name_out.text);

        on_stage(ScanStage::EffectPreprocess);
        let effect_crop = extract_region(&normalized, self.regions.get(RegionKind::EffectText))?;
        let effect_ready = preprocess_region(&effect_crop, RegionKind::EffectText, preprocess);
        on_stage(ScanStage::EffectOcr);
        let effect_out = self
            .adapter
            .recognize_best(&effect_ready, RegionKind::EffectText)
            .await;
        let effect_text = normalize(&effect_out.text);

        debug!(%filename, %card_name, %effect_text, "ocr complete");

        on_stage(ScanStage::Matching);
        let (found, matched_rows) = self.matcher.match_with_inventory(
            &card_name,
            &effect_text,
            self.catalog.records(),
            &self.inventory,
        );
        let confidence = score_match(&found, &card_name, &effect_text);
        let matched = found.is_match();
        let matched_name = found.record().map(|r| r.name.clone());

        let mut image_url = None;
        if matched && self.options.upload_images {
            if let Some(ref host) = self.host {
                on_stage(ScanStage::Uploading);
                match encode_jpeg(&normalized) {
                    Ok(jpeg) => match host.upload(&jpeg, &filename).await {
                        Ok(url) => image_url = Some(url),
                        Err(e) => warn!(%filename, "upload skipped: {e}"),
                    },
                    Err(e) => warn!(%filename, "jpeg encode skipped: {e}"),
                }
            }
        }

        let mut prices = None;
        if matched && self.options.fetch_prices {
            if let (Some(ref lookup), Some(ref name)) = (&self.prices, &matched_name) {
                on_stage(ScanStage::Pricing);
                prices = Some(lookup.fetch_prices(name).await);
            }
        }

        on_stage(ScanStage::Complete);
        let elapsed = started.elapsed().as_millis() as u64;
        info!(
            %filename,
            matched,
            match_type = found.match_type(),
            confidence,
            elapsed_ms = elapsed,
            "scan complete"
        );

        Ok(ResultRecord {
            filename,
            card_name,
            effect_text,
            matched,
            matched_name,
            match_result: found,
            matched_rows,
            prices,
            confidence,
            processing_time_ms: elapsed,
            image_url,
            error: None,
        })
    }

    /// Like [`Self::try_process`] but never fails: errors become a degraded
    /// record with the error message attached.
    pub async fn process_file(&self, path: &Path, on_stage: StageCallback<'_>) -> ResultRecord {
        let started = Instant::now();
        match self.try_process(path, on_stage).await {
            Ok(record) => record,
            Err(e) => {
                warn!(file = %path.display(), "scan failed: {e}");
                on_stage(ScanStage::Failed);
                ResultRecord::degraded(
                    file_basename(path),
                    &e,
                    started.elapsed().as_millis() as u64,
                )
            }
        }
    }
}

fn file_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Scale down to the normalized width, preserving aspect ratio. Images at or
/// below the normalized width pass through untouched.
fn normalize_width(decoded: &DynamicImage) -> RgbaImage {
    let rgba = decoded.to_rgba8();
    let (w, h) = rgba.dimensions();
    if w <= NORMALIZED_WIDTH {
        return rgba;
    }
    let scaled_h = ((h as u64 * NORMALIZED_WIDTH as u64) / w as u64).max(1) as u32;
    image::imageops::resize(&rgba, NORMALIZED_WIDTH, scaled_h, FilterType::Triangle)
}

fn encode_jpeg(image: &RgbaImage) -> Result<Vec<u8>, ScanError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(|e| ScanError::Upload(format!("jpeg encode: {e}")))?;
    Ok(buf)
}
