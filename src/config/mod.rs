//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::RegionMap;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crop regions applied to normalized card images
    pub regions: RegionMap,
    /// Bulk processing settings
    pub bulk: BulkSettings,
    /// OCR engine settings
    pub ocr: OcrSettings,
    /// Remote service settings
    pub remote: RemoteSettings,
}

/// Bulk processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSettings {
    /// Concurrent workers (clamped to 1..=5)
    pub max_concurrent: usize,
    /// Maximum files per run, 0 for unbounded
    pub batch_size: usize,
    /// Skip files whose basename was already seen in this run
    pub skip_duplicates: bool,
    /// Retry failed files before counting them as failures
    pub auto_retry: bool,
    /// What to do when a file fails after retries
    pub error_handling: ErrorHandling,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            batch_size: 25,
            skip_duplicates: true,
            auto_retry: true,
            error_handling: ErrorHandling::Continue,
        }
    }
}

impl BulkSettings {
    /// Worker count with the configured bound applied.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent.clamp(1, 5)
    }
}

/// Reaction to a file that failed after all retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Record the failure and keep going
    Continue,
    /// Pause the run for manual inspection
    Pause,
    /// Stop the run entirely
    Stop,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self::Continue
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Tesseract executable name or path
    pub tesseract_path: String,
    /// Recognition language
    pub language: String,
    /// Upscale regions 2x before preprocessing
    pub upscale_2x: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            upscale_2x: false,
        }
    }
}

/// Remote service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Card database API URL, empty to rely on a local snapshot
    pub database_url: String,
    /// freeimage.host API key, empty to disable uploads
    pub freeimage_api_key: String,
    /// Look up market prices for matched cards
    pub fetch_prices: bool,
    /// Upload card photos for matched cards
    pub upload_images: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            freeimage_api_key: String::new(),
            fetch_prices: false,
            upload_images: false,
        }
    }
}

/// Default configuration path under the platform config directory
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "cashea", "cardscan")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.bulk.max_concurrent, 2);
        assert_eq!(config.bulk.batch_size, 25);
        assert!(config.bulk.skip_duplicates);
        assert!(config.bulk.auto_retry);
        assert_eq!(config.bulk.error_handling, ErrorHandling::Continue);

        assert_eq!(config.ocr.tesseract_path, "tesseract");
        assert_eq!(config.ocr.language, "eng");
        assert!(!config.ocr.upscale_2x);

        assert!(config.remote.database_url.is_empty());
        assert!(!config.remote.fetch_prices);
        assert!(!config.remote.upload_images);

        assert_eq!(config.regions.card_name.width, 650);
        assert_eq!(config.regions.effect_text.top, 740);
    }

    #[test]
    fn test_effective_concurrency_clamped() {
        let mut bulk = BulkSettings::default();
        bulk.max_concurrent = 0;
        assert_eq!(bulk.effective_concurrency(), 1);
        bulk.max_concurrent = 12;
        assert_eq!(bulk.effective_concurrency(), 5);
        bulk.max_concurrent = 3;
        assert_eq!(bulk.effective_concurrency(), 3);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.bulk.max_concurrent, parsed.bulk.max_concurrent);
        assert_eq!(config.bulk.error_handling, parsed.bulk.error_handling);
        assert_eq!(config.ocr.language, parsed.ocr.language);
        assert_eq!(config.regions.card_name.left, parsed.regions.card_name.left);
    }

    #[test]
    fn test_error_handling_snake_case() {
        let mut config = AppConfig::default();
        config.bulk.error_handling = ErrorHandling::Pause;
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("error_handling = \"pause\""));

        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.bulk.error_handling, ErrorHandling::Pause);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.ocr.upscale_2x = true;
        config.remote.fetch_prices = true;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert!(loaded.ocr.upscale_2x);
        assert!(loaded.remote.fetch_prices);
        assert_eq!(loaded.bulk.batch_size, config.bulk.batch_size);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
