//! Image hosting for scanned card photos.
//!
//! Uploads are strictly optional enrichment. Failures surface as
//! [`ScanError::Upload`], which callers treat as non-fatal.

use async_trait::async_trait;
use base64::Engine;
use tracing::info;

use crate::error::ScanError;

/// Injected image-hosting capability.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload encoded image bytes, returning the public URL.
    async fn upload(&self, image_bytes: &[u8], filename: &str) -> Result<String, ScanError>;
}

const FREEIMAGE_API_URL: &str = "https://freeimage.host/api/1/upload";

/// Host backed by the freeimage.host upload API.
pub struct FreeImageHost {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FreeImageHost {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: FREEIMAGE_API_URL.to_string(),
        }
    }

    pub fn with_base_url(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ImageHost for FreeImageHost {
    async fn upload(&self, image_bytes: &[u8], filename: &str) -> Result<String, ScanError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let response = self
            .client
            .post(&self.base_url)
            .form(&[
                ("key", self.api_key.as_str()),
                ("action", "upload"),
                ("format", "json"),
                ("source", encoded.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ScanError::Upload(format!("{filename}: {e}")))?;

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ScanError::Upload(format!("{filename}: decode: {e}")))?;
        let url = payload["image"]["url"]
            .as_str()
            .ok_or_else(|| ScanError::Upload(format!("{filename}: no url in response")))?
            .to_string();
        info!("Uploaded {filename} to {url}");
        Ok(url)
    }
}
