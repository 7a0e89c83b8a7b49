//! Reference card database and price lookup.
//!
//! The database is a read-only snapshot of card records, loaded once per
//! session from a local JSON file or the remote API. Price lookup is a
//! separate capability; it never fails outward, degrading to zeroed amounts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::ScanError;

/// One reference database entry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub name: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    #[serde(default, rename = "type")]
    pub card_type: String,
    #[serde(default)]
    pub race: String,
    #[serde(default)]
    pub archetype: Option<String>,
    #[serde(default, alias = "atk")]
    pub attack: Option<i32>,
    #[serde(default, alias = "def")]
    pub defense: Option<i32>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub set_codes: Vec<String>,
}

/// Snapshot payload shape used by the remote API (`{"data": [...]}`).
#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    data: Vec<CardRecord>,
}

/// Read-only card database for the pipeline's lifetime.
#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    records: Vec<CardRecord>,
}

impl CardCatalog {
    pub fn new(records: Vec<CardRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CardRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Parse a snapshot from JSON. Accepts either a bare array of records or
    /// the remote API envelope `{"data": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        let records = match serde_json::from_str::<Vec<CardRecord>>(json) {
            Ok(records) => records,
            Err(_) => {
                serde_json::from_str::<SnapshotPayload>(json)
                    .map_err(|e| ScanError::Database(format!("snapshot parse: {e}")))?
                    .data
            }
        };
        Ok(Self::new(records))
    }

    /// Load a snapshot from a local JSON file.
    pub fn load_file(path: &Path) -> Result<Self, ScanError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Database(format!("read {}: {e}", path.display())))?;
        let catalog = Self::from_json(&json)?;
        info!("Loaded {} cards from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Fetch a snapshot from the remote database API.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self, ScanError> {
        let payload: SnapshotPayload = client
            .get(url)
            .send()
            .await
            .map_err(|e| ScanError::Database(format!("fetch: {e}")))?
            .json()
            .await
            .map_err(|e| ScanError::Database(format!("decode: {e}")))?;
        info!("Loaded {} cards from {url}", payload.data.len());
        Ok(Self::new(payload.data))
    }
}

/// Market prices for one card, string-formatted decimal amounts.
/// Unknown or failed lookups yield "0.00", never a missing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub ebay: String,
    pub tcgplayer: String,
    pub cardmarket: String,
}

impl Default for PriceQuote {
    fn default() -> Self {
        Self {
            ebay: "0.00".to_string(),
            tcgplayer: "0.00".to_string(),
            cardmarket: "0.00".to_string(),
        }
    }
}

/// Injected price-lookup capability.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Fetch prices for a card by canonical name. Implementations degrade to
    /// `PriceQuote::default()` on any failure.
    async fn fetch_prices(&self, card_name: &str) -> PriceQuote;
}

const YGO_API_URL: &str = "https://db.ygoprodeck.com/api/v7/cardinfo.php";

/// Price client backed by the ygoprodeck card API.
pub struct YgoPriceClient {
    client: reqwest::Client,
    base_url: String,
}

impl YgoPriceClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: YGO_API_URL.to_string(),
        }
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, card_name: &str) -> Result<PriceQuote, ScanError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("name", card_name)])
            .send()
            .await
            .map_err(|e| ScanError::PriceFetch {
                card: card_name.to_string(),
                message: e.to_string(),
            })?;
        let payload: serde_json::Value =
            response.json().await.map_err(|e| ScanError::PriceFetch {
                card: card_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(parse_price_payload(&payload))
    }
}

#[async_trait]
impl PriceLookup for YgoPriceClient {
    async fn fetch_prices(&self, card_name: &str) -> PriceQuote {
        match self.lookup(card_name).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!("price lookup degraded to zero: {e}");
                PriceQuote::default()
            }
        }
    }
}

/// Pull the first price block out of the API payload, zero-filling anything
/// missing.
fn parse_price_payload(payload: &serde_json::Value) -> PriceQuote {
    let prices = &payload["data"][0]["card_prices"][0];
    let field = |key: &str| {
        prices[key]
            .as_str()
            .filter(|s| !s.is_empty())
            .unwrap_or("0.00")
            .to_string()
    };
    PriceQuote {
        ebay: field("ebay_price"),
        tcgplayer: field("tcgplayer_price"),
        cardmarket: field("cardmarket_price"),
    }
}
