//! Tiered card matching.
//!
//! Strategies run in priority order, first success wins: exact name, fuzzy
//! whole-text, partial-name, phrase-chunk over the effect text. All score
//! thresholds are strict `>` comparisons. Ties keep the first record reaching
//! the winning score in database iteration order.

use tracing::debug;

use super::similarity::{clean, meaningful_words, token_set_similarity};
use crate::catalog::CardRecord;
use crate::inventory::InventoryRow;

/// Outcome of a match attempt, tagged by the tier that produced it.
#[derive(Debug, Clone)]
pub enum CardMatch {
    None,
    Exact(CardRecord),
    Fuzzy { record: CardRecord, score: f32 },
    Partial { record: CardRecord, score: f32 },
    EffectChunk { record: CardRecord, score: f32 },
}

impl CardMatch {
    pub fn record(&self) -> Option<&CardRecord> {
        match self {
            CardMatch::None => None,
            CardMatch::Exact(record)
            | CardMatch::Fuzzy { record, .. }
            | CardMatch::Partial { record, .. }
            | CardMatch::EffectChunk { record, .. } => Some(record),
        }
    }

    pub fn score(&self) -> Option<f32> {
        match self {
            CardMatch::None => None,
            CardMatch::Exact(_) => Some(1.0),
            CardMatch::Fuzzy { score, .. }
            | CardMatch::Partial { score, .. }
            | CardMatch::EffectChunk { score, .. } => Some(*score),
        }
    }

    pub fn is_match(&self) -> bool {
        !matches!(self, CardMatch::None)
    }

    pub fn match_type(&self) -> &'static str {
        match self {
            CardMatch::None => "none",
            CardMatch::Exact(_) => "exact",
            CardMatch::Fuzzy { .. } => "fuzzy",
            CardMatch::Partial { .. } => "partial",
            CardMatch::EffectChunk { .. } => "effect",
        }
    }
}

/// Per-tier similarity thresholds.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Token-set similarity floor for the fuzzy whole-text tier.
    pub fuzzy_threshold: f32,
    /// Fraction of card-name words that must appear in a record name.
    pub partial_threshold: f32,
    /// Fraction of effect-text windows that must appear in a description.
    pub chunk_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.3,
            partial_threshold: 0.5,
            chunk_threshold: 0.3,
        }
    }
}

// Phrase-chunk tier parameters: 3-word windows over effect words longer
// than 3 characters, requiring at least 3 such words.
const CHUNK_WINDOW: usize = 3;
const CHUNK_MIN_WORDS: usize = 3;
const CHUNK_WORD_MIN_LEN: usize = 3;

/// Searches a reference database (and optionally an inventory) for the card
/// behind a pair of normalized OCR texts.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Run the match tiers against the reference database.
    pub fn find_match(
        &self,
        card_name: &str,
        effect_text: &str,
        records: &[CardRecord],
    ) -> CardMatch {
        let card_name = card_name.trim();
        let effect_text = effect_text.trim();
        if card_name.is_empty() && effect_text.is_empty() {
            return CardMatch::None;
        }

        if !card_name.is_empty() {
            for record in records {
                if record.name.eq_ignore_ascii_case(card_name) {
                    debug!(name = %record.name, "exact match");
                    return CardMatch::Exact(record.clone());
                }
            }
        }

        if let Some(found) = self.fuzzy_match(card_name, effect_text, records) {
            return found;
        }
        if !card_name.is_empty() {
            if let Some(found) = self.partial_name_match(card_name, records) {
                return found;
            }
        }
        if !effect_text.is_empty() {
            if let Some(found) = self.effect_chunk_match(effect_text, records) {
                return found;
            }
        }

        CardMatch::None
    }

    /// Two-stage strategy: identify the canonical card in the reference
    /// database, then collect inventory rows whose name equals it.
    pub fn match_with_inventory(
        &self,
        card_name: &str,
        effect_text: &str,
        records: &[CardRecord],
        inventory: &[InventoryRow],
    ) -> (CardMatch, Vec<InventoryRow>) {
        let found = self.find_match(card_name, effect_text, records);
        let rows = match found.record() {
            Some(record) => inventory
                .iter()
                .filter(|row| row.card_name.trim().eq_ignore_ascii_case(record.name.trim()))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        (found, rows)
    }

    /// Token-set similarity between the combined OCR text and each record's
    /// combined name + description.
    fn fuzzy_match(
        &self,
        card_name: &str,
        effect_text: &str,
        records: &[CardRecord],
    ) -> Option<CardMatch> {
        let query = format!("{card_name} {effect_text}");
        let mut best: Option<(f32, &CardRecord)> = None;

        for record in records {
            let candidate = format!("{} {}", record.name, record.description);
            let score = token_set_similarity(&query, &candidate);
            if score > self.config.fuzzy_threshold
                && best.map(|(s, _)| score > s).unwrap_or(true)
            {
                best = Some((score, record));
            }
        }

        best.map(|(score, record)| {
            debug!(name = %record.name, score, "fuzzy match");
            CardMatch::Fuzzy {
                record: record.clone(),
                score,
            }
        })
    }

    /// Fraction of card-name words (length > 2) found as substrings of a
    /// record's cleaned name.
    fn partial_name_match(&self, card_name: &str, records: &[CardRecord]) -> Option<CardMatch> {
        let words = meaningful_words(card_name, 2);
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(f32, &CardRecord)> = None;
        for record in records {
            let record_name = clean(&record.name);
            let matched = words.iter().filter(|w| record_name.contains(*w)).count();
            let score = matched as f32 / words.len() as f32;
            if score > self.config.partial_threshold
                && best.map(|(s, _)| score > s).unwrap_or(true)
            {
                best = Some((score, record));
            }
        }

        best.map(|(score, record)| {
            debug!(name = %record.name, score, "partial name match");
            CardMatch::Partial {
                record: record.clone(),
                score,
            }
        })
    }

    /// Slide a fixed window over the effect words and count windows that
    /// appear verbatim in a record's cleaned description.
    fn effect_chunk_match(&self, effect_text: &str, records: &[CardRecord]) -> Option<CardMatch> {
        let words = meaningful_words(effect_text, CHUNK_WORD_MIN_LEN);
        if words.len() < CHUNK_MIN_WORDS {
            return None;
        }
        let window_count = words.len() - CHUNK_WINDOW + 1;

        let mut best: Option<(f32, &CardRecord)> = None;
        for record in records {
            if record.description.is_empty() {
                continue;
            }
            let description = clean(&record.description);
            let matched = words
                .windows(CHUNK_WINDOW)
                .filter(|w| description.contains(&w.join(" ")))
                .count();
            let score = matched as f32 / window_count as f32;
            if score > self.config.chunk_threshold
                && best.map(|(s, _)| score > s).unwrap_or(true)
            {
                best = Some((score, record));
            }
        }

        best.map(|(score, record)| {
            debug!(name = %record.name, score, "effect chunk match");
            CardMatch::EffectChunk {
                record: record.clone(),
                score,
            }
        })
    }
}
