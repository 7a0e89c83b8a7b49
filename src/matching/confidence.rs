//! Confidence scoring for a completed match.

use super::matcher::CardMatch;
use super::similarity::{name_similarity, token_set_similarity};

const EFFECT_FALLBACK_WEIGHT: f32 = 0.7;

/// Score how confident we are in a match, in [0,1].
///
/// Exact matches score 1.0. Scored tiers report their own similarity. When a
/// tier matched but its score is not positive, fall back to the better of
/// name edit-distance similarity and down-weighted effect-text overlap.
pub fn score_match(found: &CardMatch, ocr_name: &str, ocr_effect: &str) -> f32 {
    let score = match found {
        CardMatch::None => return 0.0,
        CardMatch::Exact(_) => return 1.0,
        CardMatch::Fuzzy { score, .. }
        | CardMatch::Partial { score, .. }
        | CardMatch::EffectChunk { score, .. } => *score,
    };

    let value = if score > 0.0 {
        score
    } else if let Some(record) = found.record() {
        let by_name = name_similarity(ocr_name, &record.name);
        let by_effect = token_set_similarity(ocr_effect, &record.description) * EFFECT_FALLBACK_WEIGHT;
        by_name.max(by_effect)
    } else {
        0.0
    };
    value.clamp(0.0, 1.0)
}
