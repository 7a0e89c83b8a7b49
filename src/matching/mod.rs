//! Card identification: normalization, similarity scoring and the tiered
//! matcher that maps OCR output to reference database records.

pub mod confidence;
pub mod matcher;
pub mod normalize;
pub mod similarity;

pub use confidence::score_match;
pub use matcher::{CardMatch, Matcher, MatcherConfig};
pub use normalize::normalize;
pub use similarity::{name_similarity, token_set_similarity};
