//! Text similarity primitives shared by the matcher and confidence scorer.

use std::collections::HashSet;

/// Lowercase and strip everything but alphanumerics and whitespace.
/// Hyphens become spaces so "Blue-Eyes" and "Blue Eyes" compare equal.
pub fn clean(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned words strictly longer than `min_len`.
pub fn meaningful_words(text: &str, min_len: usize) -> Vec<String> {
    clean(text)
        .split_whitespace()
        .filter(|w| w.len() > min_len)
        .map(str::to_string)
        .collect()
}

/// Token-set similarity: intersection-over-union of the word sets, using
/// words longer than two characters. Returns a score in [0,1].
pub fn token_set_similarity(a: &str, b: &str) -> f32 {
    let set_a: HashSet<String> = meaningful_words(a, 2).into_iter().collect();
    let set_b: HashSet<String> = meaningful_words(b, 2).into_iter().collect();

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f32 / union as f32
}

/// Edit-distance similarity between two names, case-insensitive.
pub fn name_similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    strsim::normalized_levenshtein(&a, &b) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_lowercases_and_strips() {
        assert_eq!(clean("Blue-Eyes White Dragon!"), "blue eyes white dragon");
        assert_eq!(clean("  A  *B*  "), "a b");
    }

    #[test]
    fn test_meaningful_words_filters_short() {
        let words = meaningful_words("of the Dark Magician", 2);
        assert_eq!(words, vec!["the", "dark", "magician"]);
    }

    #[test]
    fn test_token_set_similarity_identical() {
        let s = token_set_similarity("dark magician girl", "Dark Magician Girl");
        assert!((s - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_token_set_similarity_disjoint() {
        assert_eq!(token_set_similarity("summoned skull", "harpie lady"), 0.0);
    }

    #[test]
    fn test_token_set_similarity_partial_overlap() {
        // {dark, magician} vs {dark, magician, girl}: 2 shared of 3 total.
        let s = token_set_similarity("dark magician", "dark magician girl");
        assert!((s - 2.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_token_set_similarity_empty() {
        assert_eq!(token_set_similarity("", "dark magician"), 0.0);
        assert_eq!(token_set_similarity("an of to", "dark magician"), 0.0);
    }

    #[test]
    fn test_name_similarity() {
        assert!((name_similarity("Dark Magician", "dark magician") - 1.0).abs() < 0.001);
        assert!(name_similarity("Dark Magician", "Dark Magician Girl") > 0.6);
        assert!(name_similarity("abc", "xyz") < 0.1);
    }
}
