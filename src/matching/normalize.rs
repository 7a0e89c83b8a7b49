//! OCR text cleanup.

/// Strip OCR noise down to a comparable canonical string.
///
/// Keeps letters, digits, whitespace, hyphen, comma and apostrophe, collapses
/// whitespace runs to a single space and trims. Idempotent:
/// `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | ',' | '\''))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
