//! Lane-label formatting.
//!
//! Raw lane identifiers may contain characters (`-`, `#`) that are not
//! valid in the generated model's identifiers. `format_label` rewrites a
//! raw id into an identifier-safe label and `reformat_label` inverts it.

const PREFIX: &str = "lane";
const HASH_TOKEN: &str = "_h_";

/// Rewrite a raw lane id into a model-identifier-safe label.
pub fn format_label(raw: &str) -> String {
    let mut chars: Vec<char> = raw.chars().collect();
    if chars.first() == Some(&'-') {
        chars[0] = '_';
    }
    if chars.get(1) == Some(&'-') {
        chars[1] = '_';
    }
    let body: String = chars.into_iter().collect();
    format!("{PREFIX}{}", body.replacen('#', HASH_TOKEN, 1))
}

/// Invert [`format_label`]. Returns the input unchanged if it does not
/// carry the label prefix.
pub fn reformat_label(label: &str) -> String {
    let Some(body) = label.strip_prefix(PREFIX) else {
        return label.to_string();
    };
    let body = body.replacen(HASH_TOKEN, "#", 1);
    let mut chars: Vec<char> = body.chars().collect();
    if chars.get(1) == Some(&'_') {
        chars[1] = '-';
    }
    if chars.first() == Some(&'_') {
        chars[0] = '-';
    }
    chars.into_iter().collect()
}
