/// Placeholder for text that is empty once cleaned.
pub const UNTITLED: &str = "Untitled";

/// Normalize free text: optionally drop non-ASCII (emoji, smart quotes),
/// collapse whitespace runs to single spaces, trim. Never returns an empty string.
pub fn clean_text(text: &str, strip_non_ascii: bool) -> String {
    let filtered: String = if strip_non_ascii {
        text.chars().filter(char::is_ascii).collect()
    } else {
        text.to_string()
    };

    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        UNTITLED.to_string()
    } else {
        collapsed
    }
}

/// Keyword tokens of a piece of text: lowercase, longer than two characters,
/// not purely numeric. Duplicates are kept in order.
pub fn tokenize(text: &str) -> Vec<String> {
    clean_text(text, true)
        .split_whitespace()
        .filter(|w| w.len() > 2 && !w.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_lowercase)
        .collect()
}
