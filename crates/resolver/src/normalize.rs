//! Token normalization
//!
//! Every surface form (user tokens, canonical names, aliases, codes) goes
//! through the same fold before it is compared:
//! - Unicode NFD, combining marks dropped, then NFKC
//! - Dots removed so abbreviations collapse ("U.S.A" -> "usa")
//! - Any other non-alphanumeric character becomes a space
//! - Whitespace collapsed, lower-cased
//!
//! The PostgreSQL gazetteer applies the equivalent fold in SQL.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold a raw string into its comparable form. May return an empty string.
pub fn normalize_token(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let mut folded = String::with_capacity(stripped.len());
    for c in stripped.nfkc() {
        if c == '.' {
            continue;
        }
        if c.is_alphanumeric() {
            folded.extend(c.to_lowercase());
        } else {
            folded.push(' ');
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Words of an already-normalized string, sorted
pub fn sorted_words(normalized: &str) -> String {
    let mut words: Vec<&str> = normalized.split_whitespace().collect();
    words.sort_unstable();
    words.join(" ")
}
