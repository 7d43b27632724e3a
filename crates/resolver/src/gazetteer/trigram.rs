//! Character-trigram similarity with pg_trgm semantics
//!
//! Lets the in-memory gazetteer score exactly like `similarity()` in
//! PostgreSQL: each word is padded with two leading and one trailing blank,
//! and the score is shared trigrams over the union of both sets.

use std::collections::HashSet;

/// Set of padded trigrams of a string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrigramSet(HashSet<[char; 3]>);

impl TrigramSet {
    pub fn new(text: &str) -> Self {
        let mut grams = HashSet::new();
        let lowered = text.to_lowercase();

        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let padded: Vec<char> = format!("  {} ", word).chars().collect();
            for window in padded.windows(3) {
                grams.insert([window[0], window[1], window[2]]);
            }
        }

        Self(grams)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shared over union, in [0, 1]
    pub fn similarity(&self, other: &TrigramSet) -> f32 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }

        let shared = self.0.intersection(&other.0).count();
        let union = self.len() + other.len() - shared;
        shared as f32 / union as f32
    }
}

/// Convenience wrapper for one-off comparisons
pub fn similarity(a: &str, b: &str) -> f32 {
    TrigramSet::new(a).similarity(&TrigramSet::new(b))
}
