//! Signal fusion
//!
//! final = w_lex * lexical + w_tri * trigram + w_sem * semantic, then:
//! - raised to the phonetic floor when the phonetic codes are equal
//! - forced to 1.0 on an exact name, alias or code match
//! - clamped to [0, 1]

use crate::candidates::RawCandidate;
use crate::normalize::{normalize_token, sorted_words};
use crate::types::{Candidate, Token};
use toponym_common::config::{ResolverConfig, SignalWeights};

/// Token-sort similarity of two normalized strings
pub fn lexical_similarity(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_damerau_levenshtein(&sorted_words(a), &sorted_words(b)) as f32
}

/// Weighted fusion of per-candidate signals
#[derive(Debug, Clone)]
pub struct SignalFusion {
    pub weights: SignalWeights,
    pub phonetic_floor: f32,
}

impl Default for SignalFusion {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl SignalFusion {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            weights: config.weights,
            phonetic_floor: config.phonetic_floor,
        }
    }

    /// Score a raw candidate given its semantic similarity
    pub fn score(&self, token: &Token, raw: RawCandidate, semantic: f32) -> Candidate {
        let lexical = lexical_similarity(&token.normalized, &normalize_token(&raw.entity.name))
            .max(lexical_similarity(&token.normalized, &normalize_token(&raw.matched)));
        let trigram = raw.trigram_score.clamp(0.0, 1.0);
        let semantic = semantic.clamp(0.0, 1.0);

        let exact = trigram >= 1.0 || raw.entity.matches_exactly(&token.normalized);

        let mut final_score = self.weights.lexical * lexical
            + self.weights.trigram * trigram
            + self.weights.semantic * semantic;
        if raw.phonetic_equal {
            final_score = final_score.max(self.phonetic_floor);
        }
        if exact {
            final_score = 1.0;
        }

        Candidate {
            entity: raw.entity,
            matched: raw.matched,
            alias_matched: raw.alias_matched,
            lexical_score: lexical,
            phonetic_equal: raw.phonetic_equal,
            trigram_score: trigram,
            semantic_score: semantic,
            final_score: final_score.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::sync::Arc;

    fn raw(id: i64, trigram: f32, phonetic: bool) -> RawCandidate {
        let entity = fixtures::places().into_iter().find(|p| p.id == id).unwrap();
        RawCandidate {
            matched: entity.name.clone(),
            entity: Arc::new(entity),
            alias_matched: false,
            trigram_score: trigram,
            phonetic_equal: phonetic,
        }
    }

    #[test]
    fn test_lexical_similarity() {
        assert_eq!(lexical_similarity("chennai", "chennai"), 1.0);
        assert!((lexical_similarity("chennnai", "chennai") - 0.875).abs() < 1e-6);
        assert_eq!(lexical_similarity("york new", "new york"), 1.0);
        assert_eq!(lexical_similarity("", "india"), 0.0);
    }

    #[test]
    fn test_weighted_sum() {
        let fusion = SignalFusion::default();
        let token = Token::new("chennnai");
        let scored = fusion.score(&token, raw(fixtures::CHENNAI, 0.8, false), 0.5);

        let expected = 0.4 * 0.875 + 0.4 * 0.8 + 0.2 * 0.5;
        assert!((scored.final_score - expected).abs() < 1e-5);
        assert_eq!(scored.lexical_score, 0.875);
    }

    #[test]
    fn test_phonetic_floor() {
        let fusion = SignalFusion::default();
        let token = Token::new("chennnai");
        let scored = fusion.score(&token, raw(fixtures::CHENNAI, 0.5, true), 0.0);
        assert_eq!(scored.final_score, 0.9);

        // The floor never lowers a score
        let high = fusion.score(&token, raw(fixtures::CHENNAI, 0.99, true), 1.0);
        assert!(high.final_score > 0.9);
    }

    #[test]
    fn test_exact_alias_forces_one() {
        let fusion = SignalFusion::default();
        let token = Token::new("Bombay");
        let mut candidate = raw(fixtures::MUMBAI, 0.2, false);
        candidate.matched = "Bombay".to_string();
        candidate.alias_matched = true;

        let scored = fusion.score(&token, candidate, 0.0);
        assert_eq!(scored.final_score, 1.0);
        assert_eq!(scored.lexical_score, 1.0);
    }

    #[test]
    fn test_signals_clipped() {
        let fusion = SignalFusion::default();
        let token = Token::new("zzz");
        let scored = fusion.score(&token, raw(fixtures::CHENNAI, 0.0, false), -0.7);
        assert_eq!(scored.semantic_score, 0.0);
        assert!(scored.final_score >= 0.0 && scored.final_score <= 1.0);
    }

    #[test]
    fn test_deterministic() {
        let fusion = SignalFusion::default();
        let token = Token::new("Maharastra");
        let a = fusion.score(&token, raw(fixtures::MAHARASHTRA, 0.6, false), 0.7);
        let b = fusion.score(&token, raw(fixtures::MAHARASHTRA, 0.6, false), 0.7);
        assert_eq!(a, b);
    }
}
