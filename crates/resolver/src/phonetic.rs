//! Phonetic codes for canonical names
//!
//! Metaphone codes per word, joined by a space. The index is built once from
//! the gazetteer universe and only ever boosts candidates that a gazetteer
//! lookup already produced.

use crate::gazetteer::Gazetteer;
use crate::normalize::normalize_token;
use crate::types::{CanonicalEntity, EntityId};
use rphonetic::{Encoder, Metaphone};
use std::collections::HashMap;
use toponym_common::{EntityClass, Result};
use tracing::info;

/// Encodes normalized strings
pub struct PhoneticEncoder {
    metaphone: Metaphone,
}

impl Default for PhoneticEncoder {
    fn default() -> Self {
        Self {
            metaphone: Metaphone::default(),
        }
    }
}

impl PhoneticEncoder {
    /// Code of a normalized string; empty when no word yields a code
    pub fn encode(&self, normalized: &str) -> String {
        normalized
            .split_whitespace()
            .filter(|w| w.chars().any(|c| c.is_ascii_alphabetic()))
            .map(|w| self.metaphone.encode(w))
            .filter(|code| !code.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn entity_codes(&self, entity: &CanonicalEntity) -> Vec<String> {
        let mut codes: Vec<String> = entity
            .surface_forms()
            .map(|form| self.encode(&normalize_token(form)))
            .filter(|code| !code.is_empty())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

/// Phonetic codes of every canonical name and alias, per class
#[derive(Default)]
pub struct PhoneticIndex {
    encoder: PhoneticEncoder,
    codes: HashMap<(EntityClass, EntityId), Vec<String>>,
}

impl PhoneticIndex {
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a CanonicalEntity>) -> Self {
        let encoder = PhoneticEncoder::default();
        let codes = entities
            .into_iter()
            .map(|e| ((e.entity_class, e.id), encoder.entity_codes(e)))
            .collect();
        Self { encoder, codes }
    }

    /// Build from the full gazetteer universe
    pub async fn build(gazetteer: &dyn Gazetteer) -> Result<Self> {
        let mut entities = Vec::new();
        for class in EntityClass::ALL {
            entities.extend(gazetteer.universe(class).await?);
        }

        let index = Self::from_entities(entities.iter().map(|e| e.as_ref()));
        info!(entries = index.len(), "Phonetic index built");
        Ok(index)
    }

    pub fn encode(&self, normalized: &str) -> String {
        self.encoder.encode(normalized)
    }

    /// True when the token code equals a code of the entity's name or aliases.
    /// Entities missing from the index are encoded on the fly.
    pub fn phonetic_equal(&self, token_code: &str, entity: &CanonicalEntity) -> bool {
        if token_code.is_empty() {
            return false;
        }

        match self.codes.get(&(entity.entity_class, entity.id)) {
            Some(codes) => codes.iter().any(|c| c == token_code),
            None => self
                .encoder
                .entity_codes(entity)
                .iter()
                .any(|c| c == token_code),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_typo_shares_code() {
        let encoder = PhoneticEncoder::default();
        assert_eq!(encoder.encode("chennnai"), encoder.encode("chennai"));
        assert!(!encoder.encode("chennai").is_empty());
    }

    #[test]
    fn test_multi_word_codes() {
        let encoder = PhoneticEncoder::default();
        let code = encoder.encode("new zealand");
        assert_eq!(code.split(' ').count(), 2);
    }

    #[test]
    fn test_no_letters_no_code() {
        let encoder = PhoneticEncoder::default();
        assert_eq!(encoder.encode("123"), "");
        assert_eq!(encoder.encode(""), "");
    }

    #[test]
    fn test_index_covers_universe() {
        let gazetteer = fixtures::gazetteer();
        let index = tokio_test::block_on(PhoneticIndex::build(gazetteer.as_ref())).unwrap();
        assert_eq!(index.len(), fixtures::places().len());

        let chennai = tokio_test::block_on(gazetteer.entity(fixtures::CHENNAI)).unwrap().unwrap();
        let code = index.encode("chennnai");
        assert!(index.phonetic_equal(&code, &chennai));

        let mumbai = tokio_test::block_on(gazetteer.entity(fixtures::MUMBAI)).unwrap().unwrap();
        assert!(!index.phonetic_equal(&code, &mumbai));
        assert!(!index.phonetic_equal("", &chennai));
    }

    #[test]
    fn test_alias_codes_match() {
        let places = fixtures::places();
        let index = PhoneticIndex::from_entities(places.iter());
        let mumbai = places.iter().find(|p| p.id == fixtures::MUMBAI).unwrap();
        assert!(index.phonetic_equal(&index.encode("bombay"), mumbai));
    }

    #[test]
    fn test_unindexed_entity_encoded_on_the_fly() {
        let index = PhoneticIndex::default();
        let chennai = fixtures::places().into_iter().find(|p| p.id == fixtures::CHENNAI).unwrap();
        assert!(index.phonetic_equal(&index.encode("chenai"), &chennai));
    }
}
