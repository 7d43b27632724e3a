//! Candidate generation
//!
//! Queries every entity class concurrently, each under its own timeout.
//! A failed or slow class contributes nothing; the token still resolves from
//! whatever the other classes returned.

use crate::gazetteer::Gazetteer;
use crate::normalize::normalize_token;
use crate::phonetic::PhoneticIndex;
use crate::types::{CanonicalEntity, EntityId, Token};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use toponym_common::{metrics, AppError, EntityClass, Result};
use tracing::{debug, error, warn};

/// Unscored candidate with its store-side signals
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub entity: Arc<CanonicalEntity>,
    pub matched: String,
    pub alias_matched: bool,
    pub trigram_score: f32,
    pub phonetic_equal: bool,
}

/// A class lookup that produced nothing usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub class: EntityClass,
    pub message: String,
    /// Outage or timeout rather than a fault in the lookup itself
    pub recoverable: bool,
}

/// Everything generated for one token
#[derive(Debug, Clone, Default)]
pub struct GeneratedCandidates {
    pub candidates: Vec<RawCandidate>,
    pub failures: Vec<SourceFailure>,
}

impl GeneratedCandidates {
    /// True when every class lookup failed
    pub fn all_sources_failed(&self) -> bool {
        self.failures.len() == EntityClass::ALL.len()
    }

    pub fn diagnostic(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.class, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Per-class hits from one gazetteer round
struct ClassHits {
    approx: Vec<RawCandidate>,
    exact: Vec<Arc<CanonicalEntity>>,
}

pub struct CandidateGenerator {
    gazetteer: Arc<dyn Gazetteer>,
    phonetic: Arc<PhoneticIndex>,
    limit_per_class: usize,
    query_timeout: Duration,
}

impl CandidateGenerator {
    pub fn new(
        gazetteer: Arc<dyn Gazetteer>,
        phonetic: Arc<PhoneticIndex>,
        limit_per_class: usize,
        query_timeout: Duration,
    ) -> Self {
        Self {
            gazetteer,
            phonetic,
            limit_per_class,
            query_timeout,
        }
    }

    /// Candidates for a non-empty token, deduplicated by entity
    pub async fn generate(&self, token: &Token) -> GeneratedCandidates {
        let lookups = EntityClass::ALL.map(|class| self.lookup_class(token, class));
        let results = futures::future::join_all(lookups).await;

        let mut generated = GeneratedCandidates::default();
        let mut merged: HashMap<(EntityClass, EntityId), RawCandidate> = HashMap::new();

        for (class, result) in EntityClass::ALL.into_iter().zip(results) {
            let hits = match result {
                Ok(hits) => hits,
                Err(e) => {
                    let source = format!("{}:{}", self.gazetteer.name(), class);
                    let recoverable = e.is_recoverable();
                    if recoverable {
                        warn!(
                            source = %source,
                            error = %e,
                            token = %token.normalized,
                            "Gazetteer lookup failed"
                        );
                    } else {
                        // Still contributes nothing, but points at a bug or bad data
                        error!(
                            source = %source,
                            error = %e,
                            token = %token.normalized,
                            "Gazetteer lookup faulted"
                        );
                    }
                    metrics::record_source_failure(&source);
                    generated.failures.push(SourceFailure {
                        class,
                        message: e.to_string(),
                        recoverable,
                    });
                    continue;
                }
            };

            for candidate in hits.approx {
                Self::merge(&mut merged, candidate);
            }
            for entity in hits.exact {
                let matched = entity
                    .surface_forms()
                    .find(|f| normalize_token(f) == token.normalized)
                    .unwrap_or(entity.name.as_str())
                    .to_string();
                Self::merge(
                    &mut merged,
                    RawCandidate {
                        alias_matched: matched != entity.name,
                        matched,
                        entity,
                        trigram_score: 1.0,
                        phonetic_equal: false,
                    },
                );
            }
        }

        let token_code = self.phonetic.encode(&token.normalized);
        generated.candidates = merged
            .into_values()
            .map(|mut c| {
                c.phonetic_equal = self.phonetic.phonetic_equal(&token_code, &c.entity);
                c
            })
            .collect();
        generated.candidates.sort_by(|a, b| {
            b.trigram_score
                .total_cmp(&a.trigram_score)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });

        debug!(
            token = %token.normalized,
            candidates = generated.candidates.len(),
            failed_classes = generated.failures.len(),
            "Generated candidates"
        );

        generated
    }

    /// Approximate and exact lookups of one class, run together.
    /// Only an approximate-lookup failure fails the class.
    async fn lookup_class(&self, token: &Token, class: EntityClass) -> Result<ClassHits> {
        let (approx, exact) = tokio::join!(
            self.timed(
                class,
                self.gazetteer
                    .find_approx(&token.normalized, class, self.limit_per_class)
            ),
            self.timed(class, self.gazetteer.find_exact(&token.normalized, class)),
        );

        let approx = approx?
            .into_iter()
            .map(|hit| RawCandidate {
                entity: hit.entity,
                matched: hit.matched,
                alias_matched: hit.alias_matched,
                trigram_score: hit.similarity,
                phonetic_equal: false,
            })
            .collect();

        let exact = exact.unwrap_or_else(|e| {
            warn!(class = %class, error = %e, "Exact lookup failed, using approximate hits only");
            Vec::new()
        });

        Ok(ClassHits { approx, exact })
    }

    async fn timed<T>(
        &self,
        class: EntityClass,
        query: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        timeout(self.query_timeout, query)
            .await
            .map_err(|_| AppError::Timeout {
                source_name: format!("{}:{}", self.gazetteer.name(), class),
                timeout_ms: self.query_timeout.as_millis() as u64,
            })?
    }

    /// Keep one candidate per entity with the highest trigram score
    fn merge(merged: &mut HashMap<(EntityClass, EntityId), RawCandidate>, candidate: RawCandidate) {
        let key = (candidate.entity.entity_class, candidate.entity.id);
        match merged.get_mut(&key) {
            Some(existing) if candidate.trigram_score > existing.trigram_score => {
                *existing = candidate
            }
            Some(_) => {}
            None => {
                merged.insert(key, candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, FailingGazetteer, SlowGazetteer};

    async fn generator(gazetteer: Arc<dyn Gazetteer>, timeout: Duration) -> CandidateGenerator {
        let phonetic = PhoneticIndex::from_entities(fixtures::places().iter());
        CandidateGenerator::new(gazetteer, Arc::new(phonetic), 5, timeout)
    }

    #[tokio::test]
    async fn test_typo_candidates() {
        let g = generator(fixtures::gazetteer(), Duration::from_millis(800)).await;
        let generated = g.generate(&Token::new("Chennnai")).await;

        assert!(generated.failures.is_empty());
        assert_eq!(generated.candidates.len(), 1);
        let chennai = &generated.candidates[0];
        assert_eq!(chennai.entity.id, fixtures::CHENNAI);
        assert!(chennai.phonetic_equal);
    }

    #[tokio::test]
    async fn test_same_name_across_classes_kept() {
        let g = generator(fixtures::gazetteer(), Duration::from_millis(800)).await;
        let generated = g.generate(&Token::new("Georgia")).await;

        let ids: Vec<EntityId> = generated.candidates.iter().map(|c| c.entity.id).collect();
        assert!(ids.contains(&fixtures::GEORGIA_COUNTRY));
        assert!(ids.contains(&fixtures::GEORGIA_STATE));
        assert!(generated.candidates.iter().take(2).all(|c| c.trigram_score == 1.0));
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let g = generator(fixtures::gazetteer(), Duration::from_millis(800)).await;
        let generated = g.generate(&Token::new("zzxx123")).await;
        assert!(generated.candidates.is_empty());
        assert!(!generated.all_sources_failed());
    }

    #[tokio::test]
    async fn test_one_failing_class_is_skipped() {
        let gazetteer = Arc::new(FailingGazetteer::class(EntityClass::City));
        let g = generator(gazetteer, Duration::from_millis(800)).await;
        let generated = g.generate(&Token::new("Georgia")).await;

        assert_eq!(generated.failures.len(), 1);
        assert_eq!(generated.failures[0].class, EntityClass::City);
        assert!(generated.failures[0].recoverable);
        assert!(!generated.all_sources_failed());
        assert!(!generated.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_faulted_class_is_flagged_but_skipped() {
        let gazetteer = Arc::new(FailingGazetteer::faulted(EntityClass::State));
        let g = generator(gazetteer, Duration::from_millis(800)).await;
        let generated = g.generate(&Token::new("India")).await;

        assert_eq!(generated.failures.len(), 1);
        assert!(!generated.failures[0].recoverable);
        assert!(generated.candidates.iter().any(|c| c.entity.id == fixtures::INDIA));
    }

    #[tokio::test]
    async fn test_all_classes_failing() {
        let g = generator(Arc::new(FailingGazetteer::all()), Duration::from_millis(800)).await;
        let generated = g.generate(&Token::new("Chennai")).await;

        assert!(generated.all_sources_failed());
        assert!(generated.candidates.is_empty());
        assert!(generated.diagnostic().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_slow_gazetteer_times_out() {
        let slow = SlowGazetteer { inner: fixtures::gazetteer() };
        let g = generator(Arc::new(slow), Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let generated = g.generate(&Token::new("Chennai")).await;

        assert!(generated.all_sources_failed());
        assert!(generated.diagnostic().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
