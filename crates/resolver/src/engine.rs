//! Resolution engine
//!
//! Tokens of one query resolve in order so that a country resolved early can
//! steer later tokens. Within a token, class lookups and the embedding request
//! run concurrently, each bounded by its own timeout.

use crate::candidates::CandidateGenerator;
use crate::disambiguation::Disambiguator;
use crate::embedding_cache::{EmbeddingCache, EmbeddingIndex};
use crate::gazetteer::Gazetteer;
use crate::phonetic::PhoneticIndex;
use crate::scoring::SignalFusion;
use crate::types::{QueryContext, ResolutionResult, Token, UnresolvedReason, MAX_TOKEN_CHARS};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use toponym_common::config::ResolverConfig;
use toponym_common::{metrics, Embedder, Result};
use tracing::{debug, info, instrument, warn};

/// Results of one multi-token query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResolution {
    pub query: String,
    pub results: Vec<ResolutionResult>,
}

/// Toponym resolver
pub struct Resolver {
    gazetteer: Arc<dyn Gazetteer>,
    embedder: Arc<dyn Embedder>,
    generator: CandidateGenerator,
    fusion: SignalFusion,
    disambiguator: Disambiguator,
    cache: Arc<EmbeddingCache>,
    semantic_timeout: Duration,
}

impl Resolver {
    /// Assemble a resolver from prebuilt parts
    pub fn new(
        gazetteer: Arc<dyn Gazetteer>,
        embedder: Arc<dyn Embedder>,
        phonetic: Arc<PhoneticIndex>,
        config: &ResolverConfig,
        gazetteer_timeout: Duration,
    ) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(EmbeddingCache::new(embedder.clone(), gazetteer.clone()));
        let generator = CandidateGenerator::new(
            gazetteer.clone(),
            phonetic,
            config.candidate_limit_per_class,
            gazetteer_timeout,
        );

        Ok(Self {
            gazetteer,
            embedder,
            generator,
            fusion: SignalFusion::from_config(config),
            disambiguator: Disambiguator::from_config(config),
            cache,
            semantic_timeout: config.semantic_timeout(),
        })
    }

    /// Build the phonetic index and warm the embedding cache.
    ///
    /// An embedding failure only disables the semantic signal until the
    /// cache can be built; a gazetteer failure here is fatal.
    pub async fn bootstrap(
        gazetteer: Arc<dyn Gazetteer>,
        embedder: Arc<dyn Embedder>,
        config: &ResolverConfig,
        gazetteer_timeout: Duration,
    ) -> Result<Self> {
        let phonetic = Arc::new(PhoneticIndex::build(gazetteer.as_ref()).await?);
        let resolver = Self::new(gazetteer, embedder, phonetic, config, gazetteer_timeout)?;

        match resolver.cache.get().await {
            Ok(index) => info!(entries = index.len(), "Resolver ready"),
            Err(e) => {
                warn!(
                    error = %e,
                    "Embedding cache unavailable, semantic signal disabled until rebuilt"
                );
                metrics::record_source_failure("embedding_cache");
            }
        }

        Ok(resolver)
    }

    pub fn gazetteer(&self) -> &Arc<dyn Gazetteer> {
        &self.gazetteer
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Resolve one token, updating the query context
    #[instrument(skip(self, ctx))]
    pub async fn resolve_token(&self, raw: &str, ctx: &mut QueryContext) -> ResolutionResult {
        let token = Token::new(raw);

        let result = if raw.chars().count() > MAX_TOKEN_CHARS {
            let reason = UnresolvedReason::TokenTooLong { max_chars: MAX_TOKEN_CHARS };
            ResolutionResult::unresolved(&token, reason)
        } else if token.is_empty() {
            ResolutionResult::unresolved(&token, UnresolvedReason::EmptyToken)
        } else {
            self.resolve_normalized(&token, ctx).await
        };

        ctx.observe(&result);
        metrics::record_resolution(result.status().as_str());
        debug!(status = result.status().as_str(), "Token resolved");
        result
    }

    /// Resolve tokens in order with a shared context; one result per token
    pub async fn resolve_batch(&self, tokens: &[String]) -> Vec<ResolutionResult> {
        let started = Instant::now();
        let mut ctx = QueryContext::new();
        let mut results = Vec::with_capacity(tokens.len());

        for raw in tokens {
            results.push(self.resolve_token(raw, &mut ctx).await);
        }

        metrics::record_batch(started.elapsed().as_secs_f64(), tokens.len());
        results
    }

    /// Resolve the pre-split tokens of a free-text query
    pub async fn resolve_query(&self, query: &str, tokens: &[String]) -> QueryResolution {
        QueryResolution {
            query: query.to_string(),
            results: self.resolve_batch(tokens).await,
        }
    }

    async fn resolve_normalized(&self, token: &Token, ctx: &QueryContext) -> ResolutionResult {
        let (generated, semantic) = tokio::join!(
            self.generator.generate(token),
            self.semantic_context(token)
        );

        if generated.all_sources_failed() {
            return ResolutionResult::unresolved(
                token,
                UnresolvedReason::SourcesUnavailable {
                    diagnostic: generated.diagnostic(),
                },
            );
        }

        let candidates = generated
            .candidates
            .into_iter()
            .map(|raw| {
                let score = semantic
                    .as_ref()
                    .and_then(|(index, embedding)| {
                        index.similarity(embedding, raw.entity.entity_class, raw.entity.id)
                    })
                    .unwrap_or(0.0);
                self.fusion.score(token, raw, score)
            })
            .collect();

        self.disambiguator.decide(token, candidates, ctx)
    }

    /// Token embedding and the cache to compare it against. `None` disables
    /// the semantic signal for this token. Only a built cache is consulted.
    async fn semantic_context(&self, token: &Token) -> Option<(Arc<EmbeddingIndex>, Vec<f32>)> {
        let Some(index) = self.cache.current().await else {
            debug!(token = %token.normalized, "Embedding cache not built, semantic signal skipped");
            return None;
        };

        match timeout(self.semantic_timeout, self.embedder.embed(&token.normalized)).await {
            Ok(Ok(embedding)) => Some((index, embedding)),
            Ok(Err(e)) => {
                warn!(error = %e, token = %token.normalized, "Semantic signal unavailable");
                metrics::record_source_failure("embedder");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.semantic_timeout.as_millis() as u64,
                    token = %token.normalized,
                    "Semantic signal timed out"
                );
                metrics::record_source_failure("embedder");
                None
            }
        }
    }
}
