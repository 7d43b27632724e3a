//! Embedding cache over the canonical universe
//!
//! Name and alias vectors for every place, partitioned by class. Built at
//! most once per generation: concurrent first callers share one build, and
//! `rebuild` swaps in a fresh generation without blocking readers of the old.

use crate::gazetteer::Gazetteer;
use crate::normalize::normalize_token;
use crate::types::{CanonicalEntity, EntityId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use toponym_common::embeddings::cosine_similarity;
use toponym_common::{metrics, Embedder, EntityClass, Result};
use tracing::{debug, info};

/// Cached vectors of one place
#[derive(Debug, Clone)]
pub struct CachedEntity {
    pub id: EntityId,
    pub name: String,
    /// Name first, then aliases
    pub vectors: Vec<Vec<f32>>,
}

impl CachedEntity {
    /// Best cosine over all surface forms, never below zero
    fn best_similarity(&self, embedding: &[f32]) -> f32 {
        self.vectors
            .iter()
            .map(|v| cosine_similarity(embedding, v))
            .fold(0.0, f32::max)
    }
}

/// One generation of the cache
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    classes: HashMap<EntityClass, Vec<CachedEntity>>,
    positions: HashMap<(EntityClass, EntityId), usize>,
    model: String,
}

impl EmbeddingIndex {
    fn insert(&mut self, class: EntityClass, entry: CachedEntity) {
        let slot = self.classes.entry(class).or_default();
        self.positions.insert((class, entry.id), slot.len());
        slot.push(entry);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Most similar place of a class and its similarity
    pub fn nearest(&self, embedding: &[f32], class: EntityClass) -> Option<(&CachedEntity, f32)> {
        self.classes
            .get(&class)?
            .iter()
            .map(|entry| (entry, entry.best_similarity(embedding)))
            .max_by(|(a, sa), (b, sb)| sa.total_cmp(sb).then_with(|| b.id.cmp(&a.id)))
    }

    /// Similarity to a specific place, `None` when it is not cached
    pub fn similarity(&self, embedding: &[f32], class: EntityClass, id: EntityId) -> Option<f32> {
        let position = *self.positions.get(&(class, id))?;
        let entry = self.classes.get(&class)?.get(position)?;
        Some(entry.best_similarity(embedding))
    }
}

/// Rebuildable embedding cache.
///
/// `get` builds on first use and is meant for bootstrap and admin paths;
/// per-token scoring reads `current` so a missing cache never costs a build.
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    gazetteer: Arc<dyn Gazetteer>,
    current: RwLock<Arc<OnceCell<Arc<EmbeddingIndex>>>>,
}

impl EmbeddingCache {
    pub fn new(embedder: Arc<dyn Embedder>, gazetteer: Arc<dyn Gazetteer>) -> Self {
        Self {
            embedder,
            gazetteer,
            current: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// Current generation, building it on first use
    pub async fn get(&self) -> Result<Arc<EmbeddingIndex>> {
        let cell = self.current.read().await.clone();
        let index = cell.get_or_try_init(|| self.build()).await?;
        Ok(index.clone())
    }

    /// Build a fresh generation and swap it in
    pub async fn rebuild(&self) -> Result<Arc<EmbeddingIndex>> {
        let index = self.build().await?;
        let cell = OnceCell::new_with(Some(index.clone()));
        *self.current.write().await = Arc::new(cell);
        Ok(index)
    }

    pub async fn is_built(&self) -> bool {
        self.current.read().await.initialized()
    }

    /// Built generation, if any; never starts a build
    pub async fn current(&self) -> Option<Arc<EmbeddingIndex>> {
        self.current.read().await.get().cloned()
    }

    /// Entry count of the current generation; `None` until built
    pub async fn entries(&self) -> Option<usize> {
        self.current().await.map(|index| index.len())
    }

    /// Nearest cached place of a class
    pub async fn nearest(
        &self,
        embedding: &[f32],
        class: EntityClass,
    ) -> Result<Option<(EntityId, String, f32)>> {
        let index = self.get().await?;
        Ok(index
            .nearest(embedding, class)
            .map(|(entry, score)| (entry.id, entry.name.clone(), score)))
    }

    /// Similarity of an embedding to one place
    pub async fn similarity(
        &self,
        embedding: &[f32],
        class: EntityClass,
        id: EntityId,
    ) -> Result<Option<f32>> {
        let index = self.get().await?;
        Ok(index.similarity(embedding, class, id))
    }

    async fn build(&self) -> Result<Arc<EmbeddingIndex>> {
        let started = Instant::now();
        let mut index = EmbeddingIndex {
            model: self.embedder.model_name().to_string(),
            ..Default::default()
        };

        for class in EntityClass::ALL {
            let entities = self.gazetteer.universe(class).await?;
            let texts: Vec<String> = entities.iter().flat_map(|e| Self::texts(e)).collect();
            let mut vectors = self.embedder.embed_batch(&texts).await?.into_iter();

            for entity in &entities {
                let count = Self::texts(entity).len();
                let entry = CachedEntity {
                    id: entity.id,
                    name: entity.name.clone(),
                    vectors: vectors.by_ref().take(count).collect(),
                };
                index.insert(class, entry);
            }
            debug!(class = %class, entries = entities.len(), "Embedded class universe");
        }

        metrics::record_cache_build(index.len());
        info!(
            entries = index.len(),
            model = %index.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Embedding cache built"
        );

        Ok(Arc::new(index))
    }

    /// Normalized name and aliases; codes are too short to embed usefully
    fn texts(entity: &CanonicalEntity) -> Vec<String> {
        std::iter::once(entity.name.as_str())
            .chain(entity.alt_names.iter().map(String::as_str))
            .map(normalize_token)
            .filter(|t| !t.is_empty())
            .collect()
    }
}
