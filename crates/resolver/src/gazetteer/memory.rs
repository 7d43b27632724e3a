//! In-memory gazetteer
//!
//! Holds every place with precomputed normalized forms and trigram sets.
//! Scores match the PostgreSQL store so either can back the resolver.

use super::trigram::TrigramSet;
use super::{compare_matches, ApproxMatch, Gazetteer};
use crate::normalize::normalize_token;
use crate::types::{CanonicalEntity, EntityId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use toponym_common::{AppError, EntityClass, Result};
use tracing::{debug, info};

struct IndexedForm {
    text: String,
    normalized: String,
    trigrams: TrigramSet,
    alias: bool,
}

struct IndexedEntity {
    entity: Arc<CanonicalEntity>,
    forms: Vec<IndexedForm>,
}

impl IndexedEntity {
    fn new(entity: Arc<CanonicalEntity>) -> Self {
        let mut forms = Vec::new();
        for (i, text) in entity.surface_forms().enumerate() {
            let normalized = normalize_token(text);
            if normalized.is_empty() {
                continue;
            }
            forms.push(IndexedForm {
                text: text.to_string(),
                trigrams: TrigramSet::new(&normalized),
                normalized,
                alias: i > 0,
            });
        }
        Self { entity, forms }
    }

    /// Best-scoring form; the canonical name wins ties
    fn best_match(&self, token: &str, token_grams: &TrigramSet) -> Option<(&IndexedForm, f32)> {
        let mut best: Option<(&IndexedForm, f32)> = None;
        for form in &self.forms {
            let score = if form.normalized == token {
                1.0
            } else {
                form.trigrams.similarity(token_grams)
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((form, score));
            }
        }
        best
    }
}

/// Gazetteer backed by a vector of places
pub struct InMemoryGazetteer {
    by_class: HashMap<EntityClass, Vec<IndexedEntity>>,
    by_id: HashMap<EntityId, Arc<CanonicalEntity>>,
    floor: f32,
}

impl InMemoryGazetteer {
    /// Index the given places. Ids must be unique.
    pub fn new(entities: Vec<CanonicalEntity>, floor: f32) -> Result<Self> {
        let mut by_class: HashMap<EntityClass, Vec<IndexedEntity>> = HashMap::new();
        let mut by_id = HashMap::with_capacity(entities.len());

        for entity in entities {
            let id = entity.id;
            let entity = Arc::new(entity);
            if by_id.insert(id, entity.clone()).is_some() {
                return Err(AppError::Validation {
                    message: format!("duplicate place id {}", id),
                    field: Some("id".to_string()),
                });
            }
            by_class
                .entry(entity.entity_class)
                .or_default()
                .push(IndexedEntity::new(entity));
        }

        debug!(places = by_id.len(), "In-memory gazetteer indexed");
        Ok(Self { by_class, by_id, floor })
    }

    /// Load places from a JSON array of canonical entities
    pub async fn from_seed_file(path: impl AsRef<Path>, floor: f32) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let entities: Vec<CanonicalEntity> = serde_json::from_str(&raw)?;

        info!(path = %path.display(), places = entities.len(), "Loaded gazetteer seed");
        Self::new(entities, floor)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn class(&self, class: EntityClass) -> &[IndexedEntity] {
        self.by_class.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[async_trait::async_trait]
impl Gazetteer for InMemoryGazetteer {
    async fn find_approx(
        &self,
        token: &str,
        class: EntityClass,
        limit: usize,
    ) -> Result<Vec<ApproxMatch>> {
        if token.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let token_grams = TrigramSet::new(token);
        let mut hits: Vec<ApproxMatch> = self
            .class(class)
            .iter()
            .filter_map(|indexed| {
                let (form, similarity) = indexed.best_match(token, &token_grams)?;
                (similarity >= self.floor).then(|| ApproxMatch {
                    entity: indexed.entity.clone(),
                    matched: form.text.clone(),
                    alias_matched: form.alias,
                    similarity,
                })
            })
            .collect();

        hits.sort_by(compare_matches);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn find_exact(
        &self,
        token: &str,
        class: EntityClass,
    ) -> Result<Vec<Arc<CanonicalEntity>>> {
        let mut hits: Vec<Arc<CanonicalEntity>> = self
            .class(class)
            .iter()
            .filter(|indexed| indexed.forms.iter().any(|f| f.normalized == token))
            .map(|indexed| indexed.entity.clone())
            .collect();

        hits.sort_by(|a, b| b.population.cmp(&a.population).then_with(|| a.name.cmp(&b.name)));
        Ok(hits)
    }

    async fn universe(&self, class: EntityClass) -> Result<Vec<Arc<CanonicalEntity>>> {
        Ok(self.class(class).iter().map(|i| i.entity.clone()).collect())
    }

    async fn entity(&self, id: EntityId) -> Result<Option<Arc<CanonicalEntity>>> {
        Ok(self.by_id.get(&id).cloned())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
