//! Gazetteer access
//!
//! Two interchangeable stores behind one read-only trait:
//! - PostgreSQL with pg_trgm (production)
//! - In-memory index loaded from a JSON seed (tests, offline runs)

mod memory;
mod postgres;
pub mod trigram;

pub use memory::InMemoryGazetteer;
pub use postgres::PgGazetteer;

use crate::types::{CanonicalEntity, EntityId};
use std::sync::Arc;
use toponym_common::{EntityClass, Result};

/// One approximate-match hit
#[derive(Debug, Clone, PartialEq)]
pub struct ApproxMatch {
    pub entity: Arc<CanonicalEntity>,

    /// Name, alias or code that produced the similarity
    pub matched: String,

    pub alias_matched: bool,

    /// Trigram similarity in [0, 1]; 1.0 for exact alias or code equality
    pub similarity: f32,
}

/// Read-only gazetteer contract
#[async_trait::async_trait]
pub trait Gazetteer: Send + Sync {
    /// Best matches of a normalized token within one class, at most one per
    /// entity, ordered by similarity desc then population desc then name.
    async fn find_approx(
        &self,
        token: &str,
        class: EntityClass,
        limit: usize,
    ) -> Result<Vec<ApproxMatch>>;

    /// Entities whose normalized name, alias or code equals the token
    async fn find_exact(
        &self,
        token: &str,
        class: EntityClass,
    ) -> Result<Vec<Arc<CanonicalEntity>>>;

    /// Every entity of a class
    async fn universe(&self, class: EntityClass) -> Result<Vec<Arc<CanonicalEntity>>>;

    /// Single entity by id
    async fn entity(&self, id: EntityId) -> Result<Option<Arc<CanonicalEntity>>>;

    /// Check that the store answers
    async fn ping(&self) -> Result<()>;

    /// Short name used in logs and metrics
    fn name(&self) -> &str;
}

/// Ordering shared by both stores
pub(crate) fn compare_matches(a: &ApproxMatch, b: &ApproxMatch) -> std::cmp::Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.entity.population.cmp(&a.entity.population))
        .then_with(|| a.entity.name.cmp(&b.entity.name))
        .then_with(|| a.entity.id.cmp(&b.entity.id))
}
