//! PostgreSQL gazetteer over the pg_trgm-indexed places tables

use super::{ApproxMatch, Gazetteer};
use crate::types::{CanonicalEntity, EntityId};
use std::sync::Arc;
use toponym_common::db::{ApproxRow, PlaceRecord};
use toponym_common::{AppError, EntityClass, GazetteerRepository, Result};
use tracing::warn;

/// Gazetteer reading from the shared repository
pub struct PgGazetteer {
    repo: GazetteerRepository,
    floor: f32,
}

impl PgGazetteer {
    pub fn new(repo: GazetteerRepository, floor: f32) -> Self {
        Self { repo, floor }
    }

    /// Store failures surface as an unavailable data source
    fn unavailable(err: AppError) -> AppError {
        match err {
            AppError::Database(e) => AppError::unavailable("gazetteer", e.to_string()),
            AppError::DatabaseConnection { message } => AppError::unavailable("gazetteer", message),
            other => other,
        }
    }

    fn convert(record: PlaceRecord) -> Option<Arc<CanonicalEntity>> {
        let id = record.place.id;
        match CanonicalEntity::try_from(record) {
            Ok(entity) => Some(Arc::new(entity)),
            Err(e) => {
                warn!(place_id = id, error = %e, "Skipping malformed place");
                None
            }
        }
    }

    fn convert_all(records: Vec<PlaceRecord>) -> Vec<Arc<CanonicalEntity>> {
        records.into_iter().filter_map(Self::convert).collect()
    }

    fn convert_hit(row: ApproxRow) -> Option<ApproxMatch> {
        let entity = Self::convert(row.record)?;
        Some(ApproxMatch {
            entity,
            matched: row.matched,
            alias_matched: row.alias_matched,
            similarity: row.similarity,
        })
    }
}

#[async_trait::async_trait]
impl Gazetteer for PgGazetteer {
    async fn find_approx(
        &self,
        token: &str,
        class: EntityClass,
        limit: usize,
    ) -> Result<Vec<ApproxMatch>> {
        if token.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows = self
            .repo
            .find_approx(token, class, self.floor, limit)
            .await
            .map_err(Self::unavailable)?;

        Ok(rows.into_iter().filter_map(Self::convert_hit).collect())
    }

    async fn find_exact(
        &self,
        token: &str,
        class: EntityClass,
    ) -> Result<Vec<Arc<CanonicalEntity>>> {
        if token.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.repo.find_exact(token, class).await.map_err(Self::unavailable)?;
        Ok(Self::convert_all(records))
    }

    async fn universe(&self, class: EntityClass) -> Result<Vec<Arc<CanonicalEntity>>> {
        let records = self.repo.all_places(class).await.map_err(Self::unavailable)?;
        Ok(Self::convert_all(records))
    }

    async fn entity(&self, id: EntityId) -> Result<Option<Arc<CanonicalEntity>>> {
        let record = self.repo.find_place(id).await.map_err(Self::unavailable)?;
        Ok(record.and_then(Self::convert))
    }

    async fn ping(&self) -> Result<()> {
        self.repo.ping().await.map_err(Self::unavailable)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
