//! Read-only repository over the gazetteer tables
//!
//! Lookups compare against `toponym_fold(..)`, an indexed accent- and
//! punctuation-folded form of names, aliases and codes. Approximate search
//! filters with the pg_trgm `%` operator so the GIN indexes apply, with the
//! similarity threshold set per transaction. Nothing here writes.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryResult, Statement, TransactionTrait,
};
use std::collections::HashMap;

/// Scopes the `%` threshold to the current transaction
const SET_SIMILARITY_THRESHOLD: &str =
    "SELECT set_config('pg_trgm.similarity_threshold', $1, true)";

/// Name, alias and code hits per place, best first, limited
const APPROX_SQL: &str = r#"
    WITH matches AS (
        SELECT p.id AS place_id, p.name AS matched, FALSE AS alias_matched,
               similarity(toponym_fold(p.name), $1) AS score
        FROM places p
        WHERE p.entity_class = $2
          AND toponym_fold(p.name) % $1
        UNION ALL
        SELECT a.place_id, a.alias, TRUE,
               CASE WHEN toponym_fold(a.alias) = $1 THEN 1.0::real
                    ELSE similarity(toponym_fold(a.alias), $1) END
        FROM place_aliases a
        JOIN places p ON p.id = a.place_id
        WHERE p.entity_class = $2
          AND (toponym_fold(a.alias) = $1 OR toponym_fold(a.alias) % $1)
        UNION ALL
        SELECT p.id, p.code, TRUE, 1.0::real
        FROM places p
        WHERE p.entity_class = $2
          AND toponym_fold(p.code) = $1
    ),
    best AS (
        SELECT DISTINCT ON (place_id) place_id, matched, alias_matched, score
        FROM matches
        ORDER BY place_id, score DESC, alias_matched ASC
    )
    SELECT p.id, p.name, p.entity_class, p.code, p.parent_country_id,
           p.population, p.latitude, p.longitude,
           b.matched, b.alias_matched, b.score::float8 AS score
    FROM best b
    JOIN places p ON p.id = b.place_id
    ORDER BY b.score DESC, p.population DESC, p.name ASC
    LIMIT $3
"#;

/// Places whose folded name, alias or code equals the token
const EXACT_SQL: &str = r#"
    SELECT p.id, p.name, p.entity_class, p.code, p.parent_country_id,
           p.population, p.latitude, p.longitude
    FROM places p
    WHERE p.entity_class = $2
      AND (toponym_fold(p.name) = $1
           OR toponym_fold(p.code) = $1
           OR EXISTS (
               SELECT 1 FROM place_aliases a
               WHERE a.place_id = p.id AND toponym_fold(a.alias) = $1
           ))
    ORDER BY p.population DESC, p.name ASC
"#;

/// A place with its alternate names
#[derive(Debug, Clone)]
pub struct PlaceRecord {
    pub place: Place,
    pub aliases: Vec<String>,
}

/// One approximate-match hit
#[derive(Debug, Clone)]
pub struct ApproxRow {
    pub record: PlaceRecord,
    /// Name, alias or code that produced the score
    pub matched: String,
    pub alias_matched: bool,
    pub similarity: f32,
}

/// Repository for gazetteer reads
#[derive(Clone)]
pub struct GazetteerRepository {
    pool: DbPool,
}

impl GazetteerRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Approximate search by name, alias or code within one class.
    ///
    /// `token` must already be normalized. Alias and code equality score 1.0.
    pub async fn find_approx(
        &self,
        token: &str,
        class: EntityClass,
        floor: f32,
        limit: usize,
    ) -> Result<Vec<ApproxRow>> {
        let txn = self.read_conn().begin().await?;
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            SET_SIMILARITY_THRESHOLD,
            vec![floor.to_string().into()],
        ))
        .await?;

        let rows = txn
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                APPROX_SQL,
                vec![token.into(), class.as_str().into(), (limit as i64).into()],
            ))
            .await?;
        txn.commit().await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(hit) = Self::approx_from_row(row) {
                hits.push(hit);
            }
        }

        let ids: Vec<i64> = hits.iter().map(|h| h.record.place.id).collect();
        let mut aliases = self.aliases_for(&ids).await?;
        for hit in &mut hits {
            hit.record.aliases = aliases.remove(&hit.record.place.id).unwrap_or_default();
        }

        Ok(hits)
    }

    /// Places whose folded name, alias or code equals the normalized token
    pub async fn find_exact(&self, token: &str, class: EntityClass) -> Result<Vec<PlaceRecord>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            EXACT_SQL,
            vec![token.into(), class.as_str().into()],
        );

        let rows = self.read_conn().query_all(stmt).await?;
        let places: Vec<Place> = rows.iter().filter_map(Self::place_from_row).collect();

        let ids: Vec<i64> = places.iter().map(|p| p.id).collect();
        let mut aliases = self.aliases_for(&ids).await?;

        Ok(places
            .into_iter()
            .map(|place| PlaceRecord {
                aliases: aliases.remove(&place.id).unwrap_or_default(),
                place,
            })
            .collect())
    }

    /// Every place of a class together with its aliases
    pub async fn all_places(&self, class: EntityClass) -> Result<Vec<PlaceRecord>> {
        let rows = PlaceEntity::find()
            .filter(PlaceColumn::EntityClass.eq(class.as_str()))
            .find_with_related(PlaceAliasEntity)
            .all(self.read_conn())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(place, aliases)| PlaceRecord {
                place,
                aliases: aliases.into_iter().map(|a| a.alias).collect(),
            })
            .collect())
    }

    /// Single place by id
    pub async fn find_place(&self, id: i64) -> Result<Option<PlaceRecord>> {
        let mut rows = PlaceEntity::find_by_id(id)
            .find_with_related(PlaceAliasEntity)
            .all(self.read_conn())
            .await?;

        Ok(rows.pop().map(|(place, aliases)| PlaceRecord {
            place,
            aliases: aliases.into_iter().map(|a| a.alias).collect(),
        }))
    }

    async fn aliases_for(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = PlaceAliasEntity::find()
            .filter(PlaceAliasColumn::PlaceId.is_in(ids.iter().copied()))
            .all(self.read_conn())
            .await?;

        let mut by_place: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            by_place.entry(row.place_id).or_default().push(row.alias);
        }
        Ok(by_place)
    }

    fn place_from_row(row: &QueryResult) -> Option<Place> {
        Some(Place {
            id: row.try_get("", "id").ok()?,
            name: row.try_get("", "name").ok()?,
            entity_class: row.try_get("", "entity_class").ok()?,
            code: row.try_get("", "code").ok()?,
            parent_country_id: row.try_get("", "parent_country_id").ok()?,
            population: row.try_get("", "population").ok()?,
            latitude: row.try_get("", "latitude").ok()?,
            longitude: row.try_get("", "longitude").ok()?,
        })
    }

    fn approx_from_row(row: &QueryResult) -> Option<ApproxRow> {
        let place = Self::place_from_row(row)?;
        let score: f64 = row.try_get("", "score").ok()?;

        Some(ApproxRow {
            record: PlaceRecord { place, aliases: Vec::new() },
            matched: row.try_get("", "matched").ok()?,
            alias_matched: row.try_get("", "alias_matched").ok()?,
            similarity: score.clamp(0.0, 1.0) as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOLD_MIGRATION: &str =
        include_str!("../../migrations/20261016000000_fold_trigram_indexes.sql");

    #[test]
    fn test_approx_filters_with_indexable_operator() {
        assert!(APPROX_SQL.contains("toponym_fold(p.name) % $1"));
        assert!(APPROX_SQL.contains("toponym_fold(a.alias) % $1"));
        // similarity() only scores rows the index already selected
        assert!(!APPROX_SQL.contains(") >= $"));
        assert!(SET_SIMILARITY_THRESHOLD.contains("pg_trgm.similarity_threshold"));
    }

    #[test]
    fn test_trigram_indexes_cover_folded_columns() {
        assert!(FOLD_MIGRATION.contains("IMMUTABLE"));
        assert!(FOLD_MIGRATION.contains("gin (toponym_fold(name) gin_trgm_ops)"));
        assert!(FOLD_MIGRATION.contains("gin (toponym_fold(alias) gin_trgm_ops)"));
        assert!(EXACT_SQL.contains("toponym_fold(p.code) = $1"));
    }
}
