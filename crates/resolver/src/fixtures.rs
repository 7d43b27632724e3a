//! Shared test gazetteer and failing doubles

use crate::gazetteer::{ApproxMatch, Gazetteer, InMemoryGazetteer};
use crate::types::{CanonicalEntity, Centroid, EntityId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toponym_common::embeddings::HashingEmbedder;
use toponym_common::{AppError, Embedder, EntityClass, Result};

pub const INDIA: EntityId = 1;
pub const UNITED_STATES: EntityId = 2;
pub const PAKISTAN: EntityId = 3;
pub const GEORGIA_COUNTRY: EntityId = 4;
pub const MAHARASHTRA: EntityId = 10;
pub const GEORGIA_STATE: EntityId = 11;
pub const CHENNAI: EntityId = 20;
pub const MUMBAI: EntityId = 21;
pub const HYDERABAD_IN: EntityId = 22;
pub const HYDERABAD_PK: EntityId = 23;

fn place(
    id: EntityId,
    name: &str,
    class: EntityClass,
    aliases: &[&str],
    code: Option<&str>,
    parent: Option<EntityId>,
    population: i64,
    (lat, lon): (f64, f64),
) -> CanonicalEntity {
    CanonicalEntity {
        id,
        name: name.to_string(),
        entity_class: class,
        alt_names: aliases.iter().map(|a| a.to_string()).collect(),
        code: code.map(str::to_string),
        parent_country: parent,
        population,
        centroid: Centroid { lat, lon },
    }
}

pub fn places() -> Vec<CanonicalEntity> {
    use EntityClass::*;

    vec![
        place(
            INDIA,
            "India",
            Country,
            &["Bharat", "Republic of India"],
            Some("IND"),
            None,
            1_428_000_000,
            (20.6, 79.0),
        ),
        place(
            UNITED_STATES,
            "United States",
            Country,
            &["United States of America", "America", "US"],
            Some("USA"),
            None,
            334_900_000,
            (39.8, -98.6),
        ),
        place(PAKISTAN, "Pakistan", Country, &[], Some("PAK"), None, 240_500_000, (30.4, 69.3)),
        place(
            GEORGIA_COUNTRY,
            "Georgia",
            Country,
            &["Sakartvelo"],
            Some("GEO"),
            None,
            3_700_000,
            (42.3, 43.4),
        ),
        place(
            5,
            "New Zealand",
            Country,
            &["Aotearoa"],
            Some("NZL"),
            None,
            5_200_000,
            (-40.9, 174.9),
        ),
        place(
            MAHARASHTRA,
            "Maharashtra",
            State,
            &[],
            Some("MH"),
            Some(INDIA),
            112_400_000,
            (19.7, 75.7),
        ),
        place(
            GEORGIA_STATE,
            "Georgia",
            State,
            &[],
            Some("GA"),
            Some(UNITED_STATES),
            11_000_000,
            (32.2, -82.9),
        ),
        place(12, "Telangana", State, &[], Some("TG"), Some(INDIA), 35_000_000, (18.1, 79.0)),
        place(13, "Sindh", State, &[], None, Some(PAKISTAN), 55_700_000, (25.9, 68.5)),
        place(CHENNAI, "Chennai", City, &["Madras"], None, Some(INDIA), 7_090_000, (13.08, 80.27)),
        place(MUMBAI, "Mumbai", City, &["Bombay"], None, Some(INDIA), 12_440_000, (19.08, 72.88)),
        place(HYDERABAD_IN, "Hyderabad", City, &[], None, Some(INDIA), 10_000_000, (17.39, 78.49)),
        place(
            HYDERABAD_PK,
            "Hyderabad",
            City,
            &[],
            None,
            Some(PAKISTAN),
            1_730_000,
            (25.40, 68.37),
        ),
        place(24, "Ahmedabad", City, &["Amdavad"], None, Some(INDIA), 8_450_000, (23.02, 72.57)),
        place(25, "Atlanta", City, &[], None, Some(UNITED_STATES), 498_000, (33.75, -84.39)),
        place(26, "Bengaluru", City, &["Bangalore"], None, Some(INDIA), 8_440_000, (12.97, 77.59)),
    ]
}

pub fn gazetteer() -> Arc<InMemoryGazetteer> {
    Arc::new(InMemoryGazetteer::new(places(), 0.3).unwrap())
}

pub fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(256))
}

/// Gazetteer whose every call fails, optionally for one class only
pub struct FailingGazetteer {
    pub inner: Arc<InMemoryGazetteer>,
    pub only: Option<EntityClass>,
    /// Fail with an internal fault instead of an outage
    pub faulted: bool,
}

impl FailingGazetteer {
    pub fn all() -> Self {
        Self { inner: gazetteer(), only: None, faulted: false }
    }

    pub fn class(class: EntityClass) -> Self {
        Self { inner: gazetteer(), only: Some(class), faulted: false }
    }

    pub fn faulted(class: EntityClass) -> Self {
        Self { inner: gazetteer(), only: Some(class), faulted: true }
    }

    fn fails(&self, class: EntityClass) -> bool {
        self.only.map_or(true, |c| c == class)
    }

    fn error(&self) -> AppError {
        if self.faulted {
            AppError::Internal { message: "malformed row".to_string() }
        } else {
            AppError::unavailable("gazetteer", "connection refused")
        }
    }
}

#[async_trait::async_trait]
impl Gazetteer for FailingGazetteer {
    async fn find_approx(
        &self,
        token: &str,
        class: EntityClass,
        limit: usize,
    ) -> Result<Vec<ApproxMatch>> {
        if self.fails(class) {
            return Err(self.error());
        }
        self.inner.find_approx(token, class, limit).await
    }

    async fn find_exact(
        &self,
        token: &str,
        class: EntityClass,
    ) -> Result<Vec<Arc<CanonicalEntity>>> {
        if self.fails(class) {
            return Err(self.error());
        }
        self.inner.find_exact(token, class).await
    }

    async fn universe(&self, class: EntityClass) -> Result<Vec<Arc<CanonicalEntity>>> {
        if self.fails(class) {
            return Err(self.error());
        }
        self.inner.universe(class).await
    }

    async fn entity(&self, id: EntityId) -> Result<Option<Arc<CanonicalEntity>>> {
        self.inner.entity(id).await
    }

    async fn ping(&self) -> Result<()> {
        Err(self.error())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Gazetteer that never answers lookups within any sane timeout
pub struct SlowGazetteer {
    pub inner: Arc<InMemoryGazetteer>,
}

#[async_trait::async_trait]
impl Gazetteer for SlowGazetteer {
    async fn find_approx(
        &self,
        token: &str,
        class: EntityClass,
        limit: usize,
    ) -> Result<Vec<ApproxMatch>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        self.inner.find_approx(token, class, limit).await
    }

    async fn find_exact(
        &self,
        token: &str,
        class: EntityClass,
    ) -> Result<Vec<Arc<CanonicalEntity>>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        self.inner.find_exact(token, class).await
    }

    async fn universe(&self, class: EntityClass) -> Result<Vec<Arc<CanonicalEntity>>> {
        self.inner.universe(class).await
    }

    async fn entity(&self, id: EntityId) -> Result<Option<Arc<CanonicalEntity>>> {
        self.inner.entity(id).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Embedder that always errors
pub struct FailingEmbedder;

#[async_trait::async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::EmbeddingError { message: "provider down".to_string() })
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AppError::EmbeddingError { message: "provider down".to_string() })
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// Hashing embedder that counts batch calls and can fail the first few
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    batches: AtomicUsize,
    failures: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(256),
            batches: AtomicUsize::new(0),
            failures: AtomicUsize::new(failures),
        })
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::EmbeddingError { message: "provider down".to_string() });
        }
        self.inner.embed_batch(texts).await
    }

    fn model_name(&self) -> &str {
        "counting"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
