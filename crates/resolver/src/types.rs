//! Core resolution types

use crate::normalize::normalize_token;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use toponym_common::db::PlaceRecord;
use toponym_common::{AppError, EntityClass, Result};

/// Gazetteer identifier of a canonical place
pub type EntityId = i64;

/// Longest raw token the engine will look up, in characters
pub const MAX_TOKEN_CHARS: usize = 200;

/// Geographic centre of a place
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

/// A canonical place as stored in the gazetteer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: EntityId,

    /// Display name
    pub name: String,

    pub entity_class: EntityClass,

    /// Alternate names, matched case-insensitively
    #[serde(default)]
    pub alt_names: Vec<String>,

    /// ISO code for countries, postal or admin code for states
    #[serde(default)]
    pub code: Option<String>,

    /// Country containing this place; `None` for countries
    #[serde(default)]
    pub parent_country: Option<EntityId>,

    #[serde(default)]
    pub population: i64,

    pub centroid: Centroid,
}

impl CanonicalEntity {
    /// Name followed by aliases and code, as stored
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.alt_names.iter().map(String::as_str))
            .chain(self.code.as_deref())
    }

    /// True when the normalized token equals the name, an alias or the code
    pub fn matches_exactly(&self, normalized: &str) -> bool {
        !normalized.is_empty() && self.surface_forms().any(|f| normalize_token(f) == normalized)
    }

    /// Key used when ranking ties are broken by name
    pub fn sort_name(&self) -> String {
        normalize_token(&self.name)
    }
}

impl TryFrom<PlaceRecord> for CanonicalEntity {
    type Error = AppError;

    fn try_from(record: PlaceRecord) -> Result<Self> {
        let place = record.place;
        let entity_class = EntityClass::parse(&place.entity_class).ok_or_else(|| {
            AppError::DataUnavailable {
                source_name: "gazetteer".to_string(),
                message: format!(
                    "place {} has unknown entity class '{}'",
                    place.id, place.entity_class
                ),
            }
        })?;

        Ok(Self {
            id: place.id,
            name: place.name,
            entity_class,
            alt_names: record.aliases,
            code: place.code,
            parent_country: place.parent_country_id,
            population: place.population,
            centroid: Centroid {
                lat: place.latitude,
                lon: place.longitude,
            },
        })
    }
}

/// One input token together with its normalized form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub raw: String,
    pub normalized: String,
}

impl Token {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            normalized: normalize_token(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// A scored gazetteer match for one token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub entity: Arc<CanonicalEntity>,

    /// Name, alias or code that produced the match
    pub matched: String,

    pub alias_matched: bool,

    pub lexical_score: f32,
    pub phonetic_equal: bool,
    pub trigram_score: f32,
    pub semantic_score: f32,

    /// Fused score in [0, 1]
    pub final_score: f32,
}

impl Candidate {
    pub fn entity_class(&self) -> EntityClass {
        self.entity.entity_class
    }
}

/// Which rule accepted a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    /// Only one candidate matched the token exactly
    ExactMatch,
    /// The candidate set had a single member above threshold
    SingleCandidate,
    /// Rank-1 cleared rank-2 by the configured gap
    ScoreGap,
    /// An earlier resolved country selected among near-ties
    Context,
    /// A higher entity class broke a near-tie
    ClassPriority,
}

impl DecisionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::SingleCandidate => "single_candidate",
            Self::ScoreGap => "score_gap",
            Self::Context => "context",
            Self::ClassPriority => "class_priority",
        }
    }
}

/// Why a token could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Nothing left after normalization
    EmptyToken,
    /// Longer than any place name the gazetteer can hold
    TokenTooLong { max_chars: usize },
    /// No gazetteer entry cleared the approximate-match floor
    NoCandidates,
    /// Every gazetteer lookup failed or timed out
    SourcesUnavailable { diagnostic: String },
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyToken => write!(f, "empty token"),
            Self::TokenTooLong { max_chars } => {
                write!(f, "token exceeds {} characters", max_chars)
            }
            Self::NoCandidates => write!(f, "no candidates"),
            Self::SourcesUnavailable { diagnostic } => {
                write!(f, "gazetteer unavailable: {}", diagnostic)
            }
        }
    }
}

/// Terminal status of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    ClarificationRequired,
    Unresolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::ClarificationRequired => "clarification_required",
            Self::Unresolved => "unresolved",
        }
    }
}

/// Outcome for one input token
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionResult {
    Resolved {
        token: String,
        normalized: String,
        entity: Arc<CanonicalEntity>,
        confidence: f32,
        rule: DecisionRule,
    },
    ClarificationRequired {
        token: String,
        normalized: String,
        /// Ranked, best first
        candidates: Vec<Candidate>,
    },
    Unresolved {
        token: String,
        normalized: String,
        reason: UnresolvedReason,
    },
}

impl ResolutionResult {
    pub fn status(&self) -> ResolutionStatus {
        match self {
            Self::Resolved { .. } => ResolutionStatus::Resolved,
            Self::ClarificationRequired { .. } => ResolutionStatus::ClarificationRequired,
            Self::Unresolved { .. } => ResolutionStatus::Unresolved,
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Self::Resolved { token, .. }
            | Self::ClarificationRequired { token, .. }
            | Self::Unresolved { token, .. } => token,
        }
    }

    /// Resolved entity, if any
    pub fn entity(&self) -> Option<&Arc<CanonicalEntity>> {
        match self {
            Self::Resolved { entity, .. } => Some(entity),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Self::Resolved { confidence, .. } => Some(*confidence),
            _ => None,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Self::ClarificationRequired { candidates, .. } => candidates,
            _ => &[],
        }
    }

    pub(crate) fn unresolved(token: &Token, reason: UnresolvedReason) -> Self {
        Self::Unresolved {
            token: token.raw.clone(),
            normalized: token.normalized.clone(),
            reason,
        }
    }
}

/// State carried from earlier tokens of a query to later ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Most recently resolved country
    pub parent_country: Option<EntityId>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result; only a resolved country changes the context
    pub fn observe(&mut self, result: &ResolutionResult) {
        if let Some(entity) = result.entity() {
            if entity.entity_class == EntityClass::Country {
                self.parent_country = Some(entity.id);
            }
        }
    }
}
