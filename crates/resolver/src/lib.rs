//! Toponym resolution engine
//!
//! Maps free-text place tokens (misspelled, abbreviated, ambiguous) onto
//! canonical gazetteer entries:
//! - Candidate generation over countries, states and cities
//! - Lexical, trigram, phonetic and semantic signal fusion
//! - Threshold, gap and context based disambiguation

pub mod candidates;
pub mod disambiguation;
pub mod embedding_cache;
pub mod engine;
pub mod gazetteer;
pub mod normalize;
pub mod phonetic;
pub mod scoring;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use engine::{QueryResolution, Resolver};
pub use gazetteer::{Gazetteer, InMemoryGazetteer, PgGazetteer};
pub use types::{
    CanonicalEntity, Candidate, Centroid, DecisionRule, EntityId, QueryContext, ResolutionResult,
    ResolutionStatus, Token, UnresolvedReason, MAX_TOKEN_CHARS,
};
