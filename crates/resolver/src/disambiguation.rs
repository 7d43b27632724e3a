//! Ranking and the accept / clarify / reject decision
//!
//! Rules, first match wins:
//! 1. No candidates: unresolved
//! 2. Exactly one candidate matches the token exactly: resolved
//! 3. A single candidate at or above threshold: resolved
//! 4. Rank-1 clears rank-2 by the gap and the threshold: resolved
//! 5. A resolved country earlier in the query picks among near-ties
//! 6. Under `BreakTies`, a strictly higher class wins a near-tie
//! 7. Otherwise clarification with the ranked list
//!
//! Every accepting rule requires the threshold, so raising it can only turn
//! resolutions into clarifications.

use crate::types::{
    Candidate, DecisionRule, EntityId, QueryContext, ResolutionResult, Token, UnresolvedReason,
};
use std::cmp::Ordering;
use toponym_common::config::{PriorityPolicy, ResolverConfig};
use tracing::debug;

/// Total order used everywhere candidates are ranked
pub fn rank_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| b.entity_class().priority().cmp(&a.entity_class().priority()))
        .then_with(|| b.entity.population.cmp(&a.entity.population))
        .then_with(|| a.entity.sort_name().cmp(&b.entity.sort_name()))
        .then_with(|| a.entity.id.cmp(&b.entity.id))
}

#[derive(Debug, Clone)]
pub struct Disambiguator {
    pub resolve_threshold: f32,
    pub gap_threshold: f32,
    pub priority_policy: PriorityPolicy,
}

impl Default for Disambiguator {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl Disambiguator {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            resolve_threshold: config.resolve_threshold,
            gap_threshold: config.gap_threshold,
            priority_policy: config.priority_policy,
        }
    }

    pub fn rank(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(rank_order);
        candidates
    }

    /// Decide the outcome for one token
    pub fn decide(
        &self,
        token: &Token,
        candidates: Vec<Candidate>,
        ctx: &QueryContext,
    ) -> ResolutionResult {
        if candidates.is_empty() {
            return ResolutionResult::unresolved(token, UnresolvedReason::NoCandidates);
        }

        let mut ranked = self.rank(candidates);

        let exact: Vec<usize> = (0..ranked.len())
            .filter(|&i| ranked[i].final_score >= 1.0)
            .collect();
        if exact.len() == 1 {
            return self.resolved(token, &ranked[exact[0]], DecisionRule::ExactMatch);
        }

        let top = &ranked[0];
        if ranked.len() == 1 && self.accepts(top) {
            return self.resolved(token, top, DecisionRule::SingleCandidate);
        }

        if ranked.len() > 1
            && self.accepts(top)
            && top.final_score - ranked[1].final_score >= self.gap_threshold
        {
            return self.resolved(token, top, DecisionRule::ScoreGap);
        }

        if let Some(country) = ctx.parent_country {
            if let Some(idx) = self.promote_in_country(&mut ranked, country) {
                return self.resolved(token, &ranked[idx], DecisionRule::Context);
            }
        }

        if self.priority_policy == PriorityPolicy::BreakTies {
            if let Some(idx) = self.break_tie_by_class(&ranked) {
                return self.resolved(token, &ranked[idx], DecisionRule::ClassPriority);
            }
        }

        debug!(token = %token.normalized, candidates = ranked.len(), "Clarification required");
        ResolutionResult::ClarificationRequired {
            token: token.raw.clone(),
            normalized: token.normalized.clone(),
            candidates: ranked,
        }
    }

    fn accepts(&self, candidate: &Candidate) -> bool {
        candidate.final_score >= self.resolve_threshold
    }

    /// Move candidates inside the context country ahead of near-tied ones
    /// outside it. Returns the index to resolve when the best in-country
    /// candidate is decisive among in-country candidates.
    fn promote_in_country(&self, ranked: &mut [Candidate], country: EntityId) -> Option<usize> {
        let in_country = |c: &Candidate| c.entity.parent_country == Some(country);

        let best = ranked.iter().position(in_country)?;
        let best_score = ranked[best].final_score;

        // Strong evidence for a place elsewhere overrides the context
        if ranked[0].final_score - best_score > self.gap_threshold {
            return None;
        }

        ranked.sort_by(|a, b| in_country(b).cmp(&in_country(a)).then_with(|| rank_order(a, b)));

        let runner_up = ranked.iter().skip(1).find(|c| in_country(*c));
        let decisive = runner_up.map_or(true, |r| best_score - r.final_score >= self.gap_threshold);

        (self.accepts(&ranked[0]) && decisive).then_some(0)
    }

    /// Highest class strictly above every other candidate within the gap of rank-1
    fn break_tie_by_class(&self, ranked: &[Candidate]) -> Option<usize> {
        let top_score = ranked[0].final_score;
        let band: Vec<usize> = (0..ranked.len())
            .filter(|&i| top_score - ranked[i].final_score < self.gap_threshold)
            .collect();

        let best = *band
            .iter()
            .max_by_key(|&&i| (ranked[i].entity_class().priority(), std::cmp::Reverse(i)))?;
        let best_priority = ranked[best].entity_class().priority();
        let unique = band
            .iter()
            .filter(|&&i| i != best)
            .all(|&i| ranked[i].entity_class().priority() < best_priority);

        (unique && self.accepts(&ranked[best])).then_some(best)
    }

    fn resolved(
        &self,
        token: &Token,
        candidate: &Candidate,
        rule: DecisionRule,
    ) -> ResolutionResult {
        ResolutionResult::Resolved {
            token: token.raw.clone(),
            normalized: token.normalized.clone(),
            entity: candidate.entity.clone(),
            confidence: candidate.final_score,
            rule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::types::ResolutionStatus;
    use std::sync::Arc;

    fn candidate(id: EntityId, score: f32) -> Candidate {
        let entity = fixtures::places().into_iter().find(|p| p.id == id).unwrap();
        Candidate {
            matched: entity.name.clone(),
            entity: Arc::new(entity),
            alias_matched: false,
            lexical_score: score,
            phonetic_equal: false,
            trigram_score: score,
            semantic_score: score,
            final_score: score,
        }
    }

    fn ids(result: &ResolutionResult) -> Vec<EntityId> {
        result.candidates().iter().map(|c| c.entity.id).collect()
    }

    #[test]
    fn test_no_candidates() {
        let result =
            Disambiguator::default().decide(&Token::new("zzxx123"), vec![], &QueryContext::new());
        assert_eq!(
            result,
            ResolutionResult::unresolved(&Token::new("zzxx123"), UnresolvedReason::NoCandidates)
        );
    }

    #[test]
    fn test_single_exact_match() {
        let d = Disambiguator::default();
        let result = d.decide(
            &Token::new("Bombay"),
            vec![candidate(fixtures::MUMBAI, 1.0), candidate(fixtures::CHENNAI, 0.95)],
            &QueryContext::new(),
        );
        assert_eq!(result.entity().unwrap().id, fixtures::MUMBAI);
        assert_eq!(result.confidence(), Some(1.0));
    }

    #[test]
    fn test_single_candidate_needs_threshold() {
        let d = Disambiguator::default();
        let ctx = QueryContext::new();
        let ok = d.decide(&Token::new("x"), vec![candidate(fixtures::CHENNAI, 0.8)], &ctx);
        assert!(matches!(
            ok,
            ResolutionResult::Resolved { rule: DecisionRule::SingleCandidate, .. }
        ));

        let low = d.decide(&Token::new("x"), vec![candidate(fixtures::CHENNAI, 0.5)], &ctx);
        assert_eq!(low.status(), ResolutionStatus::ClarificationRequired);
    }

    #[test]
    fn test_score_gap() {
        let d = Disambiguator::default();
        let result = d.decide(
            &Token::new("x"),
            vec![candidate(fixtures::CHENNAI, 0.7), candidate(fixtures::MAHARASHTRA, 0.9)],
            &QueryContext::new(),
        );
        assert!(matches!(result, ResolutionResult::Resolved { rule: DecisionRule::ScoreGap, .. }));
        assert_eq!(result.entity().unwrap().id, fixtures::MAHARASHTRA);
    }

    #[test]
    fn test_exact_tie_needs_clarification() {
        let d = Disambiguator::default();
        let result = d.decide(
            &Token::new("Georgia"),
            vec![
                candidate(fixtures::GEORGIA_STATE, 1.0),
                candidate(fixtures::GEORGIA_COUNTRY, 1.0),
            ],
            &QueryContext::new(),
        );
        assert_eq!(result.status(), ResolutionStatus::ClarificationRequired);
        // Country ranks first on priority
        assert_eq!(ids(&result), vec![fixtures::GEORGIA_COUNTRY, fixtures::GEORGIA_STATE]);
    }

    #[test]
    fn test_break_ties_policy() {
        let d = Disambiguator {
            priority_policy: PriorityPolicy::BreakTies,
            ..Disambiguator::default()
        };
        let result = d.decide(
            &Token::new("Georgia"),
            vec![
                candidate(fixtures::GEORGIA_STATE, 1.0),
                candidate(fixtures::GEORGIA_COUNTRY, 1.0),
            ],
            &QueryContext::new(),
        );
        assert!(matches!(
            result,
            ResolutionResult::Resolved { rule: DecisionRule::ClassPriority, .. }
        ));
        assert_eq!(result.entity().unwrap().id, fixtures::GEORGIA_COUNTRY);

        // A near-tie between two cities has no class to break it
        let cities = d.decide(
            &Token::new("Hyderabad"),
            vec![candidate(fixtures::HYDERABAD_IN, 0.9), candidate(fixtures::HYDERABAD_PK, 0.9)],
            &QueryContext::new(),
        );
        assert_eq!(cities.status(), ResolutionStatus::ClarificationRequired);
    }

    #[test]
    fn test_context_selects_in_country() {
        let d = Disambiguator::default();
        let ctx = QueryContext { parent_country: Some(fixtures::INDIA) };
        let result = d.decide(
            &Token::new("Hyderabad"),
            vec![candidate(fixtures::HYDERABAD_PK, 1.0), candidate(fixtures::HYDERABAD_IN, 1.0)],
            &ctx,
        );
        assert!(matches!(result, ResolutionResult::Resolved { rule: DecisionRule::Context, .. }));
        assert_eq!(result.entity().unwrap().id, fixtures::HYDERABAD_IN);
    }

    #[test]
    fn test_context_does_not_override_strong_evidence() {
        let d = Disambiguator::default();
        let ctx = QueryContext { parent_country: Some(fixtures::PAKISTAN) };
        // Chennai clears the Pakistani candidate by far more than the gap
        let result = d.decide(
            &Token::new("x"),
            vec![
                candidate(fixtures::CHENNAI, 0.74),
                candidate(fixtures::HYDERABAD_PK, 0.5),
                candidate(fixtures::MUMBAI, 0.7),
            ],
            &ctx,
        );
        assert_eq!(result.status(), ResolutionStatus::ClarificationRequired);
        assert_eq!(ids(&result)[0], fixtures::CHENNAI);
    }

    #[test]
    fn test_context_promotes_below_threshold() {
        let d = Disambiguator::default();
        let ctx = QueryContext { parent_country: Some(fixtures::PAKISTAN) };
        let result = d.decide(
            &Token::new("x"),
            vec![candidate(fixtures::HYDERABAD_IN, 0.6), candidate(fixtures::HYDERABAD_PK, 0.58)],
            &ctx,
        );
        assert_eq!(result.status(), ResolutionStatus::ClarificationRequired);
        assert_eq!(ids(&result), vec![fixtures::HYDERABAD_PK, fixtures::HYDERABAD_IN]);
    }

    #[test]
    fn test_raising_threshold_never_adds_resolutions() {
        let sets = vec![
            vec![candidate(fixtures::CHENNAI, 0.8)],
            vec![candidate(fixtures::CHENNAI, 0.7), candidate(fixtures::MAHARASHTRA, 0.9)],
            vec![candidate(fixtures::HYDERABAD_PK, 0.85), candidate(fixtures::HYDERABAD_IN, 0.84)],
            vec![
                candidate(fixtures::GEORGIA_STATE, 1.0),
                candidate(fixtures::GEORGIA_COUNTRY, 1.0),
            ],
        ];
        let ctx = QueryContext { parent_country: Some(fixtures::INDIA) };

        for policy in [PriorityPolicy::OrderOnly, PriorityPolicy::BreakTies] {
            for set in &sets {
                let mut last_resolved = true;
                for threshold in [0.5, 0.75, 0.86, 0.95, 1.0] {
                    let d = Disambiguator {
                        resolve_threshold: threshold,
                        gap_threshold: 0.08,
                        priority_policy: policy,
                    };
                    let status = d.decide(&Token::new("x"), set.clone(), &ctx).status();
                    let resolved = status == ResolutionStatus::Resolved;
                    assert!(
                        last_resolved || !resolved,
                        "threshold {} resolved after a lower one did not",
                        threshold
                    );
                    last_resolved = resolved;
                }
            }
        }
    }

    #[test]
    fn test_rank_order_tiebreaks() {
        let d = Disambiguator::default();
        let ranked = d.rank(vec![
            candidate(fixtures::HYDERABAD_PK, 0.9),
            candidate(fixtures::HYDERABAD_IN, 0.9),
            candidate(fixtures::GEORGIA_STATE, 0.9),
        ]);
        let order: Vec<EntityId> = ranked.iter().map(|c| c.entity.id).collect();
        // State outranks cities; the larger city wins among equals
        assert_eq!(
            order,
            vec![fixtures::GEORGIA_STATE, fixtures::HYDERABAD_IN, fixtures::HYDERABAD_PK]
        );
    }
}
