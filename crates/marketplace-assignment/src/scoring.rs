//! Candidate scoring for auto-assignment.
//!
//! Scores are ranking heuristics, not money, so they are plain `f64`. The
//! formula and weights come from `AssignmentConfig`:
//! specialization match, capped experience, weighted average rating,
//! weighted free capacity, and a budget-fit bonus. Ties break on lowest
//! current workload, then earliest verification timestamp.

use marketplace_config::AssignmentConfig;
use marketplace_types::{ProviderSnapshot, Request};
use std::cmp::Ordering;

/// A candidate with its computed score, ready for ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
	pub provider: ProviderSnapshot,
	pub score: f64,
}

/// Whether the provider's hourly rate fits the request's budget envelope.
pub fn rate_within_budget(request: &Request, provider: &ProviderSnapshot) -> bool {
	provider.hourly_rate <= request.budget
}

/// Scores one candidate against a request.
///
/// Callers must filter zero-free-capacity candidates out before scoring;
/// capacity exhaustion excludes, it does not merely penalize.
pub fn score_candidate(
	config: &AssignmentConfig,
	request: &Request,
	provider: &ProviderSnapshot,
) -> f64 {
	let mut score = 0.0;

	if provider
		.specializations
		.iter()
		.any(|s| s == &request.category)
	{
		score += config.specialization_points;
	}

	let capped_years = provider.experience_years.min(config.experience_cap_years);
	score += capped_years as f64 * config.experience_points_per_year;

	score += config.rating_weight * provider.average_rating;
	score += config.capacity_weight * provider.free_capacity_percent();

	if rate_within_budget(request, provider) {
		score += config.budget_fit_points;
	}

	score
}

/// Ranking order: highest score first; ties break on lowest workload, then
/// earliest `verified_at` (rewards longer-standing verified providers).
pub fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
	b.score
		.total_cmp(&a.score)
		.then_with(|| a.provider.active_workload.cmp(&b.provider.active_workload))
		.then_with(|| match (a.provider.verified_at, b.provider.verified_at) {
			(Some(a_at), Some(b_at)) => a_at.cmp(&b_at),
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(None, None) => Ordering::Equal,
		})
}
