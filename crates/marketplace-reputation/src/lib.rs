//! Reputation tracking for providers.
//!
//! Maintains a provider's running reputation score and abandonment count.
//! The reputation score is moved only by abandonment penalties; client star
//! ratings are a separate field pair on the same record and never feed into
//! the penalty score. Penalty arithmetic is extracted into pure functions so
//! it can be unit-tested independently of the lifecycle state machine.

use marketplace_config::ReputationConfig;
use marketplace_storage::StorageService;
use marketplace_types::{MarketplaceError, ProviderId, RequestStatus, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const NAMESPACE: &str = "reputation";

/// Persisted reputation state for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
	pub provider_id: ProviderId,
	/// Running reputation score, 0.0 to 5.0.
	pub score: Decimal,
	pub abandonment_count: u32,
	/// Count of client-submitted star ratings.
	pub rating_count: u32,
	/// Sum of client-submitted star ratings.
	pub rating_total: u32,
}

impl ReputationRecord {
	/// Fresh record for a provider with no history.
	pub fn new(provider_id: ProviderId) -> Self {
		Self {
			provider_id,
			score: max_score(),
			abandonment_count: 0,
			rating_count: 0,
			rating_total: 0,
		}
	}

	/// Average client star rating, 0.0 when unrated.
	pub fn average_rating(&self) -> f64 {
		if self.rating_count == 0 {
			return 0.0;
		}
		self.rating_total as f64 / self.rating_count as f64
	}
}

/// Result of applying a penalty: the new score and the delta actually
/// applied after clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyOutcome {
	pub new_score: Decimal,
	pub delta_applied: Decimal,
}

fn max_score() -> Decimal {
	Decimal::new(5, 0)
}

/// Clamps a score into the valid [0.0, 5.0] band.
pub fn clamp_score(score: Decimal) -> Decimal {
	score.max(Decimal::ZERO).min(max_score())
}

/// Penalty delta for abandoning a request from the given status.
///
/// Returns `None` for statuses abandonment is not legal from; the lifecycle
/// manager rejects those before reaching the tracker.
pub fn penalty_for(status: RequestStatus, config: &ReputationConfig) -> Option<Decimal> {
	match status {
		RequestStatus::InProgress => Some(-config.abandon_in_progress_penalty),
		RequestStatus::Accepted => Some(-config.abandon_accepted_penalty),
		RequestStatus::Pending | RequestStatus::Completed | RequestStatus::Cancelled => None,
	}
}

/// Service maintaining persisted reputation records.
pub struct ReputationTracker {
	storage: Arc<StorageService>,
}

impl ReputationTracker {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Loads a provider's record, starting a fresh one if none exists.
	pub async fn record(&self, provider_id: &ProviderId) -> Result<ReputationRecord> {
		Ok(self
			.storage
			.retrieve_optional(NAMESPACE, provider_id)
			.await?
			.unwrap_or_else(|| ReputationRecord::new(provider_id.clone())))
	}

	/// Applies a (negative) penalty delta to the provider's score, clamped
	/// to [0.0, 5.0]. When `count_abandonment` is set the abandonment
	/// counter is incremented as well.
	pub async fn apply_penalty(
		&self,
		provider_id: &ProviderId,
		delta: Decimal,
		count_abandonment: bool,
	) -> Result<PenaltyOutcome> {
		let mut record = self.record(provider_id).await?;
		let previous = record.score;
		record.score = clamp_score(previous + delta);
		if count_abandonment {
			record.abandonment_count += 1;
		}
		self.storage.store(NAMESPACE, provider_id, &record).await?;

		let outcome = PenaltyOutcome {
			new_score: record.score,
			delta_applied: record.score - previous,
		};
		info!(
			provider_id = %provider_id,
			delta = %outcome.delta_applied,
			score = %outcome.new_score,
			"Applied reputation penalty"
		);
		Ok(outcome)
	}

	/// Records a client-submitted 1-5 star review. This channel is separate
	/// from the penalty score.
	pub async fn record_rating(
		&self,
		provider_id: &ProviderId,
		stars: u8,
	) -> Result<ReputationRecord> {
		if !(1..=5).contains(&stars) {
			return Err(MarketplaceError::Validation(format!(
				"rating must be between 1 and 5 stars, got {}",
				stars
			)));
		}

		let mut record = self.record(provider_id).await?;
		record.rating_count += 1;
		record.rating_total += stars as u32;
		self.storage.store(NAMESPACE, provider_id, &record).await?;
		Ok(record)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use marketplace_storage::implementations::memory::MemoryStorage;

	fn tracker() -> ReputationTracker {
		ReputationTracker::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		))))
	}

	#[test]
	fn test_penalty_table() {
		let config = ReputationConfig::default();
		assert_eq!(
			penalty_for(RequestStatus::InProgress, &config),
			Some(Decimal::new(-3, 1))
		);
		assert_eq!(
			penalty_for(RequestStatus::Accepted, &config),
			Some(Decimal::new(-2, 1))
		);
		assert_eq!(penalty_for(RequestStatus::Pending, &config), None);
		assert_eq!(penalty_for(RequestStatus::Completed, &config), None);
	}

	#[test]
	fn test_clamp_score() {
		assert_eq!(clamp_score(Decimal::new(-1, 1)), Decimal::ZERO);
		assert_eq!(clamp_score(Decimal::new(62, 1)), Decimal::new(5, 0));
		assert_eq!(clamp_score(Decimal::new(37, 1)), Decimal::new(37, 1));
	}

	#[tokio::test]
	async fn test_apply_penalty_exact_delta() {
		let tracker = tracker();
		let provider = "p-1".to_string();

		let outcome = tracker
			.apply_penalty(&provider, Decimal::new(-3, 1), true)
			.await
			.unwrap();
		assert_eq!(outcome.new_score, Decimal::new(47, 1));
		assert_eq!(outcome.delta_applied, Decimal::new(-3, 1));

		let record = tracker.record(&provider).await.unwrap();
		assert_eq!(record.abandonment_count, 1);
	}

	#[tokio::test]
	async fn test_penalty_clamps_at_zero_floor() {
		let tracker = tracker();
		let provider = "p-1".to_string();

		// Drive the score close to the floor.
		for _ in 0..16 {
			tracker
				.apply_penalty(&provider, Decimal::new(-3, 1), true)
				.await
				.unwrap();
		}
		let record = tracker.record(&provider).await.unwrap();
		assert_eq!(record.score, Decimal::new(2, 1));

		let outcome = tracker
			.apply_penalty(&provider, Decimal::new(-3, 1), true)
			.await
			.unwrap();
		assert_eq!(outcome.new_score, Decimal::ZERO);
		// Only 0.2 could actually be applied before hitting the floor.
		assert_eq!(outcome.delta_applied, Decimal::new(-2, 1));
	}

	#[tokio::test]
	async fn test_ratings_do_not_move_penalty_score() {
		let tracker = tracker();
		let provider = "p-1".to_string();

		tracker.record_rating(&provider, 5).await.unwrap();
		tracker.record_rating(&provider, 4).await.unwrap();

		let record = tracker.record(&provider).await.unwrap();
		assert_eq!(record.score, Decimal::new(5, 0));
		assert_eq!(record.rating_count, 2);
		assert_eq!(record.average_rating(), 4.5);
	}

	#[tokio::test]
	async fn test_rejects_out_of_range_rating() {
		let tracker = tracker();
		let provider = "p-1".to_string();
		assert!(tracker.record_rating(&provider, 0).await.is_err());
		assert!(tracker.record_rating(&provider, 6).await.is_err());
	}
}
