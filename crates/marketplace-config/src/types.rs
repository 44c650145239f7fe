//! Configuration types for the marketplace engine.
//!
//! Every tunable the engine consumes lives here: fee and withholding
//! percentages, refund tiers, reputation penalty magnitudes, scoring weights,
//! and the settlement job retry policy. Nothing numeric is hard-coded in the
//! engine crates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MarketplaceConfig {
	#[serde(default)]
	pub settlement: SettlementConfig,
	#[serde(default)]
	pub assignment: AssignmentConfig,
	#[serde(default)]
	pub reputation: ReputationConfig,
	#[serde(default)]
	pub storage: StorageConfig,
}

/// Fee, withholding, and refund settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
	/// Platform fee as a percentage of the gross amount.
	#[serde(default = "default_platform_fee_percent")]
	pub platform_fee_percent: Decimal,
	/// Jurisdiction withholding rate as a percentage of the provider net.
	#[serde(default = "default_withholding_rate_percent")]
	pub withholding_rate_percent: Decimal,
	/// Processing fee deducted from refunds, as a percentage of the refund.
	#[serde(default = "default_refund_processing_fee_percent")]
	pub refund_processing_fee_percent: Decimal,
	#[serde(default)]
	pub refund: RefundConfig,
	#[serde(default)]
	pub jobs: RetryPolicyConfig,
}

fn default_platform_fee_percent() -> Decimal {
	Decimal::new(125, 1) // 12.5%
}

fn default_withholding_rate_percent() -> Decimal {
	Decimal::new(10, 0)
}

fn default_refund_processing_fee_percent() -> Decimal {
	Decimal::new(2, 0)
}

impl Default for SettlementConfig {
	fn default() -> Self {
		Self {
			platform_fee_percent: default_platform_fee_percent(),
			withholding_rate_percent: default_withholding_rate_percent(),
			refund_processing_fee_percent: default_refund_processing_fee_percent(),
			refund: RefundConfig::default(),
			jobs: RetryPolicyConfig::default(),
		}
	}
}

/// Recommended refund percentages by the status a request was cancelled in.
///
/// `Pending` cancellations and abandonment-triggered cancellations always
/// recommend 100% and are not configurable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefundConfig {
	/// Refund percentage when cancelled while work was in progress.
	/// Must be strictly between 0 and 100.
	#[serde(default = "default_in_progress_percent")]
	pub in_progress_percent: Decimal,
	/// Refund percentage when cancelled after acceptance, before work began.
	#[serde(default = "default_accepted_percent")]
	pub accepted_percent: Decimal,
}

fn default_in_progress_percent() -> Decimal {
	Decimal::new(60, 0)
}

fn default_accepted_percent() -> Decimal {
	Decimal::new(85, 0)
}

impl Default for RefundConfig {
	fn default() -> Self {
		Self {
			in_progress_percent: default_in_progress_percent(),
			accepted_percent: default_accepted_percent(),
		}
	}
}

/// Retry policy for deferred settlement jobs.
///
/// One policy covers every job type; exhausted jobs move to the dead-letter
/// namespace for operator intervention, never silently dropped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicyConfig {
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_initial_delay_secs")]
	pub initial_delay_secs: u64,
	#[serde(default = "default_max_delay_secs")]
	pub max_delay_secs: u64,
	#[serde(default = "default_multiplier")]
	pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
	4
}

fn default_initial_delay_secs() -> u64 {
	2
}

fn default_max_delay_secs() -> u64 {
	60
}

fn default_multiplier() -> f64 {
	2.0
}

impl Default for RetryPolicyConfig {
	fn default() -> Self {
		Self {
			max_attempts: default_max_attempts(),
			initial_delay_secs: default_initial_delay_secs(),
			max_delay_secs: default_max_delay_secs(),
			multiplier: default_multiplier(),
		}
	}
}

impl RetryPolicyConfig {
	pub fn initial_delay(&self) -> Duration {
		Duration::from_secs(self.initial_delay_secs)
	}

	pub fn max_delay(&self) -> Duration {
		Duration::from_secs(self.max_delay_secs)
	}
}

/// Auto-assignment scoring weights.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssignmentConfig {
	/// Points for a specialization match on the requested category.
	#[serde(default = "default_specialization_points")]
	pub specialization_points: f64,
	/// Points per year of experience.
	#[serde(default = "default_experience_points_per_year")]
	pub experience_points_per_year: f64,
	/// Experience years beyond this cap score no further points.
	#[serde(default = "default_experience_cap_years")]
	pub experience_cap_years: u32,
	/// Weight applied to the 0-5 average client rating.
	#[serde(default = "default_rating_weight")]
	pub rating_weight: f64,
	/// Weight applied to the 0-100 free-capacity percentage.
	#[serde(default = "default_capacity_weight")]
	pub capacity_weight: f64,
	/// Points when the hourly rate fits the request budget envelope.
	#[serde(default = "default_budget_fit_points")]
	pub budget_fit_points: f64,
}

fn default_specialization_points() -> f64 {
	20.0
}

fn default_experience_points_per_year() -> f64 {
	2.0
}

fn default_experience_cap_years() -> u32 {
	15
}

fn default_rating_weight() -> f64 {
	0.3
}

fn default_capacity_weight() -> f64 {
	0.2
}

fn default_budget_fit_points() -> f64 {
	10.0
}

impl Default for AssignmentConfig {
	fn default() -> Self {
		Self {
			specialization_points: default_specialization_points(),
			experience_points_per_year: default_experience_points_per_year(),
			experience_cap_years: default_experience_cap_years(),
			rating_weight: default_rating_weight(),
			capacity_weight: default_capacity_weight(),
			budget_fit_points: default_budget_fit_points(),
		}
	}
}

/// Reputation penalty magnitudes by the status a request was abandoned from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReputationConfig {
	#[serde(default = "default_abandon_in_progress_penalty")]
	pub abandon_in_progress_penalty: Decimal,
	#[serde(default = "default_abandon_accepted_penalty")]
	pub abandon_accepted_penalty: Decimal,
}

fn default_abandon_in_progress_penalty() -> Decimal {
	Decimal::new(3, 1) // 0.3
}

fn default_abandon_accepted_penalty() -> Decimal {
	Decimal::new(2, 1) // 0.2
}

impl Default for ReputationConfig {
	fn default() -> Self {
		Self {
			abandon_in_progress_penalty: default_abandon_in_progress_penalty(),
			abandon_accepted_penalty: default_abandon_accepted_penalty(),
		}
	}
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// "memory" or "file".
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	/// Base path for the file backend.
	#[serde(default)]
	pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
	"memory".to_string()
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_storage_backend(),
			path: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = MarketplaceConfig::default();
		assert_eq!(config.settlement.platform_fee_percent, Decimal::new(125, 1));
		assert_eq!(config.settlement.withholding_rate_percent, Decimal::new(10, 0));
		assert_eq!(config.settlement.refund.in_progress_percent, Decimal::new(60, 0));
		assert_eq!(config.settlement.jobs.max_attempts, 4);
		assert_eq!(config.reputation.abandon_in_progress_penalty, Decimal::new(3, 1));
		assert_eq!(config.reputation.abandon_accepted_penalty, Decimal::new(2, 1));
		assert_eq!(config.assignment.experience_cap_years, 15);
		assert_eq!(config.storage.backend, "memory");
	}

	#[test]
	fn test_partial_toml_fills_defaults() {
		let config: MarketplaceConfig = toml::from_str(
			r#"
			[settlement]
			platform_fee_percent = 15.0

			[storage]
			backend = "file"
			path = "./data"
			"#,
		)
		.unwrap();
		assert_eq!(config.settlement.platform_fee_percent, Decimal::new(15, 0));
		// Unspecified fields keep their defaults.
		assert_eq!(config.settlement.withholding_rate_percent, Decimal::new(10, 0));
		assert_eq!(config.assignment.budget_fit_points, 10.0);
		assert_eq!(config.storage.backend, "file");
	}

	#[test]
	fn test_retry_policy_durations() {
		let policy = RetryPolicyConfig::default();
		assert_eq!(policy.initial_delay(), Duration::from_secs(2));
		assert_eq!(policy.max_delay(), Duration::from_secs(60));
	}
}
