//! Configuration loading for the marketplace engine.
//!
//! Loads TOML configuration with `${VAR}` environment substitution, applies
//! `MARKETPLACE_`-prefixed environment overrides, and validates the result
//! before handing it to the engine.

use std::env;
use std::path::Path;
use thiserror::Error;

use rust_decimal::Decimal;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("file not found: {0}")]
	FileNotFound(String),

	#[error("parse error: {0}")]
	ParseError(String),

	#[error("validation error: {0}")]
	ValidationError(String),

	#[error("environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("io error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "MARKETPLACE_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<MarketplaceConfig, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			tracing::info!("Loading configuration from {}", file_path);
			self.load_from_file(file_path).await?
		} else {
			MarketplaceConfig::default()
		};

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<MarketplaceConfig, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(file_path.to_string())
			} else {
				ConfigError::IoError(e)
			}
		})?;

		let substituted = self.substitute_env_vars(&content)?;

		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	/// Replaces `${VAR_NAME}` patterns with environment variable values.
	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value =
				env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut MarketplaceConfig) -> Result<(), ConfigError> {
		if let Ok(fee) = env::var(format!("{}PLATFORM_FEE_PERCENT", self.env_prefix)) {
			config.settlement.platform_fee_percent = fee.parse().map_err(|e| {
				ConfigError::ValidationError(format!("invalid platform fee: {}", e))
			})?;
		}

		if let Ok(rate) = env::var(format!("{}WITHHOLDING_RATE_PERCENT", self.env_prefix)) {
			config.settlement.withholding_rate_percent = rate.parse().map_err(|e| {
				ConfigError::ValidationError(format!("invalid withholding rate: {}", e))
			})?;
		}

		if let Ok(backend) = env::var(format!("{}STORAGE_BACKEND", self.env_prefix)) {
			config.storage.backend = backend;
		}

		if let Ok(path) = env::var(format!("{}STORAGE_PATH", self.env_prefix)) {
			config.storage.path = Some(path.into());
		}

		Ok(())
	}
}

fn percent_in_range(value: Decimal) -> bool {
	value >= Decimal::ZERO && value <= Decimal::new(100, 0)
}

/// Validates a configuration before it reaches the engine.
pub fn validate_config(config: &MarketplaceConfig) -> Result<(), ConfigError> {
	let settlement = &config.settlement;
	for (name, value) in [
		("settlement.platform_fee_percent", settlement.platform_fee_percent),
		(
			"settlement.withholding_rate_percent",
			settlement.withholding_rate_percent,
		),
		(
			"settlement.refund_processing_fee_percent",
			settlement.refund_processing_fee_percent,
		),
		(
			"settlement.refund.accepted_percent",
			settlement.refund.accepted_percent,
		),
	] {
		if !percent_in_range(value) {
			return Err(ConfigError::ValidationError(format!(
				"{} must be between 0 and 100",
				name
			)));
		}
	}

	// Partial refunds for in-progress cancellations must stay strictly
	// partial.
	let in_progress = settlement.refund.in_progress_percent;
	if in_progress <= Decimal::ZERO || in_progress >= Decimal::new(100, 0) {
		return Err(ConfigError::ValidationError(
			"settlement.refund.in_progress_percent must be strictly between 0 and 100".to_string(),
		));
	}

	if settlement.jobs.max_attempts == 0 {
		return Err(ConfigError::ValidationError(
			"settlement.jobs.max_attempts must be at least 1".to_string(),
		));
	}
	if settlement.jobs.multiplier < 1.0 {
		return Err(ConfigError::ValidationError(
			"settlement.jobs.multiplier must be at least 1.0".to_string(),
		));
	}

	for (name, value) in [
		(
			"reputation.abandon_in_progress_penalty",
			config.reputation.abandon_in_progress_penalty,
		),
		(
			"reputation.abandon_accepted_penalty",
			config.reputation.abandon_accepted_penalty,
		),
	] {
		if value < Decimal::ZERO || value > Decimal::new(5, 0) {
			return Err(ConfigError::ValidationError(format!(
				"{} must be between 0 and 5",
				name
			)));
		}
	}

	match config.storage.backend.as_str() {
		"memory" => Ok(()),
		"file" => {
			if config.storage.path.is_none() {
				return Err(ConfigError::ValidationError(
					"storage.path is required for the file backend".to_string(),
				));
			}
			Ok(())
		}
		other => Err(ConfigError::ValidationError(format!(
			"unknown storage backend: {}",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config_validates() {
		validate_config(&MarketplaceConfig::default()).unwrap();
	}

	#[test]
	fn test_rejects_out_of_range_fee() {
		let mut config = MarketplaceConfig::default();
		config.settlement.platform_fee_percent = Decimal::new(120, 0);
		assert!(matches!(
			validate_config(&config),
			Err(ConfigError::ValidationError(_))
		));
	}

	#[test]
	fn test_rejects_full_refund_as_partial_tier() {
		let mut config = MarketplaceConfig::default();
		config.settlement.refund.in_progress_percent = Decimal::new(100, 0);
		assert!(validate_config(&config).is_err());

		config.settlement.refund.in_progress_percent = Decimal::ZERO;
		assert!(validate_config(&config).is_err());
	}

	#[test]
	fn test_rejects_file_backend_without_path() {
		let mut config = MarketplaceConfig::default();
		config.storage.backend = "file".to_string();
		assert!(validate_config(&config).is_err());

		config.storage.path = Some("./data".into());
		validate_config(&config).unwrap();
	}

	#[test]
	fn test_substitute_env_vars() {
		env::set_var("MARKETPLACE_TEST_SUBST", "file");
		let loader = ConfigLoader::new();
		let out = loader
			.substitute_env_vars("backend = \"${MARKETPLACE_TEST_SUBST}\"")
			.unwrap();
		assert_eq!(out, "backend = \"file\"");

		let missing = loader.substitute_env_vars("x = \"${MARKETPLACE_TEST_MISSING}\"");
		assert!(matches!(missing, Err(ConfigError::EnvVarNotFound(_))));
	}
}
