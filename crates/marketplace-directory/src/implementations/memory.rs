//! In-memory directory implementation.
//!
//! Serves as the directory wiring for single-process deployments and as the
//! fixture for engine tests. Mutators update snapshots in place; the engine
//! itself never writes through the directory traits.

use crate::{DirectoryError, FirmDirectory, ProviderDirectory};
use async_trait::async_trait;
use dashmap::DashMap;
use marketplace_types::{FirmId, FirmSnapshot, ProviderId, ProviderSnapshot, RequesterId};

/// Directory backed by concurrent maps.
#[derive(Default)]
pub struct MemoryDirectory {
	providers: DashMap<ProviderId, ProviderSnapshot>,
	firms: DashMap<FirmId, FirmSnapshot>,
	/// (provider, client) pairs with an independent-work approval on file.
	approvals: DashMap<(ProviderId, RequesterId), ()>,
}

impl MemoryDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn upsert_provider(&self, snapshot: ProviderSnapshot) {
		self.providers.insert(snapshot.id.clone(), snapshot);
	}

	pub fn upsert_firm(&self, snapshot: FirmSnapshot) {
		self.firms.insert(snapshot.id.clone(), snapshot);
	}

	pub fn record_approval(&self, provider_id: ProviderId, requester_id: RequesterId) {
		self.approvals.insert((provider_id, requester_id), ());
	}

	/// Adjusts a provider's active workload by the given delta.
	pub fn adjust_workload(&self, provider_id: &ProviderId, delta: i64) {
		if let Some(mut entry) = self.providers.get_mut(provider_id) {
			let current = entry.active_workload as i64;
			entry.active_workload = current.saturating_add(delta).max(0) as u32;
		}
	}
}

#[async_trait]
impl ProviderDirectory for MemoryDirectory {
	async fn provider(&self, id: &ProviderId) -> Result<ProviderSnapshot, DirectoryError> {
		self.providers
			.get(id)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| DirectoryError::ProviderNotFound(id.clone()))
	}

	async fn candidates(&self) -> Result<Vec<ProviderSnapshot>, DirectoryError> {
		Ok(self
			.providers
			.iter()
			.map(|entry| entry.value().clone())
			.collect())
	}
}

#[async_trait]
impl FirmDirectory for MemoryDirectory {
	async fn firm(&self, id: &FirmId) -> Result<FirmSnapshot, DirectoryError> {
		self.firms
			.get(id)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| DirectoryError::FirmNotFound(id.clone()))
	}

	async fn firms(&self) -> Result<Vec<FirmSnapshot>, DirectoryError> {
		Ok(self.firms.iter().map(|entry| entry.value().clone()).collect())
	}

	async fn has_approval(
		&self,
		provider_id: &ProviderId,
		requester_id: &RequesterId,
	) -> Result<bool, DirectoryError> {
		Ok(self
			.approvals
			.contains_key(&(provider_id.clone(), requester_id.clone())))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use marketplace_types::VerificationStatus;
	use rust_decimal::Decimal;

	fn provider(id: &str, category: &str) -> ProviderSnapshot {
		ProviderSnapshot {
			id: id.to_string(),
			specializations: vec![category.to_string()],
			experience_years: 3,
			hourly_rate: Decimal::new(1_000, 0),
			verification: VerificationStatus::Verified,
			verified_at: Some(Utc::now()),
			average_rating: 4.0,
			reputation_score: Decimal::new(50, 1),
			abandonment_count: 0,
			firm: None,
			capacity: 5,
			active_workload: 1,
		}
	}

	#[tokio::test]
	async fn test_provider_lookup_and_candidate_listing() {
		let directory = MemoryDirectory::new();
		directory.upsert_provider(provider("p-1", "GST"));
		directory.upsert_provider(provider("p-2", "AUDIT"));

		let found = directory.provider(&"p-1".to_string()).await.unwrap();
		assert_eq!(found.id, "p-1");

		// Candidate listing is the full assignable pool, not category-filtered.
		let pool = directory.candidates().await.unwrap();
		assert_eq!(pool.len(), 2);

		let missing = directory.provider(&"p-9".to_string()).await;
		assert!(matches!(missing, Err(DirectoryError::ProviderNotFound(_))));
	}

	#[tokio::test]
	async fn test_approval_records() {
		let directory = MemoryDirectory::new();
		directory.record_approval("p-1".to_string(), "client-1".to_string());

		assert!(directory
			.has_approval(&"p-1".to_string(), &"client-1".to_string())
			.await
			.unwrap());
		assert!(!directory
			.has_approval(&"p-1".to_string(), &"client-2".to_string())
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_adjust_workload_saturates_at_zero() {
		let directory = MemoryDirectory::new();
		directory.upsert_provider(provider("p-1", "GST"));

		directory.adjust_workload(&"p-1".to_string(), -5);
		let snapshot = directory.provider(&"p-1".to_string()).await.unwrap();
		assert_eq!(snapshot.active_workload, 0);
	}
}
