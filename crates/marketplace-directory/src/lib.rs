//! Provider and firm directory collaborator interfaces.
//!
//! The directory owns provider/firm master data (registration, profiles,
//! membership invitations) outside this engine. The engine only reads
//! point-in-time snapshots through these traits: candidate listings for
//! assignment, individual snapshots for eligibility, and out-of-band
//! approval records for the `LimitedWithApproval` firm policy.

use async_trait::async_trait;
use marketplace_types::{FirmId, FirmSnapshot, ProviderId, ProviderSnapshot, RequesterId};
use thiserror::Error;

pub mod implementations {
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum DirectoryError {
	#[error("provider not found: {0}")]
	ProviderNotFound(ProviderId),
	#[error("firm not found: {0}")]
	FirmNotFound(FirmId),
	#[error("directory backend error: {0}")]
	Backend(String),
}

/// Read-only access to provider master data.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
	/// Fetches a single provider snapshot.
	async fn provider(&self, id: &ProviderId) -> Result<ProviderSnapshot, DirectoryError>;

	/// Lists providers available for assignment. Candidates without a
	/// specialization match are included; the scoring formula handles the
	/// match, it does not pre-filter on it.
	async fn candidates(&self) -> Result<Vec<ProviderSnapshot>, DirectoryError>;
}

/// Read-only access to firm master data and approval records.
#[async_trait]
pub trait FirmDirectory: Send + Sync {
	/// Fetches a single firm snapshot.
	async fn firm(&self, id: &FirmId) -> Result<FirmSnapshot, DirectoryError>;

	/// Lists firms available for firm-level assignment.
	async fn firms(&self) -> Result<Vec<FirmSnapshot>, DirectoryError>;

	/// Whether an out-of-band approval record exists permitting the given
	/// provider to serve the given client independently.
	async fn has_approval(
		&self,
		provider_id: &ProviderId,
		requester_id: &RequesterId,
	) -> Result<bool, DirectoryError>;
}
