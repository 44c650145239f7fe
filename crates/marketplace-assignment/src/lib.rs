//! Assignment engine: selects a provider (or firm member) for a request.
//!
//! Two policies, selectable per request: auto (scored ranking over every
//! eligible candidate, including firms when the request permits them) and
//! manual/client-specified (eligibility validation of an explicitly named
//! provider). Reassignment re-runs the same policy with previous assignees
//! in an exclusion set so a rejecting or abandoning provider cannot be
//! immediately re-selected.

use marketplace_config::AssignmentConfig;
use marketplace_directory::{DirectoryError, FirmDirectory, ProviderDirectory};
use marketplace_eligibility::{check_firm, check_provider};
use marketplace_types::{
	AssignmentMethod, FirmId, FirmSnapshot, MarketplaceError, ProviderId, ProviderSnapshot,
	Request, Result,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod scoring;

use scoring::{rank, score_candidate, ScoredCandidate};

/// Outcome of a selection: the concrete assignee, plus the firm the
/// assignment was routed through when the winning candidate was a firm.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentDecision {
	pub provider_id: ProviderId,
	/// Set only for firm-routed assignments; retained on the request for
	/// commission computation at settlement time.
	pub firm_id: Option<FirmId>,
	pub method: AssignmentMethod,
	/// Winning score under the auto policy. `None` for manual selection.
	pub score: Option<f64>,
}

/// Selects providers for requests using the configured scoring weights.
pub struct AssignmentEngine {
	providers: Arc<dyn ProviderDirectory>,
	firms: Arc<dyn FirmDirectory>,
	config: AssignmentConfig,
}

impl AssignmentEngine {
	pub fn new(
		providers: Arc<dyn ProviderDirectory>,
		firms: Arc<dyn FirmDirectory>,
		config: AssignmentConfig,
	) -> Self {
		Self {
			providers,
			firms,
			config,
		}
	}

	/// Selects a candidate for the request under its assignment policy.
	///
	/// `explicit_provider` names the provider for manual/client-specified
	/// requests; it is ignored under the auto policy. `exclusions` holds
	/// providers that rejected or abandoned this request.
	pub async fn select(
		&self,
		request: &Request,
		explicit_provider: Option<&ProviderId>,
		exclusions: &HashSet<ProviderId>,
	) -> Result<AssignmentDecision> {
		match request.assignment_method {
			AssignmentMethod::Auto => self.auto_select(request, exclusions).await,
			AssignmentMethod::Manual | AssignmentMethod::ClientSpecified => {
				let provider_id = explicit_provider.ok_or_else(|| {
					MarketplaceError::Validation(
						"manual assignment requires an explicit provider".to_string(),
					)
				})?;
				self.validate_explicit(request, provider_id, exclusions)
					.await
			}
		}
	}

	/// Validates an explicitly named provider without scoring.
	async fn validate_explicit(
		&self,
		request: &Request,
		provider_id: &ProviderId,
		exclusions: &HashSet<ProviderId>,
	) -> Result<AssignmentDecision> {
		if exclusions.contains(provider_id) {
			return Err(MarketplaceError::NoEligibleProvider);
		}

		let provider = self.fetch_provider(provider_id).await?;
		let firm = self.firm_of(&provider).await?;
		let approval = self
			.approval_for(&provider, &request.requester_id)
			.await?;

		check_provider(
			&request.requester_id,
			&provider,
			firm.as_ref(),
			false,
			approval,
		)
		.map_err(|reason| {
			MarketplaceError::Validation(format!(
				"provider {} is not eligible: {}",
				provider_id, reason
			))
		})?;

		Ok(AssignmentDecision {
			provider_id: provider.id,
			firm_id: None,
			method: request.assignment_method,
			score: None,
		})
	}

	/// Scores every eligible candidate and picks the best.
	async fn auto_select(
		&self,
		request: &Request,
		exclusions: &HashSet<ProviderId>,
	) -> Result<AssignmentDecision> {
		let mut ranked: Vec<(ScoredCandidate, Option<FirmId>)> = Vec::new();

		// Individual providers.
		for provider in self.list_candidates().await? {
			if exclusions.contains(&provider.id) {
				continue;
			}
			let firm = self.firm_of(&provider).await?;
			let approval = self
				.approval_for(&provider, &request.requester_id)
				.await?;
			if let Err(reason) = check_provider(
				&request.requester_id,
				&provider,
				firm.as_ref(),
				false,
				approval,
			) {
				debug!(provider_id = %provider.id, %reason, "Candidate excluded");
				continue;
			}
			let score = score_candidate(&self.config, request, &provider);
			ranked.push((ScoredCandidate { provider, score }, None));
		}

		// Firms, when the request permits them. A firm's score is the score
		// of its best eligible member; the internal second pass records that
		// member as the concrete assignee.
		if request.allow_firms {
			for firm in self.list_firms().await? {
				if check_firm(&request.requester_id, &firm).is_err() {
					continue;
				}
				if let Some(best) = self.best_member(request, &firm, exclusions).await? {
					ranked.push((best, Some(firm.id.clone())));
				}
			}
		}

		ranked.sort_by(|(a, _), (b, _)| rank(a, b));

		match ranked.into_iter().next() {
			Some((winner, firm_id)) => {
				debug!(
					provider_id = %winner.provider.id,
					score = winner.score,
					firm_id = ?firm_id,
					"Auto-assignment selected candidate"
				);
				Ok(AssignmentDecision {
					provider_id: winner.provider.id,
					firm_id,
					method: AssignmentMethod::Auto,
					score: Some(winner.score),
				})
			}
			None => {
				warn!(request_id = %request.id, "No eligible provider after filtering");
				Err(MarketplaceError::NoEligibleProvider)
			}
		}
	}

	/// Second scoring pass over one firm's active, non-excluded members.
	async fn best_member(
		&self,
		request: &Request,
		firm: &FirmSnapshot,
		exclusions: &HashSet<ProviderId>,
	) -> Result<Option<ScoredCandidate>> {
		let mut members: Vec<ScoredCandidate> = Vec::new();

		for member in firm.members.iter().filter(|m| m.active) {
			if exclusions.contains(&member.provider_id) {
				continue;
			}
			let provider = match self.fetch_provider(&member.provider_id).await {
				Ok(provider) => provider,
				Err(MarketplaceError::NotFound(_)) => continue,
				Err(e) => return Err(e),
			};
			// Firm-routed work: the independent-work policy does not apply.
			if check_provider(&request.requester_id, &provider, Some(firm), true, false).is_err() {
				continue;
			}
			let score = score_candidate(&self.config, request, &provider);
			members.push(ScoredCandidate { provider, score });
		}

		members.sort_by(rank);
		Ok(members.into_iter().next())
	}

	async fn fetch_provider(&self, id: &ProviderId) -> Result<ProviderSnapshot> {
		self.providers
			.provider(id)
			.await
			.map_err(map_directory_error)
	}

	async fn list_candidates(&self) -> Result<Vec<ProviderSnapshot>> {
		self.providers.candidates().await.map_err(map_directory_error)
	}

	async fn list_firms(&self) -> Result<Vec<FirmSnapshot>> {
		self.firms.firms().await.map_err(map_directory_error)
	}

	async fn firm_of(&self, provider: &ProviderSnapshot) -> Result<Option<FirmSnapshot>> {
		match &provider.firm {
			Some(membership) => {
				let firm = self
					.firms
					.firm(&membership.firm_id)
					.await
					.map_err(map_directory_error)?;
				Ok(Some(firm))
			}
			None => Ok(None),
		}
	}

	/// Pre-fetches the out-of-band approval record, only consulted for
	/// members under `LimitedWithApproval`.
	async fn approval_for(
		&self,
		provider: &ProviderSnapshot,
		requester_id: &str,
	) -> Result<bool> {
		if provider.firm.is_none() {
			return Ok(false);
		}
		self.firms
			.has_approval(&provider.id, &requester_id.to_string())
			.await
			.map_err(map_directory_error)
	}
}

fn map_directory_error(err: DirectoryError) -> MarketplaceError {
	match err {
		DirectoryError::ProviderNotFound(id) => {
			MarketplaceError::NotFound(format!("provider {}", id))
		}
		DirectoryError::FirmNotFound(id) => MarketplaceError::NotFound(format!("firm {}", id)),
		DirectoryError::Backend(msg) => MarketplaceError::Storage(msg),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use marketplace_directory::implementations::memory::MemoryDirectory;
	use marketplace_types::{
		FirmMember, FirmMembership, FirmPolicy, FirmRole, VerificationStatus,
	};
	use rust_decimal::Decimal;

	fn engine(directory: Arc<MemoryDirectory>) -> AssignmentEngine {
		AssignmentEngine::new(directory.clone(), directory, AssignmentConfig::default())
	}

	fn request(method: AssignmentMethod, allow_firms: bool) -> Request {
		let mut request = Request::new(
			"client-1".to_string(),
			"GST".to_string(),
			"Quarterly GST filing".to_string(),
			Decimal::new(15_000, 0),
			None,
			allow_firms,
			method,
		);
		request.id = "req-1".to_string();
		request
	}

	fn candidate(id: &str, category: &str, years: u32, workload: u32) -> ProviderSnapshot {
		ProviderSnapshot {
			id: id.to_string(),
			specializations: vec![category.to_string()],
			experience_years: years,
			hourly_rate: Decimal::new(1_000, 0),
			verification: VerificationStatus::Verified,
			verified_at: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
			average_rating: 4.0,
			reputation_score: Decimal::new(50, 1),
			abandonment_count: 0,
			firm: None,
			capacity: 10,
			active_workload: workload,
		}
	}

	#[tokio::test]
	async fn test_auto_selects_highest_scorer() {
		let directory = Arc::new(MemoryDirectory::new());
		directory.upsert_provider(candidate("specialist", "GST", 12, 6));
		directory.upsert_provider(candidate("generalist", "AUDIT", 5, 1));

		let decision = engine(directory)
			.select(&request(AssignmentMethod::Auto, false), None, &HashSet::new())
			.await
			.unwrap();

		assert_eq!(decision.provider_id, "specialist");
		assert_eq!(decision.firm_id, None);
		assert_eq!(decision.method, AssignmentMethod::Auto);
		assert!(decision.score.unwrap() > 60.0);
	}

	#[tokio::test]
	async fn test_zero_capacity_candidate_never_selected() {
		let directory = Arc::new(MemoryDirectory::new());
		let mut full = candidate("full", "GST", 15, 0);
		full.active_workload = full.capacity;
		directory.upsert_provider(full);
		directory.upsert_provider(candidate("available", "AUDIT", 1, 0));

		let decision = engine(directory)
			.select(&request(AssignmentMethod::Auto, false), None, &HashSet::new())
			.await
			.unwrap();

		// The specialist would score far higher but has no free capacity.
		assert_eq!(decision.provider_id, "available");
	}

	#[tokio::test]
	async fn test_exclusions_prevent_reselection() {
		let directory = Arc::new(MemoryDirectory::new());
		directory.upsert_provider(candidate("first", "GST", 12, 0));
		directory.upsert_provider(candidate("second", "GST", 5, 0));

		let engine = engine(directory);
		let request = request(AssignmentMethod::Auto, false);

		let exclusions: HashSet<ProviderId> = ["first".to_string()].into_iter().collect();
		let decision = engine.select(&request, None, &exclusions).await.unwrap();
		assert_eq!(decision.provider_id, "second");

		let all: HashSet<ProviderId> = ["first".to_string(), "second".to_string()]
			.into_iter()
			.collect();
		let err = engine.select(&request, None, &all).await.unwrap_err();
		assert!(matches!(err, MarketplaceError::NoEligibleProvider));
	}

	#[tokio::test]
	async fn test_firm_win_records_member_and_firm() {
		let directory = Arc::new(MemoryDirectory::new());

		// A weak individual candidate, plus a firm with a strong member.
		directory.upsert_provider(candidate("solo", "AUDIT", 1, 5));
		let mut partner = candidate("partner", "GST", 14, 2);
		partner.firm = Some(FirmMembership {
			firm_id: "firm-1".to_string(),
			role: FirmRole::Partner,
			policy: FirmPolicy::NoIndependentWork,
		});
		directory.upsert_provider(partner);
		directory.upsert_firm(FirmSnapshot {
			id: "firm-1".to_string(),
			name: "Mehta & Co".to_string(),
			commission_percent: Decimal::new(15, 0),
			minimum_active_members: Some(1),
			restricted_clients: vec![],
			members: vec![FirmMember {
				provider_id: "partner".to_string(),
				role: FirmRole::Partner,
				active: true,
			}],
		});

		let decision = engine(directory)
			.select(&request(AssignmentMethod::Auto, true), None, &HashSet::new())
			.await
			.unwrap();

		assert_eq!(decision.provider_id, "partner");
		assert_eq!(decision.firm_id, Some("firm-1".to_string()));
	}

	#[tokio::test]
	async fn test_restricted_client_cannot_be_served_via_firm() {
		let directory = Arc::new(MemoryDirectory::new());
		let mut partner = candidate("partner", "GST", 14, 2);
		partner.firm = Some(FirmMembership {
			firm_id: "firm-1".to_string(),
			role: FirmRole::Partner,
			policy: FirmPolicy::NoIndependentWork,
		});
		directory.upsert_provider(partner);
		directory.upsert_firm(FirmSnapshot {
			id: "firm-1".to_string(),
			name: "Mehta & Co".to_string(),
			commission_percent: Decimal::new(15, 0),
			minimum_active_members: Some(1),
			// The requester below is on the firm's restriction list.
			restricted_clients: vec!["client-1".to_string()],
			members: vec![FirmMember {
				provider_id: "partner".to_string(),
				role: FirmRole::Partner,
				active: true,
			}],
		});

		let err = engine(directory)
			.select(&request(AssignmentMethod::Auto, true), None, &HashSet::new())
			.await
			.unwrap_err();
		assert!(matches!(err, MarketplaceError::NoEligibleProvider));
	}

	#[tokio::test]
	async fn test_firm_below_member_floor_is_skipped() {
		let directory = Arc::new(MemoryDirectory::new());
		let mut partner = candidate("partner", "GST", 14, 2);
		partner.firm = Some(FirmMembership {
			firm_id: "firm-1".to_string(),
			role: FirmRole::Partner,
			policy: FirmPolicy::NoIndependentWork,
		});
		directory.upsert_provider(partner);
		directory.upsert_firm(FirmSnapshot {
			id: "firm-1".to_string(),
			name: "Mehta & Co".to_string(),
			commission_percent: Decimal::new(15, 0),
			minimum_active_members: Some(3),
			restricted_clients: vec![],
			members: vec![FirmMember {
				provider_id: "partner".to_string(),
				role: FirmRole::Partner,
				active: true,
			}],
		});

		let err = engine(directory)
			.select(&request(AssignmentMethod::Auto, true), None, &HashSet::new())
			.await
			.unwrap_err();
		assert!(matches!(err, MarketplaceError::NoEligibleProvider));
	}

	#[tokio::test]
	async fn test_manual_selection_validates_only() {
		let directory = Arc::new(MemoryDirectory::new());
		// Low scorer, but explicitly chosen by the client.
		directory.upsert_provider(candidate("chosen", "AUDIT", 0, 9));
		directory.upsert_provider(candidate("better", "GST", 15, 0));

		let decision = engine(directory)
			.select(
				&request(AssignmentMethod::ClientSpecified, false),
				Some(&"chosen".to_string()),
				&HashSet::new(),
			)
			.await
			.unwrap();

		assert_eq!(decision.provider_id, "chosen");
		assert_eq!(decision.score, None);
	}

	#[tokio::test]
	async fn test_manual_selection_rejects_ineligible_provider() {
		let directory = Arc::new(MemoryDirectory::new());
		let mut unverified = candidate("chosen", "GST", 5, 0);
		unverified.verification = VerificationStatus::Unverified;
		directory.upsert_provider(unverified);

		let err = engine(directory)
			.select(
				&request(AssignmentMethod::Manual, false),
				Some(&"chosen".to_string()),
				&HashSet::new(),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, MarketplaceError::Validation(_)));
	}
}
