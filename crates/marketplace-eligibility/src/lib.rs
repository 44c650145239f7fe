//! Conflict and eligibility checking for candidate assignments.
//!
//! Pure decision functions over snapshots: no mutation, no I/O. The
//! assignment engine calls these from its scoring loop without additional
//! locking, since every input is an already-fetched point-in-time view.
//! Checks short-circuit in a fixed order: verification, capacity, firm
//! policy. Firm-level checks cover the client restriction list and the
//! member floor; the restriction list binds on firm-routed work too.

use marketplace_types::{FirmPolicy, FirmSnapshot, ProviderSnapshot, RequesterId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a candidate was ruled ineligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IneligibilityReason {
	#[error("provider is not verified")]
	NotVerified,
	#[error("provider has no free capacity")]
	AtCapacity,
	#[error("firm policy forbids independent work")]
	IndependentWorkForbidden,
	#[error("independent work requires an approval record, none on file")]
	ApprovalMissing,
	#[error("firm policy restricts serving this client")]
	ClientRestricted,
	#[error("firm does not meet its minimum active member floor")]
	FirmBelowMemberFloor,
}

/// Checks whether an individual provider may be assigned to a request.
///
/// `firm` is the provider's firm snapshot when they are firm-affiliated.
/// `via_firm` marks assignments routed through the firm itself (the firm
/// second pass), where the independent-work policy does not apply.
/// `approval_exists` is the pre-fetched out-of-band approval record required
/// under `LimitedWithApproval`.
pub fn check_provider(
	requester_id: &RequesterId,
	provider: &ProviderSnapshot,
	firm: Option<&FirmSnapshot>,
	via_firm: bool,
	approval_exists: bool,
) -> Result<(), IneligibilityReason> {
	if provider.verification != marketplace_types::VerificationStatus::Verified {
		return Err(IneligibilityReason::NotVerified);
	}

	if !provider.has_free_capacity() {
		return Err(IneligibilityReason::AtCapacity);
	}

	if !via_firm {
		if let Some(membership) = &provider.firm {
			match membership.policy {
				FirmPolicy::NoIndependentWork => {
					return Err(IneligibilityReason::IndependentWorkForbidden);
				}
				FirmPolicy::LimitedWithApproval => {
					if !approval_exists {
						return Err(IneligibilityReason::ApprovalMissing);
					}
				}
				FirmPolicy::FullIndependentWork => {}
				FirmPolicy::ClientRestrictions => {
					let restricted = firm
						.map(|f| f.restricted_clients.iter().any(|c| c == requester_id))
						.unwrap_or(false);
					if restricted {
						return Err(IneligibilityReason::ClientRestricted);
					}
				}
			}
		}
	}

	Ok(())
}

/// Checks whether a firm-level assignment is permissible for this client.
pub fn check_firm(
	requester_id: &RequesterId,
	firm: &FirmSnapshot,
) -> Result<(), IneligibilityReason> {
	if firm.restricted_clients.iter().any(|c| c == requester_id) {
		return Err(IneligibilityReason::ClientRestricted);
	}
	if !firm.meets_member_floor() {
		return Err(IneligibilityReason::FirmBelowMemberFloor);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use marketplace_types::{
		FirmMember, FirmMembership, FirmRole, VerificationStatus,
	};
	use rust_decimal::Decimal;

	fn provider() -> ProviderSnapshot {
		ProviderSnapshot {
			id: "p-1".to_string(),
			specializations: vec!["GST".to_string()],
			experience_years: 5,
			hourly_rate: Decimal::new(1_000, 0),
			verification: VerificationStatus::Verified,
			verified_at: Some(Utc::now()),
			average_rating: 4.5,
			reputation_score: Decimal::new(50, 1),
			abandonment_count: 0,
			firm: None,
			capacity: 5,
			active_workload: 2,
		}
	}

	fn firm(policy_members: u32) -> FirmSnapshot {
		FirmSnapshot {
			id: "f-1".to_string(),
			name: "Mehta & Co".to_string(),
			commission_percent: Decimal::new(15, 0),
			minimum_active_members: Some(2),
			restricted_clients: vec!["client-x".to_string()],
			members: (0..policy_members)
				.map(|i| FirmMember {
					provider_id: format!("p-{}", i),
					role: FirmRole::Associate,
					active: true,
				})
				.collect(),
		}
	}

	fn membership(policy: FirmPolicy) -> FirmMembership {
		FirmMembership {
			firm_id: "f-1".to_string(),
			role: FirmRole::Associate,
			policy,
		}
	}

	#[test]
	fn test_verified_provider_with_capacity_is_eligible() {
		let requester = "client-1".to_string();
		assert_eq!(
			check_provider(&requester, &provider(), None, false, false),
			Ok(())
		);
	}

	#[test]
	fn test_unverified_fails_first() {
		let requester = "client-1".to_string();
		let mut candidate = provider();
		candidate.verification = VerificationStatus::PendingReview;
		// Also at capacity; verification must short-circuit first.
		candidate.active_workload = candidate.capacity;
		assert_eq!(
			check_provider(&requester, &candidate, None, false, false),
			Err(IneligibilityReason::NotVerified)
		);
	}

	#[test]
	fn test_zero_free_capacity_is_ineligible() {
		let requester = "client-1".to_string();
		let mut candidate = provider();
		candidate.active_workload = candidate.capacity;
		assert_eq!(
			check_provider(&requester, &candidate, None, false, false),
			Err(IneligibilityReason::AtCapacity)
		);
	}

	#[test]
	fn test_no_independent_work_policy() {
		let requester = "client-1".to_string();
		let mut candidate = provider();
		candidate.firm = Some(membership(FirmPolicy::NoIndependentWork));
		let firm = firm(3);
		assert_eq!(
			check_provider(&requester, &candidate, Some(&firm), false, false),
			Err(IneligibilityReason::IndependentWorkForbidden)
		);
		// Routed through the firm, the policy does not apply.
		assert_eq!(
			check_provider(&requester, &candidate, Some(&firm), true, false),
			Ok(())
		);
	}

	#[test]
	fn test_limited_with_approval_requires_record() {
		let requester = "client-1".to_string();
		let mut candidate = provider();
		candidate.firm = Some(membership(FirmPolicy::LimitedWithApproval));
		let firm = firm(3);
		assert_eq!(
			check_provider(&requester, &candidate, Some(&firm), false, false),
			Err(IneligibilityReason::ApprovalMissing)
		);
		assert_eq!(
			check_provider(&requester, &candidate, Some(&firm), false, true),
			Ok(())
		);
	}

	#[test]
	fn test_client_restrictions() {
		let mut candidate = provider();
		candidate.firm = Some(membership(FirmPolicy::ClientRestrictions));
		let firm = firm(3);

		let restricted = "client-x".to_string();
		assert_eq!(
			check_provider(&restricted, &candidate, Some(&firm), false, false),
			Err(IneligibilityReason::ClientRestricted)
		);

		let allowed = "client-1".to_string();
		assert_eq!(
			check_provider(&allowed, &candidate, Some(&firm), false, false),
			Ok(())
		);
	}

	#[test]
	fn test_firm_member_floor() {
		let requester = "client-1".to_string();
		assert_eq!(
			check_firm(&requester, &firm(1)),
			Err(IneligibilityReason::FirmBelowMemberFloor)
		);
		assert_eq!(check_firm(&requester, &firm(2)), Ok(()));
	}

	#[test]
	fn test_firm_restriction_binds_on_firm_routed_work() {
		// A firm whose restriction list names the client cannot take the
		// engagement at all, regardless of which member would do the work.
		assert_eq!(
			check_firm(&"client-x".to_string(), &firm(3)),
			Err(IneligibilityReason::ClientRestricted)
		);
		assert_eq!(check_firm(&"client-1".to_string(), &firm(3)), Ok(()));
	}
}
