//! Provider and firm snapshot types.
//!
//! Snapshots are read-only views fetched from the provider directory
//! collaborator. Scoring and eligibility run over already-fetched snapshots,
//! so those computations stay pure and need no additional locking.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::*;

/// Verification state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
	Unverified,
	PendingReview,
	Verified,
}

/// Independent-work policy a firm applies to a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirmPolicy {
	/// Member may not take work outside the firm.
	NoIndependentWork,
	/// Independent work allowed only with an out-of-band approval record.
	LimitedWithApproval,
	/// Member may take any independent work.
	FullIndependentWork,
	/// Independent work allowed except for clients on the firm's
	/// restriction list.
	ClientRestrictions,
}

/// Role of a provider within a firm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirmRole {
	Partner,
	Associate,
	Staff,
}

/// A provider's membership in a firm, as seen on their snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmMembership {
	pub firm_id: FirmId,
	pub role: FirmRole,
	pub policy: FirmPolicy,
}

/// Point-in-time view of a provider used for eligibility and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
	pub id: ProviderId,
	/// Service categories this provider specializes in.
	pub specializations: Vec<String>,
	pub experience_years: u32,
	pub hourly_rate: Decimal,
	pub verification: VerificationStatus,
	/// When the provider passed verification. Used as the final
	/// auto-assignment tie-break (earlier wins).
	pub verified_at: Option<Timestamp>,
	/// Average of client-submitted star ratings, 0.0 to 5.0.
	pub average_rating: f64,
	/// Running reputation score, 0.0 to 5.0. Distinct from star ratings;
	/// only abandonment penalties move it.
	pub reputation_score: Decimal,
	pub abandonment_count: u32,
	pub firm: Option<FirmMembership>,
	/// Maximum concurrent engagements this provider declares.
	pub capacity: u32,
	/// Engagements currently in flight.
	pub active_workload: u32,
}

impl ProviderSnapshot {
	/// Whether the provider can take on more work.
	pub fn has_free_capacity(&self) -> bool {
		self.active_workload < self.capacity
	}

	/// Free capacity as a percentage of declared capacity, 0.0 to 100.0.
	pub fn free_capacity_percent(&self) -> f64 {
		if self.capacity == 0 {
			return 0.0;
		}
		let free = self.capacity.saturating_sub(self.active_workload);
		free as f64 / self.capacity as f64 * 100.0
	}
}

/// Member entry on a firm's roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmMember {
	pub provider_id: ProviderId,
	pub role: FirmRole,
	pub active: bool,
}

/// Point-in-time view of a firm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmSnapshot {
	pub id: FirmId,
	pub name: String,
	/// Commission the firm takes on member work routed through it,
	/// as a percentage of the post-platform-fee amount.
	pub commission_percent: Decimal,
	/// Minimum active-member count required before the firm itself is
	/// eligible for auto-assignment. `None` means no floor.
	pub minimum_active_members: Option<u32>,
	/// Clients this firm's members may not serve independently. Only
	/// consulted under `FirmPolicy::ClientRestrictions`.
	pub restricted_clients: Vec<RequesterId>,
	pub members: Vec<FirmMember>,
}

impl FirmSnapshot {
	/// Number of active members on the roster.
	pub fn active_member_count(&self) -> u32 {
		self.members.iter().filter(|m| m.active).count() as u32
	}

	/// Whether the firm meets its own minimum-member gate.
	pub fn meets_member_floor(&self) -> bool {
		match self.minimum_active_members {
			Some(floor) => self.active_member_count() >= floor,
			None => true,
		}
	}
}
