//! Service request entity and its lifecycle types.
//!
//! A request moves through the state machine owned by the lifecycle manager:
//! `Pending -> Accepted -> InProgress -> Completed`, with cancellation from
//! any non-terminal state and abandonment returning an accepted or
//! in-progress request to `Pending` for reassignment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::*;

/// Status of a request in its lifecycle.
///
/// Abandonment is not a resting status: an abandoned request is returned to
/// `Pending` and the abandonment is recorded as an event plus a reputation
/// penalty on the abandoning provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
	/// Awaiting acceptance by the assigned candidate.
	Pending,
	/// Accepted by the assigned provider, work not yet started.
	Accepted,
	/// Work is underway.
	InProgress,
	/// Work delivered. Terminal.
	Completed,
	/// Cancelled by the requester or an administrator. Terminal.
	Cancelled,
}

impl RequestStatus {
	/// Whether this status is terminal (no further transitions).
	pub fn is_terminal(&self) -> bool {
		matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
	}
}

/// How a request's provider was (or should be) chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentMethod {
	/// Scored ranking over all eligible candidates.
	Auto,
	/// Explicit administrative choice.
	Manual,
	/// Requester's direct selection.
	ClientSpecified,
}

/// An active assignment of a provider (and optionally their firm) to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
	/// The concrete provider who will do the work.
	pub provider_id: ProviderId,
	/// Firm the assignment was routed through, retained for commission.
	pub firm_id: Option<FirmId>,
	/// How this assignment was made.
	pub method: AssignmentMethod,
	/// When the assignment was made.
	pub assigned_at: Timestamp,
}

/// Reason code a provider gives when abandoning a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbandonReason {
	PersonalEmergency,
	Overcommitted,
	ClientUnresponsive,
	ScopeDispute,
	Other,
}

/// Record of a cancellation, kept for refund evaluation and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
	/// Who cancelled (requester or administrator).
	pub actor_id: String,
	/// Free-form reason supplied by the actor.
	pub reason: String,
	/// Status the request was in when cancelled.
	pub prior_status: RequestStatus,
	/// When the cancellation happened.
	pub cancelled_at: Timestamp,
}

/// A service request from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	/// Unique identifier.
	pub id: RequestId,
	/// The requesting client.
	pub requester_id: RequesterId,
	/// Requested service category (e.g. "GST", "AUDIT").
	pub category: String,
	/// Description of the work.
	pub description: String,
	/// Client's budget for the work.
	pub budget: Decimal,
	/// Optional deadline.
	pub deadline: Option<Timestamp>,
	/// Whether firms may be assigned, or only individual providers.
	pub allow_firms: bool,
	/// Assignment policy requested by the client.
	pub assignment_method: AssignmentMethod,
	/// Current assignment, if any. At most one active assignment exists.
	pub assignment: Option<Assignment>,
	/// Current lifecycle status.
	pub status: RequestStatus,
	/// Payment captured against this request, if any.
	pub payment_id: Option<PaymentId>,
	/// Providers that rejected or abandoned this request; excluded from
	/// reassignment so the same candidate is not immediately re-selected.
	pub excluded_providers: Vec<ProviderId>,
	/// Number of times this request has been abandoned by a provider.
	/// A subsequent cancellation with a non-zero count is treated as
	/// abandonment-triggered for refund purposes.
	pub abandonment_events: u32,
	/// Cancellation record, set when status is `Cancelled`.
	pub cancellation: Option<Cancellation>,
	/// When the request was created.
	pub created_at: Timestamp,
	/// When the request was last modified.
	pub updated_at: Timestamp,
}

impl Request {
	/// Creates a new pending, unassigned request.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		requester_id: RequesterId,
		category: String,
		description: String,
		budget: Decimal,
		deadline: Option<Timestamp>,
		allow_firms: bool,
		assignment_method: AssignmentMethod,
	) -> Self {
		let created_at = now();
		Self {
			id: new_id(),
			requester_id,
			category,
			description,
			budget,
			deadline,
			allow_firms,
			assignment_method,
			assignment: None,
			status: RequestStatus::Pending,
			payment_id: None,
			excluded_providers: Vec::new(),
			abandonment_events: 0,
			cancellation: None,
			created_at,
			updated_at: created_at,
		}
	}

	/// The currently assigned provider, if any.
	pub fn assigned_provider(&self) -> Option<&ProviderId> {
		self.assignment.as_ref().map(|a| &a.provider_id)
	}
}
