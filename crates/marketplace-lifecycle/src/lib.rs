//! Request lifecycle management.
//!
//! Owns the state machine governing a request's status:
//! `Pending -> Accepted -> InProgress -> Completed`, cancellation from any
//! non-terminal state, and abandonment returning an accepted or in-progress
//! request to `Pending` for reassignment. The accept transition is a
//! conditional write, so concurrent accept attempts resolve to exactly one
//! winner.

use marketplace_types::{Request, RequestStatus};
use rust_decimal::Decimal;

pub mod manager;

pub use manager::LifecycleManager;

/// Result of an abandonment: the reassigned (or re-pending) request plus the
/// reputation delta actually applied to the abandoning provider. This is the
/// only transition with a cross-cutting reputation side effect, so callers
/// are told both outcomes.
#[derive(Debug, Clone)]
pub struct AbandonOutcome {
	pub request: Request,
	pub reputation_delta: Decimal,
}

/// Statuses an operation may start from. Any other (status, operation) pair
/// fails with `InvalidStateTransition` and leaves state unchanged.
pub fn allowed_from(operation: &str) -> &'static [RequestStatus] {
	match operation {
		"accept" | "reject" => &[RequestStatus::Pending],
		"start" => &[RequestStatus::Accepted],
		"complete" => &[RequestStatus::InProgress],
		"abandon" => &[RequestStatus::Accepted, RequestStatus::InProgress],
		"cancel" => &[
			RequestStatus::Pending,
			RequestStatus::Accepted,
			RequestStatus::InProgress,
		],
		_ => &[],
	}
}
