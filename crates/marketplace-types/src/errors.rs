//! Error taxonomy for the marketplace engine.

use thiserror::Error;

use crate::request::RequestStatus;

pub type Result<T> = std::result::Result<T, MarketplaceError>;

/// Errors surfaced by engine operations.
///
/// Conflict-class errors (`InvalidStateTransition`, `AlreadyAccepted`) are
/// surfaced to the actor and never retried automatically; retrying an
/// ordering conflict would not change the outcome. Settlement delivery
/// failures are the only automatically retried class, handled by the job
/// dispatcher.
#[derive(Error, Debug)]
pub enum MarketplaceError {
	#[error("validation failed: {0}")]
	Validation(String),

	#[error("operation {operation} is not legal from status {from:?}")]
	InvalidStateTransition {
		from: RequestStatus,
		operation: &'static str,
	},

	#[error("request was already accepted by another provider")]
	AlreadyAccepted,

	#[error("forbidden: {0}")]
	Forbidden(String),

	#[error("no eligible provider found for request")]
	NoEligibleProvider,

	#[error("escrow is not held")]
	EscrowNotHeld,

	#[error("request is not completed")]
	RequestNotCompleted,

	/// Internal invariant breach. Fatal: the operation is aborted and
	/// nothing is persisted.
	#[error("distribution components do not sum to the gross amount")]
	DistributionSumMismatch,

	#[error("not found: {0}")]
	NotFound(String),

	#[error("storage error: {0}")]
	Storage(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}
