//! Lifecycle manager coordinating transitions, assignment, and reputation.

use crate::{allowed_from, AbandonOutcome};
use marketplace_assignment::AssignmentEngine;
use marketplace_config::ReputationConfig;
use marketplace_reputation::{penalty_for, ReputationTracker};
use marketplace_storage::StorageService;
use marketplace_types::{
	now, AbandonReason, Assignment, Cancellation, EventBus, LifecycleEvent, MarketplaceError,
	MarketplaceEvent, PaymentId, ProviderId, Request, RequestId, RequestStatus, Result,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

const NAMESPACE: &str = "requests";

/// Owns request state and drives it through the legal edge set.
pub struct LifecycleManager {
	storage: Arc<StorageService>,
	assignment: Arc<AssignmentEngine>,
	reputation: Arc<ReputationTracker>,
	reputation_config: ReputationConfig,
	event_bus: EventBus,
}

impl LifecycleManager {
	pub fn new(
		storage: Arc<StorageService>,
		assignment: Arc<AssignmentEngine>,
		reputation: Arc<ReputationTracker>,
		reputation_config: ReputationConfig,
		event_bus: EventBus,
	) -> Self {
		Self {
			storage,
			assignment,
			reputation,
			reputation_config,
			event_bus,
		}
	}

	/// Loads a request by id.
	pub async fn load(&self, request_id: &RequestId) -> Result<Request> {
		self.storage
			.retrieve_optional(NAMESPACE, request_id)
			.await?
			.ok_or_else(|| MarketplaceError::NotFound(format!("request {}", request_id)))
	}

	/// Creates a request and runs the initial assignment under the
	/// requester's chosen policy. Fails with `NoEligibleProvider` when the
	/// engine finds no candidate; the caller decides retry or manual policy.
	pub async fn create(
		&self,
		mut request: Request,
		explicit_provider: Option<&ProviderId>,
	) -> Result<Request> {
		if request.budget <= Decimal::ZERO {
			return Err(MarketplaceError::Validation(
				"budget must be positive".to_string(),
			));
		}
		if request.category.trim().is_empty() {
			return Err(MarketplaceError::Validation(
				"category must not be empty".to_string(),
			));
		}

		if !self
			.storage
			.store_if_absent(NAMESPACE, &request.id, &request)
			.await?
		{
			return Err(MarketplaceError::Validation(format!(
				"request {} already exists",
				request.id
			)));
		}

		let decision = match self
			.assignment
			.select(&request, explicit_provider, &HashSet::new())
			.await
		{
			Ok(decision) => decision,
			Err(e) => {
				// Creation is atomic with the initial assignment; do not
				// leave an unassignable request behind.
				self.storage.remove(NAMESPACE, &request.id).await?;
				return Err(e);
			}
		};

		let previous = request.clone();
		request.assignment = Some(Assignment {
			provider_id: decision.provider_id.clone(),
			firm_id: decision.firm_id.clone(),
			method: decision.method,
			assigned_at: now(),
		});
		request.updated_at = now();
		self.storage
			.update_guarded(NAMESPACE, &request.id, &previous, &request)
			.await?;

		info!(request_id = %request.id, provider_id = %decision.provider_id, "Request created and assigned");
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::RequestCreated {
				request_id: request.id.clone(),
				requester_id: request.requester_id.clone(),
			}));
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Assigned {
				request_id: request.id.clone(),
				provider_id: decision.provider_id,
				firm_id: decision.firm_id,
				method: decision.method,
			}));

		Ok(request)
	}

	/// Accepts the request on behalf of the assigned candidate.
	///
	/// The transition is a conditional write keyed on the loaded snapshot
	/// (status `Pending`, expected assignee); of two concurrent accepts
	/// exactly one wins and the loser fails with `AlreadyAccepted`.
	pub async fn accept(&self, request_id: &RequestId, provider_id: &ProviderId) -> Result<Request> {
		let request = self.load(request_id).await?;
		if request.status == RequestStatus::Accepted {
			return Err(MarketplaceError::AlreadyAccepted);
		}
		require_status(&request, "accept")?;
		require_assignee(&request, provider_id)?;

		let mut next = request.clone();
		next.status = RequestStatus::Accepted;
		next.updated_at = now();

		if !self
			.storage
			.update_guarded(NAMESPACE, request_id, &request, &next)
			.await?
		{
			// Another caller moved the request between our load and swap.
			let current = self.load(request_id).await?;
			return match current.status {
				RequestStatus::Accepted => Err(MarketplaceError::AlreadyAccepted),
				status => Err(MarketplaceError::InvalidStateTransition {
					from: status,
					operation: "accept",
				}),
			};
		}

		info!(request_id = %request_id, provider_id = %provider_id, "Request accepted");
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Accepted {
				request_id: request_id.clone(),
				provider_id: provider_id.clone(),
			}));
		Ok(next)
	}

	/// Rejects a pending assignment and reassigns, excluding the rejecting
	/// provider. Rejection carries no reputation penalty.
	pub async fn reject(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
		reason: &str,
	) -> Result<Request> {
		let request = self.load(request_id).await?;
		require_status(&request, "reject")?;
		require_assignee(&request, provider_id)?;

		let mut next = request.clone();
		next.assignment = None;
		next.excluded_providers.push(provider_id.clone());
		next.updated_at = now();

		self.swap_or_conflict(&request, &next, "reject").await?;

		info!(request_id = %request_id, provider_id = %provider_id, reason, "Assignment rejected");
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Rejected {
				request_id: request_id.clone(),
				provider_id: provider_id.clone(),
				reason: reason.to_string(),
			}));

		self.try_reassign(next).await
	}

	/// `Accepted -> InProgress`.
	pub async fn start(&self, request_id: &RequestId, provider_id: &ProviderId) -> Result<Request> {
		let request = self.load(request_id).await?;
		require_status(&request, "start")?;
		require_assignee(&request, provider_id)?;

		let mut next = request.clone();
		next.status = RequestStatus::InProgress;
		next.updated_at = now();
		self.swap_or_conflict(&request, &next, "start").await?;

		info!(request_id = %request_id, "Work started");
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Started {
				request_id: request_id.clone(),
			}));
		Ok(next)
	}

	/// `InProgress -> Completed`. Settlement release is dispatched by the
	/// caller when a captured payment exists.
	pub async fn complete(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
	) -> Result<Request> {
		let request = self.load(request_id).await?;
		require_status(&request, "complete")?;
		require_assignee(&request, provider_id)?;

		let mut next = request.clone();
		next.status = RequestStatus::Completed;
		next.updated_at = now();
		self.swap_or_conflict(&request, &next, "complete").await?;

		info!(request_id = %request_id, "Request completed");
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Completed {
				request_id: request_id.clone(),
			}));
		Ok(next)
	}

	/// Cancels from any non-terminal state, recording who cancelled and the
	/// status the request was in. Refund evaluation runs off this record.
	pub async fn cancel(
		&self,
		request_id: &RequestId,
		actor_id: &str,
		reason: &str,
	) -> Result<Request> {
		let request = self.load(request_id).await?;
		require_status(&request, "cancel")?;

		let mut next = request.clone();
		next.status = RequestStatus::Cancelled;
		next.cancellation = Some(Cancellation {
			actor_id: actor_id.to_string(),
			reason: reason.to_string(),
			prior_status: request.status,
			cancelled_at: now(),
		});
		next.updated_at = now();
		self.swap_or_conflict(&request, &next, "cancel").await?;

		info!(request_id = %request_id, actor_id, reason, "Request cancelled");
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Cancelled {
				request_id: request_id.clone(),
				actor_id: actor_id.to_string(),
				reason: reason.to_string(),
			}));
		Ok(next)
	}

	/// Abandonment: the assignee unilaterally exits an accepted or
	/// in-progress request. Applies the status-dependent reputation penalty,
	/// increments the abandonment counter, returns the request to `Pending`,
	/// and reassigns excluding the abandoning provider.
	pub async fn abandon(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
		reason: AbandonReason,
		reason_text: Option<&str>,
	) -> Result<AbandonOutcome> {
		let request = self.load(request_id).await?;
		require_status(&request, "abandon")?;
		require_assignee(&request, provider_id)?;
		let prior_status = request.status;

		let mut next = request.clone();
		next.status = RequestStatus::Pending;
		next.assignment = None;
		next.excluded_providers.push(provider_id.clone());
		next.abandonment_events += 1;
		next.updated_at = now();
		self.swap_or_conflict(&request, &next, "abandon").await?;

		// Penalty is applied only after the transition won; a losing racer
		// must not penalize twice.
		let delta = penalty_for(prior_status, &self.reputation_config).unwrap_or(Decimal::ZERO);
		let penalty = self
			.reputation
			.apply_penalty(provider_id, delta, true)
			.await?;

		warn!(
			request_id = %request_id,
			provider_id = %provider_id,
			?reason,
			reason_text = reason_text.unwrap_or(""),
			delta = %penalty.delta_applied,
			"Request abandoned"
		);
		self.event_bus
			.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Abandoned {
				request_id: request_id.clone(),
				provider_id: provider_id.clone(),
				reputation_delta: penalty.delta_applied,
			}));

		let request = self.try_reassign(next).await?;
		Ok(AbandonOutcome {
			request,
			reputation_delta: penalty.delta_applied,
		})
	}

	/// Links a captured payment to its request.
	pub async fn attach_payment(
		&self,
		request_id: &RequestId,
		payment_id: &PaymentId,
	) -> Result<Request> {
		let request = self.load(request_id).await?;
		if request.status.is_terminal() {
			return Err(MarketplaceError::InvalidStateTransition {
				from: request.status,
				operation: "capture_payment",
			});
		}
		if request.payment_id.is_some() {
			return Err(MarketplaceError::Validation(format!(
				"request {} already has a captured payment",
				request_id
			)));
		}

		let mut next = request.clone();
		next.payment_id = Some(payment_id.clone());
		next.updated_at = now();
		self.swap_or_conflict(&request, &next, "capture_payment")
			.await?;
		Ok(next)
	}

	/// Re-runs assignment with the request's exclusion set. A request whose
	/// policy needs an explicit provider, or for which no candidate remains,
	/// stays pending and unassigned for manual intervention.
	async fn try_reassign(&self, request: Request) -> Result<Request> {
		if request.assignment_method != marketplace_types::AssignmentMethod::Auto {
			warn!(request_id = %request.id, "Request needs manual reassignment");
			return Ok(request);
		}

		let exclusions: HashSet<ProviderId> =
			request.excluded_providers.iter().cloned().collect();
		match self.assignment.select(&request, None, &exclusions).await {
			Ok(decision) => {
				let mut next = request.clone();
				next.assignment = Some(Assignment {
					provider_id: decision.provider_id.clone(),
					firm_id: decision.firm_id.clone(),
					method: decision.method,
					assigned_at: now(),
				});
				next.updated_at = now();
				self.swap_or_conflict(&request, &next, "reassign").await?;

				info!(request_id = %next.id, provider_id = %decision.provider_id, "Request reassigned");
				self.event_bus
					.publish(MarketplaceEvent::Lifecycle(LifecycleEvent::Assigned {
						request_id: next.id.clone(),
						provider_id: decision.provider_id,
						firm_id: decision.firm_id,
						method: decision.method,
					}));
				Ok(next)
			}
			Err(MarketplaceError::NoEligibleProvider) => {
				warn!(request_id = %request.id, "No eligible provider for reassignment; request stays pending");
				Ok(request)
			}
			Err(e) => Err(e),
		}
	}

	/// Guarded swap mapping a lost race to the appropriate conflict error.
	async fn swap_or_conflict(
		&self,
		current: &Request,
		next: &Request,
		operation: &'static str,
	) -> Result<()> {
		if self
			.storage
			.update_guarded(NAMESPACE, &current.id, current, next)
			.await?
		{
			return Ok(());
		}
		let reloaded = self.load(&current.id).await?;
		Err(MarketplaceError::InvalidStateTransition {
			from: reloaded.status,
			operation,
		})
	}
}

fn require_status(request: &Request, operation: &'static str) -> Result<()> {
	if allowed_from(operation).contains(&request.status) {
		Ok(())
	} else {
		Err(MarketplaceError::InvalidStateTransition {
			from: request.status,
			operation,
		})
	}
}

fn require_assignee(request: &Request, provider_id: &ProviderId) -> Result<()> {
	match request.assigned_provider() {
		Some(assigned) if assigned == provider_id => Ok(()),
		_ => Err(MarketplaceError::Forbidden(format!(
			"provider {} is not the assigned candidate",
			provider_id
		))),
	}
}
