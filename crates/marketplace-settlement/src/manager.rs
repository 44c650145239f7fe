//! Settlement manager: escrow capture, release, and refunds.
//!
//! Escrow release is the engine's one exactly-once money movement. The
//! distribution record is written first, keyed by its payment id so at most
//! one can ever exist per payment, then the payment is moved
//! `Held -> Released` with a conditional write. A duplicate or resumed
//! release finds the existing record and completes the same way, so callers
//! can retry release blindly.

use crate::distribution::{
	compute_distribution, evaluate_refund, refund_percentage, RefundRecommendation,
};
use marketplace_config::SettlementConfig;
use marketplace_storage::StorageService;
use marketplace_types::{
	now, Distribution, EscrowStatus, EventBus, FirmId, MarketplaceError, MarketplaceEvent, Payment,
	PaymentId, Refund, Request, RequestStatus, Result, SettlementEvent,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PAYMENTS_NAMESPACE: &str = "payments";
const DISTRIBUTIONS_NAMESPACE: &str = "distributions";

pub struct SettlementManager {
	storage: Arc<StorageService>,
	config: SettlementConfig,
	event_bus: EventBus,
}

impl SettlementManager {
	pub fn new(storage: Arc<StorageService>, config: SettlementConfig, event_bus: EventBus) -> Self {
		Self {
			storage,
			config,
			event_bus,
		}
	}

	/// Loads a payment by id.
	pub async fn payment(&self, payment_id: &PaymentId) -> Result<Payment> {
		self.storage
			.retrieve_optional(PAYMENTS_NAMESPACE, payment_id)
			.await?
			.ok_or_else(|| MarketplaceError::NotFound(format!("payment {}", payment_id)))
	}

	/// Loads the distribution recorded for a payment.
	pub async fn distribution(&self, payment_id: &PaymentId) -> Result<Distribution> {
		self.storage
			.retrieve_optional(DISTRIBUTIONS_NAMESPACE, payment_id)
			.await?
			.ok_or_else(|| {
				MarketplaceError::NotFound(format!("distribution for payment {}", payment_id))
			})
	}

	/// Captures a client payment into escrow for an active request.
	pub async fn capture_payment(
		&self,
		request: &Request,
		gross_amount: Decimal,
		currency: String,
		external_reference: String,
	) -> Result<Payment> {
		if gross_amount <= Decimal::ZERO {
			return Err(MarketplaceError::Validation(
				"payment amount must be positive".to_string(),
			));
		}
		if request.status.is_terminal() {
			return Err(MarketplaceError::InvalidStateTransition {
				from: request.status,
				operation: "capture_payment",
			});
		}
		if request.payment_id.is_some() {
			return Err(MarketplaceError::Validation(format!(
				"request {} already has a captured payment",
				request.id
			)));
		}

		let payment = Payment::capture(
			request.id.clone(),
			gross_amount,
			currency,
			external_reference,
		);
		self.storage
			.store_if_absent(PAYMENTS_NAMESPACE, &payment.id, &payment)
			.await?;

		info!(payment_id = %payment.id, request_id = %request.id, gross = %gross_amount, "Payment captured into escrow");
		self.event_bus.publish(MarketplaceEvent::Settlement(
			SettlementEvent::PaymentCaptured {
				payment_id: payment.id.clone(),
				request_id: request.id.clone(),
				gross_amount,
			},
		));
		Ok(payment)
	}

	/// Discards a captured payment whose request linkage failed. The record
	/// was never reachable through a request, so removing it is the
	/// compensation for the failed capture.
	pub async fn void_payment(&self, payment_id: &PaymentId) -> Result<()> {
		self.storage.remove(PAYMENTS_NAMESPACE, payment_id).await?;
		warn!(payment_id = %payment_id, "Voided payment with no request linkage");
		Ok(())
	}

	/// Releases escrow for a completed request and records the distribution.
	///
	/// Idempotent: a payment already released returns its existing
	/// distribution. `firm` carries the commission percentage when the
	/// assignment was routed through a firm.
	pub async fn release_escrow(
		&self,
		payment_id: &PaymentId,
		request: &Request,
		firm: Option<(&FirmId, Decimal)>,
	) -> Result<Distribution> {
		let payment = self.payment(payment_id).await?;
		match payment.escrow_status {
			EscrowStatus::Held => {}
			EscrowStatus::Released => {
				debug!(payment_id = %payment_id, "Escrow already released; returning existing distribution");
				return self.distribution(payment_id).await;
			}
			EscrowStatus::Refunded | EscrowStatus::PartiallyRefunded => {
				return Err(MarketplaceError::EscrowNotHeld)
			}
		}
		if request.status != RequestStatus::Completed {
			return Err(MarketplaceError::RequestNotCompleted);
		}
		let provider_id = request
			.assigned_provider()
			.ok_or_else(|| {
				MarketplaceError::Validation(format!(
					"completed request {} has no assigned provider",
					request.id
				))
			})?
			.clone();

		let computed = compute_distribution(&payment, &provider_id, firm, &self.config);
		if !computed.sums_to_gross() {
			return Err(MarketplaceError::DistributionSumMismatch);
		}
		// Keyed by payment id: a release that crashed between the two writes
		// finds its earlier record here and resumes.
		let distribution = if self
			.storage
			.store_if_absent(DISTRIBUTIONS_NAMESPACE, payment_id, &computed)
			.await?
		{
			computed
		} else {
			self.distribution(payment_id).await?
		};

		let mut released = payment.clone();
		released.escrow_status = EscrowStatus::Released;
		released.distribution_id = Some(distribution.id.clone());
		released.updated_at = now();

		if !self
			.storage
			.update_guarded(PAYMENTS_NAMESPACE, payment_id, &payment, &released)
			.await?
		{
			let current = self.payment(payment_id).await?;
			return match current.escrow_status {
				EscrowStatus::Released => self.distribution(payment_id).await,
				// A refund won the race; the never-released record must not
				// linger next to a refunded payment.
				_ => {
					self.storage
						.remove(DISTRIBUTIONS_NAMESPACE, payment_id)
						.await?;
					Err(MarketplaceError::EscrowNotHeld)
				}
			};
		}

		info!(
			payment_id = %payment_id,
			distribution_id = %distribution.id,
			net_payout = %distribution.net_payout,
			"Escrow released"
		);
		self.event_bus.publish(MarketplaceEvent::Settlement(
			SettlementEvent::EscrowReleased {
				payment_id: payment_id.clone(),
				distribution_id: distribution.id.clone(),
			},
		));
		Ok(distribution)
	}

	/// Computes the recommended refund for a cancelled request without
	/// touching any state.
	pub async fn recommend_refund(
		&self,
		request: &Request,
		payment_id: &PaymentId,
	) -> Result<RefundRecommendation> {
		let payment = self.payment(payment_id).await?;
		if payment.escrow_status != EscrowStatus::Held {
			return Err(MarketplaceError::EscrowNotHeld);
		}
		let cancellation = request.cancellation.as_ref().ok_or_else(|| {
			MarketplaceError::Validation(format!("request {} was not cancelled", request.id))
		})?;

		let percentage = refund_percentage(
			cancellation.prior_status,
			request.abandonment_events,
			&self.config,
		);
		Ok(evaluate_refund(&payment, percentage, &self.config))
	}

	/// Issues a refund at the given percentage, moving the payment out of
	/// escrow. The percentage is the administrator's decision; the
	/// recommendation from [`recommend_refund`](Self::recommend_refund) is
	/// advisory.
	pub async fn issue_refund(
		&self,
		payment_id: &PaymentId,
		authorized_by: &str,
		percentage: Decimal,
	) -> Result<Payment> {
		if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
			return Err(MarketplaceError::Validation(format!(
				"refund percentage must be in (0, 100], got {}",
				percentage
			)));
		}
		let payment = self.payment(payment_id).await?;
		if payment.escrow_status != EscrowStatus::Held {
			return Err(MarketplaceError::EscrowNotHeld);
		}
		let recommendation = evaluate_refund(&payment, percentage, &self.config);

		let mut refunded = payment.clone();
		refunded.escrow_status = if recommendation.percentage == Decimal::ONE_HUNDRED {
			EscrowStatus::Refunded
		} else {
			EscrowStatus::PartiallyRefunded
		};
		refunded.refund = Some(Refund {
			percentage: recommendation.percentage,
			gross_refund: recommendation.gross_refund,
			processing_fee: recommendation.processing_fee,
			refunded_amount: recommendation.refunded_amount,
			authorized_by: authorized_by.to_string(),
			issued_at: now(),
		});
		refunded.updated_at = now();

		if !self
			.storage
			.update_guarded(PAYMENTS_NAMESPACE, payment_id, &payment, &refunded)
			.await?
		{
			return Err(MarketplaceError::EscrowNotHeld);
		}

		info!(
			payment_id = %payment_id,
			percentage = %recommendation.percentage,
			refunded = %recommendation.refunded_amount,
			"Refund issued"
		);
		self.event_bus.publish(MarketplaceEvent::Settlement(
			SettlementEvent::RefundIssued {
				payment_id: payment_id.clone(),
				percentage: recommendation.percentage,
				refunded_amount: recommendation.refunded_amount,
			},
		));
		Ok(refunded)
	}
}
