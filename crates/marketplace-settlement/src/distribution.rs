//! Fund distribution and refund arithmetic.
//!
//! All amounts are computed with `Decimal` and rounded to two decimal places.
//! The commission, withholding, and payout lines are rounded cuts; the
//! platform fee is derived last by exact subtraction from the gross, so the
//! four distribution components always sum to the gross amount exactly and
//! any rounding remainder lands on the platform-fee line, never on the
//! provider.

use marketplace_config::SettlementConfig;
use marketplace_types::{now, new_id, Distribution, FirmId, Payment, ProviderId, RequestStatus};
use rust_decimal::{Decimal, RoundingStrategy};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

fn round_amount(value: Decimal) -> Decimal {
	value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
	round_amount(amount * percent / HUNDRED)
}

/// Computes the distribution for a released payment.
///
/// Waterfall order: platform fee off the gross, firm commission off the
/// remainder (when the assignment was routed through a firm), statutory
/// withholding off the provider net, and the rest as the provider payout.
/// The fee line is materialized last so it absorbs the rounding remainder.
pub fn compute_distribution(
	payment: &Payment,
	provider_id: &ProviderId,
	firm: Option<(&FirmId, Decimal)>,
	config: &SettlementConfig,
) -> Distribution {
	let gross = payment.gross_amount;
	// Exact fee basis; the fee line itself is derived by subtraction below.
	let after_fee = gross * (HUNDRED - config.platform_fee_percent) / HUNDRED;

	let (firm_id, firm_commission) = match firm {
		Some((id, commission_percent)) => {
			(Some(id.clone()), percent_of(after_fee, commission_percent))
		}
		None => (None, Decimal::ZERO),
	};
	let provider_net = after_fee - firm_commission;

	let withholding = percent_of(provider_net, config.withholding_rate_percent);
	let net_payout = round_amount(provider_net - withholding);
	let platform_fee = gross - firm_commission - withholding - net_payout;

	Distribution {
		id: new_id(),
		payment_id: payment.id.clone(),
		provider_id: provider_id.clone(),
		firm_id,
		gross_amount: gross,
		platform_fee,
		firm_commission,
		withholding,
		net_payout,
		created_at: now(),
	}
}

/// A computed refund recommendation. Pure output; nothing is persisted until
/// an administrator turns it into an issued refund.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundRecommendation {
	/// Percentage of the gross amount to refund, 0 to 100.
	pub percentage: Decimal,
	/// Refund before the processing fee.
	pub gross_refund: Decimal,
	/// Processing fee deducted from the refund.
	pub processing_fee: Decimal,
	/// Amount to return to the client.
	pub refunded_amount: Decimal,
}

/// Recommends a refund percentage for a cancelled request.
///
/// Abandonment history overrides the status tiers: a client whose request was
/// ever abandoned gets a full refund no matter when they cancelled. Otherwise
/// the tier is keyed on the status the request was cancelled from.
pub fn refund_percentage(
	prior_status: RequestStatus,
	abandonment_events: u32,
	config: &SettlementConfig,
) -> Decimal {
	if abandonment_events > 0 {
		return HUNDRED;
	}
	match prior_status {
		RequestStatus::Pending => HUNDRED,
		RequestStatus::Accepted => config.refund.accepted_percent,
		RequestStatus::InProgress => config.refund.in_progress_percent,
		// Terminal statuses cannot be cancelled; callers never reach here.
		RequestStatus::Completed | RequestStatus::Cancelled => Decimal::ZERO,
	}
}

/// Evaluates the refund amounts for a payment at the given percentage.
pub fn evaluate_refund(
	payment: &Payment,
	percentage: Decimal,
	config: &SettlementConfig,
) -> RefundRecommendation {
	let gross_refund = percent_of(payment.gross_amount, percentage);
	let processing_fee = percent_of(gross_refund, config.refund_processing_fee_percent);
	RefundRecommendation {
		percentage,
		gross_refund,
		processing_fee,
		refunded_amount: gross_refund - processing_fee,
	}
}
