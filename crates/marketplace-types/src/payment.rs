//! Payment and distribution entities.
//!
//! Payments are captured into escrow and released or refunded by the
//! settlement engine. Distributions are append-only audit records of how a
//! released payment was split; corrections happen through new refund or
//! adjustment records, never by mutating an existing distribution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::*;

/// Escrow state of a captured payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
	/// Captured and held by the platform.
	Held,
	/// Released to the provider/firm. Terminal.
	Released,
	/// Fully refunded to the client. Terminal.
	Refunded,
	/// Partially refunded to the client. Terminal.
	PartiallyRefunded,
}

impl EscrowStatus {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, EscrowStatus::Held)
	}
}

/// Record of an issued refund, kept on the payment for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
	/// Percentage of the gross amount refunded, 0 to 100.
	pub percentage: Decimal,
	/// Refund before the processing fee.
	pub gross_refund: Decimal,
	/// Processing fee deducted from the refund.
	pub processing_fee: Decimal,
	/// Amount actually returned to the client.
	pub refunded_amount: Decimal,
	/// Administrator who authorized the refund.
	pub authorized_by: String,
	pub issued_at: Timestamp,
}

/// A captured client payment held in escrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
	pub id: PaymentId,
	pub request_id: RequestId,
	pub gross_amount: Decimal,
	/// ISO currency code, e.g. "INR".
	pub currency: String,
	/// Reference from the upstream payment processor.
	pub external_reference: String,
	pub escrow_status: EscrowStatus,
	/// Distribution created when escrow was released. Exactly one per
	/// payment; duplicate release calls return this record.
	pub distribution_id: Option<DistributionId>,
	/// Refund record, set when escrow was (partially) refunded.
	pub refund: Option<Refund>,
	pub captured_at: Timestamp,
	pub updated_at: Timestamp,
}

impl Payment {
	/// Creates a newly captured payment held in escrow.
	pub fn capture(
		request_id: RequestId,
		gross_amount: Decimal,
		currency: String,
		external_reference: String,
	) -> Self {
		let captured_at = now();
		Self {
			id: new_id(),
			request_id,
			gross_amount,
			currency,
			external_reference,
			escrow_status: EscrowStatus::Held,
			distribution_id: None,
			refund: None,
			captured_at,
			updated_at: captured_at,
		}
	}
}

/// Immutable breakdown of a released payment.
///
/// Invariant: `platform_fee + firm_commission + withholding + net_payout`
/// equals `gross_amount` exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
	pub id: DistributionId,
	pub payment_id: PaymentId,
	pub provider_id: ProviderId,
	/// Firm the commission was paid to, if the provider is firm-affiliated.
	pub firm_id: Option<FirmId>,
	pub gross_amount: Decimal,
	pub platform_fee: Decimal,
	pub firm_commission: Decimal,
	/// Statutory withholding, deducted from the provider payout but
	/// recorded separately for reporting.
	pub withholding: Decimal,
	/// Amount actually paid out to the provider after withholding.
	pub net_payout: Decimal,
	pub created_at: Timestamp,
}

impl Distribution {
	/// Checks the exact-sum invariant over the four components.
	pub fn sums_to_gross(&self) -> bool {
		self.platform_fee + self.firm_commission + self.withholding + self.net_payout
			== self.gross_amount
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_captured_payment_is_held() {
		let payment = Payment::capture(
			"req-1".to_string(),
			Decimal::new(100_000, 0),
			"INR".to_string(),
			"pg_123".to_string(),
		);
		assert_eq!(payment.escrow_status, EscrowStatus::Held);
		assert!(payment.distribution_id.is_none());
		assert!(payment.refund.is_none());
	}

	#[test]
	fn test_escrow_terminal_states() {
		assert!(!EscrowStatus::Held.is_terminal());
		assert!(EscrowStatus::Released.is_terminal());
		assert!(EscrowStatus::Refunded.is_terminal());
		assert!(EscrowStatus::PartiallyRefunded.is_terminal());
	}

	#[test]
	fn test_distribution_sum_check() {
		let distribution = Distribution {
			id: new_id(),
			payment_id: "pay-1".to_string(),
			provider_id: "p-1".to_string(),
			firm_id: Some("f-1".to_string()),
			gross_amount: Decimal::new(100_000, 0),
			platform_fee: Decimal::new(15_000, 0),
			firm_commission: Decimal::new(12_750, 0),
			withholding: Decimal::new(7_225, 0),
			net_payout: Decimal::new(65_025, 0),
			created_at: now(),
		};
		assert!(distribution.sums_to_gross());

		let broken = Distribution {
			net_payout: Decimal::new(65_000, 0),
			..distribution
		};
		assert!(!broken.sums_to_gross());
	}
}
