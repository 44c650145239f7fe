//! Lifecycle and settlement events published to collaborators.
//!
//! The notification/chat delivery channel consumes these; the engine only
//! publishes. Publishing to a bus with no subscribers is not an error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::common::*;
use crate::request::AssignmentMethod;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketplaceEvent {
	Lifecycle(LifecycleEvent),
	Settlement(SettlementEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
	RequestCreated {
		request_id: RequestId,
		requester_id: RequesterId,
	},
	Assigned {
		request_id: RequestId,
		provider_id: ProviderId,
		firm_id: Option<FirmId>,
		method: AssignmentMethod,
	},
	Accepted {
		request_id: RequestId,
		provider_id: ProviderId,
	},
	Rejected {
		request_id: RequestId,
		provider_id: ProviderId,
		reason: String,
	},
	Started {
		request_id: RequestId,
	},
	Completed {
		request_id: RequestId,
	},
	Cancelled {
		request_id: RequestId,
		actor_id: String,
		reason: String,
	},
	Abandoned {
		request_id: RequestId,
		provider_id: ProviderId,
		reputation_delta: Decimal,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlementEvent {
	PaymentCaptured {
		payment_id: PaymentId,
		request_id: RequestId,
		gross_amount: Decimal,
	},
	EscrowReleased {
		payment_id: PaymentId,
		distribution_id: DistributionId,
	},
	RefundIssued {
		payment_id: PaymentId,
		percentage: Decimal,
		refunded_amount: Decimal,
	},
	JobDeadLettered {
		job_id: String,
		reason: String,
	},
}

/// Broadcast bus for marketplace events.
pub struct EventBus {
	sender: broadcast::Sender<MarketplaceEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<MarketplaceEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, ignoring the no-subscribers case.
	pub fn publish(&self, event: MarketplaceEvent) {
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
