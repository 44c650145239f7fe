//! Common identifier and time types used throughout the engine.

use chrono::{DateTime, Utc};

/// Unique identifier for a service request.
pub type RequestId = String;

/// Unique identifier for a provider.
pub type ProviderId = String;

/// Unique identifier for a requester (client).
pub type RequesterId = String;

/// Unique identifier for a firm.
pub type FirmId = String;

/// Unique identifier for a payment.
pub type PaymentId = String;

/// Unique identifier for a distribution record.
pub type DistributionId = String;

/// Timestamp in UTC.
pub type Timestamp = DateTime<Utc>;

/// Generates a new random identifier.
pub fn new_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

/// Current UTC timestamp.
pub fn now() -> Timestamp {
	Utc::now()
}
