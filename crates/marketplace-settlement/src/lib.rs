//! Settlement engine: escrow, distributions, refunds, and deferred jobs.
//!
//! Money flows through three stages. A payment is captured into escrow when
//! the client funds a request; on completion the escrow is released and split
//! into a distribution; on cancellation a refund is evaluated and issued.
//! Release and refund are driven by retried background jobs so lifecycle
//! transitions never block on settlement.

pub mod distribution;
pub mod jobs;
pub mod manager;

pub use distribution::{compute_distribution, evaluate_refund, refund_percentage, RefundRecommendation};
pub use jobs::{DeadLetterRecord, JobDispatcher, JobHandler, JobKind, SettlementJob};
pub use manager::SettlementManager;
