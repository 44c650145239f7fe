//! Deferred settlement job dispatch with retries and a dead-letter queue.
//!
//! Escrow releases and refunds triggered by lifecycle transitions run as
//! background jobs so a transient storage or downstream failure never blocks
//! the transition itself. Every job is journaled to storage at dispatch and
//! the entry is cleared only on a terminal outcome, so a crash mid-flight
//! leaves the obligation on record. Jobs retry with exponential backoff; a
//! job that exhausts its attempts (or fails with a non-retryable error) is
//! written to the dead-letter namespace for operator intervention, never
//! silently dropped.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use marketplace_config::RetryPolicyConfig;
use marketplace_storage::StorageService;
use marketplace_types::{
	now, new_id, EventBus, MarketplaceError, MarketplaceEvent, PaymentId, RequestId, Result,
	SettlementEvent, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const JOBS_NAMESPACE: &str = "jobs";
const DEAD_LETTER_NAMESPACE: &str = "dead_letter";

/// Work the dispatcher can defer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobKind {
	ReleaseEscrow {
		payment_id: PaymentId,
		request_id: RequestId,
	},
	IssueRefund {
		payment_id: PaymentId,
		request_id: RequestId,
		authorized_by: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementJob {
	pub id: String,
	pub kind: JobKind,
	pub created_at: Timestamp,
}

/// A job that exhausted its retries, parked for operator intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
	pub job: SettlementJob,
	pub attempts: u32,
	pub last_error: String,
	pub dead_lettered_at: Timestamp,
}

/// Executes a job. Implemented by the engine facade, which owns the
/// lifecycle and settlement managers the jobs drive.
#[async_trait]
pub trait JobHandler: Send + Sync {
	async fn execute(&self, job: &SettlementJob) -> Result<()>;
}

/// Conflict-class errors are final: retrying an ordering conflict or a
/// validation failure cannot change the outcome.
fn is_retryable(error: &MarketplaceError) -> bool {
	matches!(
		error,
		MarketplaceError::Storage(_) | MarketplaceError::Other(_)
	)
}

/// Background worker that drains the job queue with per-job retries.
pub struct JobDispatcher {
	sender: mpsc::UnboundedSender<SettlementJob>,
	storage: Arc<StorageService>,
	worker: JoinHandle<()>,
}

impl JobDispatcher {
	pub fn start(
		handler: Arc<dyn JobHandler>,
		storage: Arc<StorageService>,
		policy: RetryPolicyConfig,
		event_bus: EventBus,
	) -> Self {
		let (sender, mut receiver) = mpsc::unbounded_channel::<SettlementJob>();
		let worker_storage = storage.clone();
		let worker = tokio::spawn(async move {
			while let Some(job) = receiver.recv().await {
				run_job(&*handler, &worker_storage, &policy, &event_bus, job).await;
			}
		});
		Self {
			sender,
			storage,
			worker,
		}
	}

	/// Journals and enqueues a job, returning its id. The journal entry is
	/// cleared only on a terminal outcome, so a crash mid-flight leaves the
	/// obligation on record in the `jobs` namespace.
	pub async fn dispatch(&self, kind: JobKind) -> Result<String> {
		let job = SettlementJob {
			id: new_id(),
			kind,
			created_at: now(),
		};
		self.storage.store(JOBS_NAMESPACE, &job.id, &job).await?;
		let id = job.id.clone();
		self.sender
			.send(job)
			.map_err(|_| MarketplaceError::Storage("job queue is closed".to_string()))?;
		Ok(id)
	}

	/// Closes the queue and waits for in-flight jobs to finish.
	pub async fn shutdown(self) {
		drop(self.sender);
		if let Err(e) = self.worker.await {
			error!("job worker panicked: {}", e);
		}
	}
}

async fn run_job(
	handler: &dyn JobHandler,
	storage: &StorageService,
	policy: &RetryPolicyConfig,
	event_bus: &EventBus,
	job: SettlementJob,
) {
	let mut backoff = ExponentialBackoff {
		initial_interval: policy.initial_delay(),
		max_interval: policy.max_delay(),
		multiplier: policy.multiplier,
		max_elapsed_time: None,
		..Default::default()
	};
	let mut attempts = 0;

	loop {
		attempts += 1;
		match handler.execute(&job).await {
			Ok(()) => {
				info!(job_id = %job.id, attempts, "Settlement job completed");
				clear_journal(storage, &job.id).await;
				return;
			}
			Err(e) if is_retryable(&e) && attempts < policy.max_attempts => {
				let delay = backoff.next_backoff().unwrap_or_else(|| policy.max_delay());
				warn!(
					job_id = %job.id,
					attempts,
					delay_ms = delay.as_millis() as u64,
					"Settlement job failed, retrying: {}",
					e
				);
				tokio::time::sleep(delay).await;
			}
			Err(e) => {
				dead_letter(storage, event_bus, job, attempts, e).await;
				return;
			}
		}
	}
}

async fn clear_journal(storage: &StorageService, job_id: &str) {
	if let Err(e) = storage.remove(JOBS_NAMESPACE, job_id).await {
		warn!(job_id = %job_id, "Failed to clear job journal entry: {}", e);
	}
}

async fn dead_letter(
	storage: &StorageService,
	event_bus: &EventBus,
	job: SettlementJob,
	attempts: u32,
	error: MarketplaceError,
) {
	let reason = error.to_string();
	error!(job_id = %job.id, attempts, "Settlement job dead-lettered: {}", reason);

	let record = DeadLetterRecord {
		job,
		attempts,
		last_error: reason.clone(),
		dead_lettered_at: now(),
	};
	if let Err(e) = storage
		.store(DEAD_LETTER_NAMESPACE, &record.job.id, &record)
		.await
	{
		// Last resort: the failure is at least in the log.
		error!(job_id = %record.job.id, "Failed to persist dead-letter record: {}", e);
	} else {
		clear_journal(storage, &record.job.id).await;
	}
	event_bus.publish(MarketplaceEvent::Settlement(
		SettlementEvent::JobDeadLettered {
			job_id: record.job.id.clone(),
			reason,
		},
	));
}
