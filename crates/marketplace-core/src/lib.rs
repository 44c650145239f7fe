//! Engine facade wiring the marketplace services together.
//!
//! `MarketplaceEngine` exposes the operation contracts consumed by the HTTP
//! layer and background workers: request lifecycle transitions, payment
//! capture, escrow release, and refunds. `MarketplaceBuilder` assembles the
//! services from a `MarketplaceConfig`, a storage backend, and directory
//! handles owned by the provider/firm registration system.
//!
//! Escrow release on completion is dispatched through the settlement job
//! queue, so a transient downstream failure retries in the background
//! instead of failing the completion call.

use async_trait::async_trait;
use marketplace_assignment::AssignmentEngine;
use marketplace_config::{validate_config, MarketplaceConfig, StorageConfig};
use marketplace_directory::{DirectoryError, FirmDirectory, ProviderDirectory};
use marketplace_lifecycle::{AbandonOutcome, LifecycleManager};
use marketplace_reputation::{ReputationRecord, ReputationTracker};
use marketplace_settlement::{
	JobDispatcher, JobHandler, JobKind, RefundRecommendation, SettlementJob, SettlementManager,
};
use marketplace_storage::implementations::{file::FileStorage, memory::MemoryStorage};
use marketplace_storage::{StorageInterface, StorageService};
use marketplace_types::{
	AbandonReason, AssignmentMethod, Distribution, EventBus, MarketplaceError, Payment, PaymentId,
	ProviderId, Request, RequestId, RequesterId, Result, Timestamp,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};

/// Input for request creation, as supplied by the calling API layer.
#[derive(Debug, Clone)]
pub struct CreateRequestInput {
	pub requester_id: RequesterId,
	pub category: String,
	pub description: String,
	pub budget: Decimal,
	pub deadline: Option<Timestamp>,
	pub allow_firms: bool,
	pub assignment_method: AssignmentMethod,
	/// Required for `Manual` and `ClientSpecified` assignment.
	pub explicit_provider_id: Option<ProviderId>,
}

/// Outcome of a refund evaluation. `recommendation` is `None` when the
/// payment is not refundable (escrow no longer held, or the request was
/// never cancelled).
#[derive(Debug, Clone)]
pub struct RefundEvaluation {
	pub eligible: bool,
	pub recommendation: Option<RefundRecommendation>,
}

/// Shared service bundle; the engine and the job worker both drive it.
struct Services {
	lifecycle: LifecycleManager,
	settlement: SettlementManager,
	firms: Arc<dyn FirmDirectory>,
	reputation: Arc<ReputationTracker>,
}

impl Services {
	/// Resolves the firm commission context and releases escrow.
	async fn release_escrow(&self, payment_id: &PaymentId) -> Result<Distribution> {
		let payment = self.settlement.payment(payment_id).await?;
		let request = self.lifecycle.load(&payment.request_id).await?;

		let firm_id = request.assignment.as_ref().and_then(|a| a.firm_id.clone());
		match firm_id {
			Some(firm_id) => {
				let firm = self
					.firms
					.firm(&firm_id)
					.await
					.map_err(map_directory_error)?;
				self.settlement
					.release_escrow(payment_id, &request, Some((&firm_id, firm.commission_percent)))
					.await
			}
			None => self.settlement.release_escrow(payment_id, &request, None).await,
		}
	}

	/// Issues the recommended refund for a cancelled request's payment.
	async fn issue_recommended_refund(
		&self,
		payment_id: &PaymentId,
		authorized_by: &str,
	) -> Result<Payment> {
		let payment = self.settlement.payment(payment_id).await?;
		let request = self.lifecycle.load(&payment.request_id).await?;
		let recommendation = self.settlement.recommend_refund(&request, payment_id).await?;
		self.settlement
			.issue_refund(payment_id, authorized_by, recommendation.percentage)
			.await
	}
}

#[async_trait]
impl JobHandler for Services {
	async fn execute(&self, job: &SettlementJob) -> Result<()> {
		match &job.kind {
			JobKind::ReleaseEscrow { payment_id, .. } => {
				self.release_escrow(payment_id).await?;
			}
			JobKind::IssueRefund {
				payment_id,
				authorized_by,
				..
			} => {
				self.issue_recommended_refund(payment_id, authorized_by)
					.await?;
			}
		}
		Ok(())
	}
}

/// The marketplace engine facade.
pub struct MarketplaceEngine {
	services: Arc<Services>,
	dispatcher: JobDispatcher,
	event_bus: EventBus,
	config: MarketplaceConfig,
}

impl MarketplaceEngine {
	// --- request lifecycle ---

	pub async fn create_request(&self, input: CreateRequestInput) -> Result<Request> {
		let request = Request::new(
			input.requester_id,
			input.category,
			input.description,
			input.budget,
			input.deadline,
			input.allow_firms,
			input.assignment_method,
		);
		self.services
			.lifecycle
			.create(request, input.explicit_provider_id.as_ref())
			.await
	}

	pub async fn request(&self, request_id: &RequestId) -> Result<Request> {
		self.services.lifecycle.load(request_id).await
	}

	pub async fn accept_request(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
	) -> Result<Request> {
		self.services.lifecycle.accept(request_id, provider_id).await
	}

	pub async fn reject_request(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
		reason: &str,
	) -> Result<Request> {
		self.services
			.lifecycle
			.reject(request_id, provider_id, reason)
			.await
	}

	pub async fn start_work(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
	) -> Result<Request> {
		self.services.lifecycle.start(request_id, provider_id).await
	}

	/// Completes the request and, when a payment is held in escrow,
	/// dispatches its release through the settlement job queue.
	pub async fn complete_request(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
	) -> Result<Request> {
		let request = self
			.services
			.lifecycle
			.complete(request_id, provider_id)
			.await?;
		if let Some(payment_id) = &request.payment_id {
			let job_id = self
				.dispatcher
				.dispatch(JobKind::ReleaseEscrow {
					payment_id: payment_id.clone(),
					request_id: request_id.clone(),
				})
				.await?;
			info!(request_id = %request_id, job_id = %job_id, "Escrow release dispatched");
		}
		Ok(request)
	}

	pub async fn cancel_request(
		&self,
		request_id: &RequestId,
		actor_id: &str,
		reason: &str,
	) -> Result<Request> {
		self.services
			.lifecycle
			.cancel(request_id, actor_id, reason)
			.await
	}

	pub async fn abandon_request(
		&self,
		request_id: &RequestId,
		provider_id: &ProviderId,
		reason: AbandonReason,
		reason_text: Option<&str>,
	) -> Result<AbandonOutcome> {
		self.services
			.lifecycle
			.abandon(request_id, provider_id, reason, reason_text)
			.await
	}

	// --- settlement ---

	/// Captures a client payment into escrow and links it to the request.
	pub async fn capture_payment(
		&self,
		request_id: &RequestId,
		gross_amount: Decimal,
		currency: String,
		external_reference: String,
	) -> Result<Payment> {
		let request = self.services.lifecycle.load(request_id).await?;
		let payment = self
			.services
			.settlement
			.capture_payment(&request, gross_amount, currency, external_reference)
			.await?;
		if let Err(attach_err) = self
			.services
			.lifecycle
			.attach_payment(request_id, &payment.id)
			.await
		{
			// The request moved under us; without a linkage the escrow entry
			// is unreachable, so drop it before surfacing the conflict.
			if let Err(e) = self.services.settlement.void_payment(&payment.id).await {
				error!(payment_id = %payment.id, "Failed to void unlinked payment: {}", e);
			}
			return Err(attach_err);
		}
		Ok(payment)
	}

	pub async fn payment(&self, payment_id: &PaymentId) -> Result<Payment> {
		self.services.settlement.payment(payment_id).await
	}

	/// Releases escrow synchronously. Idempotent; safe to call as a retry of
	/// the queued release.
	pub async fn release_escrow(&self, payment_id: &PaymentId) -> Result<Distribution> {
		self.services.release_escrow(payment_id).await
	}

	/// Evaluates refund eligibility and amounts without touching state.
	pub async fn evaluate_refund(&self, payment_id: &PaymentId) -> Result<RefundEvaluation> {
		let payment = self.services.settlement.payment(payment_id).await?;
		let request = self.services.lifecycle.load(&payment.request_id).await?;
		match self
			.services
			.settlement
			.recommend_refund(&request, payment_id)
			.await
		{
			Ok(recommendation) => Ok(RefundEvaluation {
				eligible: true,
				recommendation: Some(recommendation),
			}),
			Err(MarketplaceError::EscrowNotHeld) | Err(MarketplaceError::Validation(_)) => {
				Ok(RefundEvaluation {
					eligible: false,
					recommendation: None,
				})
			}
			Err(e) => Err(e),
		}
	}

	pub async fn issue_refund(
		&self,
		payment_id: &PaymentId,
		authorized_by: &str,
		percentage: Decimal,
	) -> Result<Payment> {
		self.services
			.settlement
			.issue_refund(payment_id, authorized_by, percentage)
			.await
	}

	/// Defers refund issuance to the job queue at the recommended
	/// percentage. Returns the job id.
	pub async fn dispatch_refund(
		&self,
		payment_id: &PaymentId,
		authorized_by: &str,
	) -> Result<String> {
		let payment = self.services.settlement.payment(payment_id).await?;
		self.dispatcher
			.dispatch(JobKind::IssueRefund {
				payment_id: payment_id.clone(),
				request_id: payment.request_id,
				authorized_by: authorized_by.to_string(),
			})
			.await
	}

	// --- reputation ---

	pub async fn reputation(&self, provider_id: &ProviderId) -> Result<ReputationRecord> {
		self.services.reputation.record(provider_id).await
	}

	pub async fn record_rating(
		&self,
		provider_id: &ProviderId,
		stars: u8,
	) -> Result<ReputationRecord> {
		self.services.reputation.record_rating(provider_id, stars).await
	}

	// --- plumbing ---

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn config(&self) -> &MarketplaceConfig {
		&self.config
	}

	/// Stops accepting jobs and waits for in-flight settlement jobs.
	pub async fn shutdown(self) {
		self.dispatcher.shutdown().await;
	}
}

type StorageFactory =
	Box<dyn FnOnce(&StorageConfig) -> Result<Box<dyn StorageInterface>> + Send>;

/// Assembles a `MarketplaceEngine` from configuration and collaborator
/// handles.
pub struct MarketplaceBuilder {
	config: MarketplaceConfig,
	providers: Option<Arc<dyn ProviderDirectory>>,
	firms: Option<Arc<dyn FirmDirectory>>,
	storage_factory: Option<StorageFactory>,
}

impl MarketplaceBuilder {
	pub fn new(config: MarketplaceConfig) -> Self {
		Self {
			config,
			providers: None,
			firms: None,
			storage_factory: None,
		}
	}

	pub fn with_provider_directory(mut self, providers: Arc<dyn ProviderDirectory>) -> Self {
		self.providers = Some(providers);
		self
	}

	pub fn with_firm_directory(mut self, firms: Arc<dyn FirmDirectory>) -> Self {
		self.firms = Some(firms);
		self
	}

	/// Overrides the storage backend chosen by `[storage]` config.
	pub fn with_storage_factory<F>(mut self, factory: F) -> Self
	where
		F: FnOnce(&StorageConfig) -> Result<Box<dyn StorageInterface>> + Send + 'static,
	{
		self.storage_factory = Some(Box::new(factory));
		self
	}

	pub fn build(self) -> Result<MarketplaceEngine> {
		validate_config(&self.config).map_err(|e| MarketplaceError::Config(e.to_string()))?;

		let providers = self.providers.ok_or_else(|| {
			MarketplaceError::Config("provider directory not provided".to_string())
		})?;
		let firms = self
			.firms
			.ok_or_else(|| MarketplaceError::Config("firm directory not provided".to_string()))?;

		let backend = match self.storage_factory {
			Some(factory) => factory(&self.config.storage)?,
			None => default_backend(&self.config.storage)?,
		};
		let storage = Arc::new(StorageService::new(backend));
		let event_bus = EventBus::new(256);

		let assignment = Arc::new(AssignmentEngine::new(
			providers,
			firms.clone(),
			self.config.assignment.clone(),
		));
		let reputation = Arc::new(ReputationTracker::new(storage.clone()));
		let lifecycle = LifecycleManager::new(
			storage.clone(),
			assignment,
			reputation.clone(),
			self.config.reputation.clone(),
			event_bus.clone(),
		);
		let settlement = SettlementManager::new(
			storage.clone(),
			self.config.settlement.clone(),
			event_bus.clone(),
		);

		let services = Arc::new(Services {
			lifecycle,
			settlement,
			firms,
			reputation,
		});
		let dispatcher = JobDispatcher::start(
			services.clone(),
			storage,
			self.config.settlement.jobs.clone(),
			event_bus.clone(),
		);

		info!(
			backend = %self.config.storage.backend,
			"Marketplace engine assembled"
		);
		Ok(MarketplaceEngine {
			services,
			dispatcher,
			event_bus,
			config: self.config,
		})
	}
}

fn default_backend(config: &StorageConfig) -> Result<Box<dyn StorageInterface>> {
	match config.backend.as_str() {
		"memory" => Ok(Box::new(MemoryStorage::new())),
		"file" => {
			let path = config.path.clone().ok_or_else(|| {
				MarketplaceError::Config("file storage backend requires a path".to_string())
			})?;
			Ok(Box::new(FileStorage::new(path)))
		}
		other => Err(MarketplaceError::Config(format!(
			"unknown storage backend: {}",
			other
		))),
	}
}

fn map_directory_error(err: DirectoryError) -> MarketplaceError {
	match err {
		DirectoryError::ProviderNotFound(id) => {
			MarketplaceError::NotFound(format!("provider {}", id))
		}
		DirectoryError::FirmNotFound(id) => MarketplaceError::NotFound(format!("firm {}", id)),
		DirectoryError::Backend(msg) => MarketplaceError::Storage(msg),
	}
}
