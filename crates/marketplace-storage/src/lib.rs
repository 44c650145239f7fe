//! Storage module for the marketplace engine.
//!
//! This module provides abstractions for persistent storage of engine data,
//! supporting different backend implementations such as in-memory or
//! file-based storage. Beyond plain key-value operations, backends must
//! provide a single conditional write (`compare_and_swap`): the lifecycle
//! manager's accept transition and the settlement engine's escrow release
//! both rely on it to resolve concurrent writers, never on a read-then-write
//! pair.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// A requested item does not exist.
	#[error("not found")]
	NotFound,
	/// Serialization or deserialization failed.
	#[error("serialization error: {0}")]
	Serialization(String),
	/// The storage backend failed.
	#[error("backend error: {0}")]
	Backend(String),
}

impl From<StorageError> for marketplace_types::MarketplaceError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound => {
				marketplace_types::MarketplaceError::NotFound("record".to_string())
			}
			other => marketplace_types::MarketplaceError::Storage(other.to_string()),
		}
	}
}

/// Trait defining the low-level interface for storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes unconditionally.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Atomically replaces the value at `key` with `value` only if the
	/// current value equals `expected`. `expected = None` means the key must
	/// not exist (create-if-absent). Returns whether the swap happened.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// High-level storage service that provides typed operations.
///
/// Wraps a low-level backend and handles JSON serialization. Keys are formed
/// from a namespace and an id, e.g. `requests:<uuid>`.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value unconditionally.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves a value, mapping a missing key to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Atomically replaces a stored value only if it still equals `current`.
	///
	/// This is the typed guarded write used for state transitions with
	/// concurrent writers: the caller loads a snapshot, derives the next
	/// state, and the swap fails if another writer got there first.
	/// Returns whether the swap happened.
	pub async fn update_guarded<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		current: &T,
		next: &T,
	) -> Result<bool, StorageError> {
		let expected =
			serde_json::to_vec(current).map_err(|e| StorageError::Serialization(e.to_string()))?;
		let value =
			serde_json::to_vec(next).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.compare_and_swap(&Self::key(namespace, id), Some(&expected), value)
			.await
	}

	/// Stores a value only if no value exists for the key yet.
	pub async fn store_if_absent<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.compare_and_swap(&Self::key(namespace, id), None, bytes)
			.await
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks whether a value exists.
	pub async fn contains(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}
}
