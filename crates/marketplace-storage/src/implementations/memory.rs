//! In-memory storage backend.
//!
//! Backed by a concurrent map. Compare-and-swap is atomic through the map's
//! per-entry locking, which is what makes it safe to use for the accept and
//! escrow-release transitions in tests and single-process deployments.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemoryStorage {
	data: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.data
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.data.insert(key.to_string(), value);
		Ok(())
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		// The entry API holds the shard lock across the comparison and the
		// write, so two concurrent callers cannot both observe `expected`.
		match self.data.entry(key.to_string()) {
			dashmap::Entry::Occupied(mut entry) => match expected {
				Some(expected) if entry.get().as_slice() == expected => {
					entry.insert(value);
					Ok(true)
				}
				_ => Ok(false),
			},
			dashmap::Entry::Vacant(entry) => match expected {
				None => {
					entry.insert(value);
					Ok(true)
				}
				Some(_) => Ok(false),
			},
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.data.contains_key(key))
	}
}
