use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::graph_engine::types::EngineError;

/// Default LRU block cache size, in MiB.
pub const DEFAULT_BLOCK_CACHE_MB: usize = 512;

/// Default number of background threads handed to the storage backend.
pub const DEFAULT_PARALLELISM: i32 = 2;

/// Runtime configuration. Every field is optional so that partial config
/// files merge cleanly over the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
	/// LRU block cache size in MiB. Defaults to 512.
	pub block_cache_mb: Option<usize>,
	/// Whether the write-ahead log is disabled. Defaults to true:
	/// durability is explicitly not guaranteed beyond what the backend
	/// provides, and transactional semantics are unaffected.
	pub disable_wal: Option<bool>,
	/// Background thread count for the storage backend.
	pub parallelism: Option<i32>,
	/// Default executor pull budget. `None` leaves queries unbounded
	/// unless the caller sets a budget per executor.
	pub max_pulls: Option<u64>,
}

impl Config {
	pub fn from_json(raw: &str) -> Result<Config, EngineError> {
		Ok(sonic_rs::from_str(raw)?)
	}

	pub fn from_file(path: &Path) -> Result<Config, EngineError> {
		let raw = fs::read_to_string(path)?;
		Self::from_json(&raw)
	}

	#[inline]
	pub fn block_cache_bytes(&self) -> usize {
		self.block_cache_mb.unwrap_or(DEFAULT_BLOCK_CACHE_MB) * 1024 * 1024
	}

	#[inline]
	pub fn wal_disabled(&self) -> bool {
		self.disable_wal.unwrap_or(true)
	}

	#[inline]
	pub fn parallelism(&self) -> i32 {
		self.parallelism.unwrap_or(DEFAULT_PARALLELISM)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = Config::default();
		assert_eq!(config.block_cache_bytes(), 512 * 1024 * 1024);
		assert!(config.wal_disabled());
		assert_eq!(config.parallelism(), 2);
		assert_eq!(config.max_pulls, None);
	}

	#[test]
	fn test_partial_json_merges_over_defaults() {
		let config = Config::from_json(r#"{"block_cache_mb": 64}"#).unwrap();
		assert_eq!(config.block_cache_bytes(), 64 * 1024 * 1024);
		assert!(config.wal_disabled());
	}

	#[test]
	fn test_full_json() {
		let raw = r#"{
			"block_cache_mb": 128,
			"disable_wal": false,
			"parallelism": 8,
			"max_pulls": 100000
		}"#;
		let config = Config::from_json(raw).unwrap();
		assert_eq!(config.block_cache_mb, Some(128));
		assert_eq!(config.disable_wal, Some(false));
		assert_eq!(config.parallelism(), 8);
		assert_eq!(config.max_pulls, Some(100_000));
	}

	#[test]
	fn test_rejects_malformed_json() {
		assert!(Config::from_json("{not json").is_err());
	}
}
