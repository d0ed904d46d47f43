//! Embedded graph database engine: storage, plans, and execution.

pub mod config;
pub mod exec_core;
pub mod plan_core;
pub mod storage_core;
pub mod types;

use std::sync::Arc;

use crate::graph_engine::config::Config;
use crate::graph_engine::storage_core::QuiverGraphStorage;
use crate::graph_engine::types::EngineError;

/// The handle an embedding layer holds on to: storage shared across many
/// concurrent transactions. Carries no global state beyond the backend
/// handle and configuration.
pub struct QuiverGraphEngine {
	pub storage: Arc<QuiverGraphStorage>,
}

#[derive(Default, Clone)]
pub struct QuiverGraphEngineOpts {
	pub path: String,
	pub config: Config,
}

impl QuiverGraphEngine {
	pub fn new(opts: QuiverGraphEngineOpts) -> Result<QuiverGraphEngine, EngineError> {
		let storage = QuiverGraphStorage::new(opts.path.as_str(), opts.config)?;
		Ok(Self {
			storage: Arc::new(storage),
		})
	}

	/// Runs `f` inside a fresh transaction and commits, retrying the whole
	/// closure with a new transaction when the commit loses an optimistic
	/// conflict (`Busy`/`TryAgain`). Any other error rolls back and
	/// surfaces immediately.
	pub fn with_txn<T>(
		&self,
		max_retries: usize,
		mut f: impl FnMut(&storage_core::GraphTxn) -> Result<T, EngineError>,
	) -> Result<T, EngineError> {
		let mut attempt = 0;
		loop {
			let txn = self.storage.begin();
			// dropping an uncommitted transaction discards its writes
			let value = f(&txn)?;
			match txn.commit() {
				Ok(()) => return Ok(value),
				Err(err) if err.is_retryable() && attempt < max_retries => {
					attempt += 1;
					tracing::debug!(attempt, "retrying transaction after conflict");
				}
				Err(err) => return Err(err),
			}
		}
	}
}
