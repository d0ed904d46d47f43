//! # Storage Core
//!
//! ## Purpose
//! Persistent graph storage layer backed by RocksDB optimistic
//! transactions. Handles raw node/edge CRUD and keeps the adjacency index
//! consistent with primary data under insert and delete.
//!
//! ## Mental model
//! The graph is a set of ordered key-value column families. Nodes and
//! edges are serialized as bytes under their 12-byte element ids.
//! Adjacency is maintained as a dedicated index family whose key order
//! `(src, inout, edge)` makes one node's neighbourhood a contiguous key
//! range, with direction slices selectable by `inout` bounds.
//!
//! ## Key types
//! | Type | Description |
//! | --- | --- |
//! | `QuiverGraphStorage` | Owns the backend handle; hands out transactions. |
//! | `GraphTxn` | Snapshot-isolated transaction; the only mutation surface. |
//! | `Cf` | The four column families: `default`, `node`, `edge`, `adj`. |
//!
//! ## Invariants
//! - Key/value packing formats are stable and length-checked.
//!   - Enforced in: `QuiverGraphStorage::adj_key`, `QuiverGraphStorage::adj_bounds`,
//!     `QuiverGraphStorage::unpack_adj_key`.
//!   - Tested by: `storage_core_tests::test_adj_key_layout`,
//!     `storage_core_tests::test_adj_bounds_select_direction_slices`.
//!   - Failure symptom: traversal returns wrong adjacency; edges appear
//!     missing or swapped.
//! - Every adjacency entry has exactly one counterpart under `reverse`,
//!   and refers to a live edge row with matching endpoints.
//!   - Enforced in: `GraphTxn::put_edge`, `GraphTxn::delete_edge`,
//!     `GraphTxn::delete_node`.
//!   - Tested by: `storage_core_tests::test_adjacency_symmetry`,
//!     `storage_core_tests::test_delete_edge_removes_both_entries`.
//!   - Failure symptom: traversals see phantom or one-sided edges.
//! - Transaction discipline: reads observe the start snapshot plus the
//!   transaction's own writes; conflicting commits fail with `Busy`.
//!   - Enforced in: `GraphTxn` read paths (snapshot read options) and
//!     `GraphTxn::commit`.
//!   - Tested by: `storage_core_tests::test_snapshot_isolation_busy`.
//!   - Failure symptom: lost updates or dirty reads across transactions.
//!
//! ## Data flow
//! 1. A caller opens a `GraphTxn` via `QuiverGraphStorage::begin`.
//! 2. Keys are generated with the static packing helpers (`node_key`,
//!    `adj_key`, ...).
//! 3. Entity payloads are (de)serialized through the value codec into the
//!    transaction's reusable write buffer.
//! 4. Index entries are written or removed in the same transaction as the
//!    primary row.
//!
//! ## Concurrency & ordering
//! - Optimistic concurrency: transactions never block each other; write
//!   conflicts surface as `Busy` at commit and callers retry.
//! - Iteration order is lexicographic on keys: element-id order for nodes
//!   and edges, `(node, inout, edge)` order for adjacency.
//!
//! ## Failure modes & recovery
//! - `Busy`/`TryAgain` at commit: abort, rebuild the transaction, retry.
//! - Decode corruption: fatal for the running query, not for the process.

pub mod txn;

#[cfg(test)]
mod storage_core_tests;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rocksdb::{
	BlockBasedOptions, BoundColumnFamily, Cache, ColumnFamilyDescriptor, MultiThreaded,
	OptimisticTransactionDB, OptimisticTransactionOptions, Options, WriteOptions,
};
use tracing::debug;

use crate::graph_engine::config::Config;
use crate::graph_engine::types::{EngineError, StorageError};
use crate::utils::id::{ELEMENT_ID_LEN, ElementId};
use crate::utils::items::Inout;

pub use self::txn::{AdjIter, EdgeIter, GraphTxn, NodeIter, RangeIter};

pub type Db = OptimisticTransactionDB<MultiThreaded>;

/// Length of an adjacency key: `src(12) | inout(1) | edge(12)`.
pub const ADJ_KEY_LEN: usize = 2 * ELEMENT_ID_LEN + 1;

/// Column families, in their fixed on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cf {
	Default,
	Node,
	Edge,
	Adj,
}

impl Cf {
	pub const ALL: [Cf; 4] = [Cf::Default, Cf::Node, Cf::Edge, Cf::Adj];

	pub fn name(self) -> &'static str {
		match self {
			Cf::Default => "default",
			Cf::Node => "node",
			Cf::Edge => "edge",
			Cf::Adj => "adj",
		}
	}
}

pub struct QuiverGraphStorage {
	pub(crate) db: Db,
	config: Config,
}

impl QuiverGraphStorage {
	pub fn new(path: &str, config: Config) -> Result<QuiverGraphStorage, EngineError> {
		fs::create_dir_all(path)?;

		let cache = Cache::new_lru_cache(config.block_cache_bytes());
		let mut block_opts = BlockBasedOptions::default();
		block_opts.set_block_cache(&cache);

		let mut opts = Options::default();
		opts.create_if_missing(true);
		opts.create_missing_column_families(true);
		opts.increase_parallelism(config.parallelism());
		opts.set_block_based_table_factory(&block_opts);

		let descriptors = Cf::ALL.map(|cf| {
			let mut cf_opts = Options::default();
			cf_opts.set_block_based_table_factory(&block_opts);
			ColumnFamilyDescriptor::new(cf.name(), cf_opts)
		});

		let db: Db = OptimisticTransactionDB::open_cf_descriptors(&opts, Path::new(path), descriptors)?;
		debug!(path, cache_bytes = config.block_cache_bytes(), "opened graph storage");

		Ok(Self { db, config })
	}

	#[inline]
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Opens a snapshot-isolated optimistic transaction. Writes buffer in
	/// the transaction and apply atomically at commit; commit fails `Busy`
	/// if another committed transaction wrote a key this one wrote or
	/// read for update.
	pub fn begin(&self) -> GraphTxn<'_> {
		let mut write_opts = WriteOptions::default();
		write_opts.disable_wal(self.config.wal_disabled());
		let mut txn_opts = OptimisticTransactionOptions::default();
		txn_opts.set_snapshot(true);
		GraphTxn::new(self, self.db.transaction_opt(&write_opts, &txn_opts))
	}

	/// Column families are opened once in `new`; a missing handle is a
	/// programmer bug, not a runtime condition.
	#[inline]
	pub(crate) fn cf(&self, cf: Cf) -> Arc<BoundColumnFamily<'_>> {
		self.db
			.cf_handle(cf.name())
			.expect("column family opened at startup")
	}

	/// Indirection kept so the node key layout can change without touching
	/// call sites; compiles away entirely.
	#[must_use]
	#[inline(always)]
	pub fn node_key(id: &ElementId) -> &[u8; ELEMENT_ID_LEN] {
		id.as_bytes()
	}

	/// Indirection kept so the edge key layout can change without touching
	/// call sites; compiles away entirely.
	#[must_use]
	#[inline(always)]
	pub fn edge_key(id: &ElementId) -> &[u8; ELEMENT_ID_LEN] {
		id.as_bytes()
	}

	/// Adjacency key generator.
	///
	/// key = `src-node(12)` | `inout(1)` | `edge-id(12)`                 ← 25 B
	///
	/// The `(src, inout, edge)` order keeps one node's entries contiguous
	/// and groups them into `out`, `simple`, `in` runs.
	#[inline(always)]
	pub fn adj_key(src: &ElementId, inout: Inout, edge: &ElementId) -> [u8; ADJ_KEY_LEN] {
		let mut key = [0u8; ADJ_KEY_LEN];
		key[0..12].copy_from_slice(src.as_bytes());
		key[12] = inout.as_u8();
		key[13..25].copy_from_slice(edge.as_bytes());
		key
	}

	/// Scan bounds selecting the `[min_inout, max_inout]` direction slice
	/// under one node.
	///
	/// lower = `node(12)` | `min-inout(1)` (inclusive)                   ← 13 B
	/// upper = `node(12)` | `max-inout+1(1)` (exclusive)                 ← 13 B
	#[inline(always)]
	pub fn adj_bounds(
		node: &ElementId,
		min_inout: Inout,
		max_inout: Inout,
	) -> ([u8; ELEMENT_ID_LEN + 1], [u8; ELEMENT_ID_LEN + 1]) {
		debug_assert!(min_inout <= max_inout);
		let mut lower = [0u8; ELEMENT_ID_LEN + 1];
		lower[0..12].copy_from_slice(node.as_bytes());
		lower[12] = min_inout.as_u8();
		let mut upper = lower;
		upper[12] = max_inout.as_u8() + 1;
		(lower, upper)
	}

	/// Unpacks a 25-byte adjacency key into `(src, inout, edge)`.
	#[inline(always)]
	pub fn unpack_adj_key(key: &[u8]) -> Result<(ElementId, Inout, ElementId), EngineError> {
		if key.len() != ADJ_KEY_LEN {
			return Err(StorageError::CorruptedIndex(format!(
				"adjacency key has length {}, expected {ADJ_KEY_LEN}",
				key.len()
			))
			.into());
		}
		let src = ElementId::from_slice(&key[0..12]).expect("length checked above");
		let inout = Inout::from_u8(key[12]).ok_or_else(|| {
			StorageError::CorruptedIndex(format!("invalid inout byte {:#04x}", key[12]))
		})?;
		let edge = ElementId::from_slice(&key[13..25]).expect("length checked above");
		Ok((src, inout, edge))
	}

	/// Unpacks a 12-byte adjacency value into the destination node id.
	#[inline(always)]
	pub fn unpack_adj_value(value: &[u8]) -> Result<ElementId, EngineError> {
		if value.len() != ELEMENT_ID_LEN {
			return Err(StorageError::CorruptedIndex(format!(
				"adjacency value has length {}, expected {ELEMENT_ID_LEN}",
				value.len()
			))
			.into());
		}
		Ok(ElementId::from_slice(value).expect("length checked above"))
	}
}
