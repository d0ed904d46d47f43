//! Snapshot-isolated transactions and their iterators.
//!
//! `GraphTxn` is the only mutation surface of the storage layer. Reads
//! observe the transaction's start snapshot amended by its own writes;
//! writes buffer in the transaction and apply atomically at commit.
//! Conflicts are detected at commit time (`Busy`), never by blocking.

use std::cell::RefCell;

use rocksdb::{
	DBRawIteratorWithThreadMode, ReadOptions, SnapshotWithThreadMode, Transaction,
};
use tracing::{debug, warn};

use crate::graph_engine::storage_core::{Cf, Db, QuiverGraphStorage};
use crate::graph_engine::types::{EngineError, StorageError};
use crate::utils::id::{ELEMENT_ID_LEN, ElementId};
use crate::utils::items::{AdjEntry, Edge, Inout, Node};

type RawIter<'txn, 'db> = DBRawIteratorWithThreadMode<'txn, Transaction<'db, Db>>;

/// An optimistic transaction over the graph column families.
///
/// Not `Sync`: a transaction belongs to a single query thread. Iterators
/// borrow the transaction and must be dropped before `commit`/`rollback`
/// consume it.
pub struct GraphTxn<'db> {
	storage: &'db QuiverGraphStorage,
	inner: Transaction<'db, Db>,
	snapshot: SnapshotWithThreadMode<'db, Db>,
	// Single serialization pass for every write; see `encode_buf`.
	write_buf: RefCell<Vec<u8>>,
}

impl<'db> GraphTxn<'db> {
	pub(crate) fn new(storage: &'db QuiverGraphStorage, inner: Transaction<'db, Db>) -> Self {
		Self {
			storage,
			inner,
			snapshot: SnapshotWithThreadMode::new(&storage.db),
			write_buf: RefCell::new(Vec::with_capacity(256)),
		}
	}

	#[inline]
	pub fn storage(&self) -> &'db QuiverGraphStorage {
		self.storage
	}

	fn read_opts(&self) -> ReadOptions {
		let mut opts = ReadOptions::default();
		opts.set_snapshot(&self.snapshot);
		opts
	}

	// ---- raw column-family surface -------------------------------------

	/// Non-conflict point read: snapshot plus this transaction's writes.
	pub fn get(&self, cf: Cf, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
		Ok(self
			.inner
			.get_cf_opt(&self.storage.cf(cf), key, &self.read_opts())?)
	}

	/// Point read that marks the key for commit-time conflict detection:
	/// if another transaction commits a write to it first, our commit
	/// fails `Busy`.
	pub fn get_for_update(&self, cf: Cf, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
		Ok(self.inner.get_for_update_cf_opt(
			&self.storage.cf(cf),
			key,
			true,
			&self.read_opts(),
		)?)
	}

	pub fn put(&self, cf: Cf, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
		Ok(self.inner.put_cf(&self.storage.cf(cf), key, value)?)
	}

	pub fn delete(&self, cf: Cf, key: &[u8]) -> Result<(), EngineError> {
		Ok(self.inner.delete_cf(&self.storage.cf(cf), key)?)
	}

	/// Deletes every key in `[lo, hi)` and returns how many were removed.
	///
	/// Transaction DBs cannot use the backend's native range deletion, so
	/// this is a bounded scan plus per-key deletes; the deletes are
	/// transactional and conflict-tracked like any other write.
	pub fn delete_range(&self, cf: Cf, lo: &[u8], hi: &[u8]) -> Result<u64, EngineError> {
		let mut keys = Vec::new();
		for item in self.iterate(cf, Some(lo), Some(hi)) {
			let (key, _) = item?;
			keys.push(key);
		}
		for key in &keys {
			self.delete(cf, key)?;
		}
		Ok(keys.len() as u64)
	}

	/// Ordered scan over `[lo, hi)` in lexicographic byte order; missing
	/// bounds leave that side open. Yielded buffers are owned copies.
	pub fn iterate(&self, cf: Cf, lo: Option<&[u8]>, hi: Option<&[u8]>) -> RangeIter<'_, 'db> {
		let mut opts = self.read_opts();
		opts.set_async_io(true);
		if let Some(lo) = lo {
			opts.set_iterate_lower_bound(lo.to_vec());
		}
		if let Some(hi) = hi {
			opts.set_iterate_upper_bound(hi.to_vec());
		}
		let mut inner = self.inner.raw_iterator_cf_opt(&self.storage.cf(cf), opts);
		inner.seek_to_first();
		RangeIter {
			inner,
			first: true,
			done: false,
		}
	}

	pub fn set_savepoint(&self) {
		self.inner.set_savepoint();
	}

	pub fn rollback_to_savepoint(&self) -> Result<(), EngineError> {
		Ok(self.inner.rollback_to_savepoint()?)
	}

	/// Applies all buffered writes atomically. Fails `Busy` when another
	/// committed transaction wrote a key this one wrote or read for
	/// update; fails `TryAgain` when the backend's conflict-tracking
	/// history is exhausted. Either way the caller rebuilds and retries.
	pub fn commit(self) -> Result<(), EngineError> {
		self.inner.commit().map_err(|err| {
			debug!(error = %err, "transaction commit failed");
			EngineError::from(err)
		})
	}

	/// Discards all buffered writes.
	pub fn rollback(self) -> Result<(), EngineError> {
		Ok(self.inner.rollback()?)
	}

	// ---- graph surface -------------------------------------------------

	/// Non-conflict read returning an owned node, or `None`.
	pub fn get_node(&self, id: &ElementId) -> Result<Option<Node>, EngineError> {
		match self.get(Cf::Node, QuiverGraphStorage::node_key(id))? {
			Some(data) => Ok(Some(Node::from_bytes(*id, &data)?)),
			None => Ok(None),
		}
	}

	/// Non-conflict read returning an owned edge, or `None`.
	pub fn get_edge(&self, id: &ElementId) -> Result<Option<Edge>, EngineError> {
		match self.get(Cf::Edge, QuiverGraphStorage::edge_key(id))? {
			Some(data) => Ok(Some(Edge::from_bytes(*id, &data)?)),
			None => Ok(None),
		}
	}

	/// Serializes and writes a node row. Does not touch the adjacency
	/// index: a node's entries are created by the edges incident to it.
	pub fn put_node(&self, node: &Node) -> Result<(), EngineError> {
		let mut buf = self.write_buf.borrow_mut();
		buf.clear();
		node.encode_into(&mut buf);
		self.put(Cf::Node, QuiverGraphStorage::node_key(&node.id), &buf)
	}

	/// Writes an edge row and, for new edges, both adjacency entries.
	///
	/// Both endpoints are read for update so that edge inserts race
	/// correctly against endpoint deletion and vice versa. Re-putting an
	/// existing edge id must agree with the stored endpoints and direction
	/// (`EdgeDataMismatch` otherwise) and refreshes only the row.
	pub fn put_edge(&self, edge: &Edge) -> Result<(), EngineError> {
		if self
			.get_for_update(Cf::Node, QuiverGraphStorage::node_key(&edge.src))?
			.is_none()
		{
			return Err(StorageError::NotFound.into());
		}
		if self
			.get_for_update(Cf::Node, QuiverGraphStorage::node_key(&edge.dst))?
			.is_none()
		{
			return Err(StorageError::NotFound.into());
		}

		let existing = self.get_for_update(Cf::Edge, QuiverGraphStorage::edge_key(&edge.id))?;
		let is_new = match existing {
			Some(data) => {
				let prior = Edge::from_bytes(edge.id, &data)?;
				if prior.src != edge.src
					|| prior.dst != edge.dst
					|| prior.directed != edge.directed
				{
					return Err(StorageError::EdgeDataMismatch { id: edge.id }.into());
				}
				false
			}
			None => true,
		};

		{
			let mut buf = self.write_buf.borrow_mut();
			buf.clear();
			edge.encode_into(&mut buf);
			self.put(Cf::Edge, QuiverGraphStorage::edge_key(&edge.id), &buf)?;
		}

		if is_new {
			let inout = if edge.directed { Inout::Out } else { Inout::Simple };
			self.put(
				Cf::Adj,
				&QuiverGraphStorage::adj_key(&edge.src, inout, &edge.id),
				edge.dst.as_bytes(),
			)?;
			self.put(
				Cf::Adj,
				&QuiverGraphStorage::adj_key(&edge.dst, inout.inverse(), &edge.id),
				edge.src.as_bytes(),
			)?;
		}
		Ok(())
	}

	/// Deletes an edge row and both of its adjacency entries. Fails
	/// `NotFound` if the edge does not exist in this snapshot.
	pub fn delete_edge(&self, id: &ElementId) -> Result<(), EngineError> {
		let data = self
			.get_for_update(Cf::Edge, QuiverGraphStorage::edge_key(id))?
			.ok_or(StorageError::NotFound)?;
		let edge = Edge::from_bytes(*id, &data)?;

		self.delete(Cf::Edge, QuiverGraphStorage::edge_key(id))?;
		let inout = if edge.directed { Inout::Out } else { Inout::Simple };
		self.delete(Cf::Adj, &QuiverGraphStorage::adj_key(&edge.src, inout, id))?;
		self.delete(
			Cf::Adj,
			&QuiverGraphStorage::adj_key(&edge.dst, inout.inverse(), id),
		)?;
		Ok(())
	}

	/// Deletes a node row and every incident adjacency entry together with
	/// its reverse. Fails `NotFound` if the node does not exist.
	///
	/// Incident edge rows are NOT removed: callers that want cascade
	/// semantics issue `delete_edge` for each incident edge first, and
	/// dangling edge rows are tolerated until explicitly deleted or
	/// overwritten.
	pub fn delete_node(&self, id: &ElementId) -> Result<(), EngineError> {
		if self
			.get_for_update(Cf::Node, QuiverGraphStorage::node_key(id))?
			.is_none()
		{
			return Err(StorageError::NotFound.into());
		}

		// Collect before deleting; removing keys under an open scan would
		// shift its view.
		let mut entries = Vec::new();
		for entry in self.iterate_adj(id, Inout::Out, Inout::In) {
			entries.push(entry?);
		}
		for entry in entries {
			self.delete(
				Cf::Adj,
				&QuiverGraphStorage::adj_key(&entry.src, entry.inout, &entry.edge),
			)?;
			let rev = entry.reverse();
			self.delete(
				Cf::Adj,
				&QuiverGraphStorage::adj_key(&rev.src, rev.inout, &rev.edge),
			)?;
		}

		self.delete(Cf::Node, QuiverGraphStorage::node_key(id))
	}

	/// Non-conflicting prefix scan over one node's `[min_inout, max_inout]`
	/// adjacency slice, in `(inout, edge)` order.
	pub fn iterate_adj(
		&self,
		node: &ElementId,
		min_inout: Inout,
		max_inout: Inout,
	) -> AdjIter<'_, 'db> {
		let (lower, upper) = QuiverGraphStorage::adj_bounds(node, min_inout, max_inout);
		let mut opts = self.read_opts();
		opts.set_async_io(true);
		opts.set_iterate_lower_bound(lower.to_vec());
		opts.set_iterate_upper_bound(upper.to_vec());
		let mut inner = self
			.inner
			.raw_iterator_cf_opt(&self.storage.cf(Cf::Adj), opts);
		inner.seek_to_first();
		AdjIter {
			inner,
			first: true,
			done: false,
		}
	}

	/// Full scan over all nodes in element-id order.
	pub fn iterate_nodes(&self) -> NodeIter<'_, 'db> {
		let mut opts = self.read_opts();
		opts.set_async_io(true);
		let mut inner = self
			.inner
			.raw_iterator_cf_opt(&self.storage.cf(Cf::Node), opts);
		inner.seek_to_first();
		NodeIter {
			inner,
			first: true,
			done: false,
		}
	}

	/// Full scan over all edges in element-id order.
	pub fn iterate_edges(&self) -> EdgeIter<'_, 'db> {
		let mut opts = self.read_opts();
		opts.set_async_io(true);
		let mut inner = self
			.inner
			.raw_iterator_cf_opt(&self.storage.cf(Cf::Edge), opts);
		inner.seek_to_first();
		EdgeIter {
			inner,
			first: true,
			done: false,
		}
	}
}

/// Advances a raw iterator one step (skipping the advance on the first
/// call, where the constructor already positioned it) and reports whether
/// it still points at an entry. Errors are surfaced once, then the
/// iterator fuses.
macro_rules! raw_advance {
	($self:ident) => {{
		if $self.done {
			return None;
		}
		if $self.first {
			$self.first = false;
		} else {
			$self.inner.next();
		}
		if !$self.inner.valid() {
			$self.done = true;
			return match $self.inner.status() {
				Ok(()) => None,
				Err(err) => Some(Err(EngineError::from(err))),
			};
		}
	}};
}

/// Generic `[lo, hi)` scan yielding owned `(key, value)` pairs.
pub struct RangeIter<'txn, 'db> {
	inner: RawIter<'txn, 'db>,
	first: bool,
	done: bool,
}

impl Iterator for RangeIter<'_, '_> {
	type Item = Result<(Vec<u8>, Vec<u8>), EngineError>;

	fn next(&mut self) -> Option<Self::Item> {
		raw_advance!(self);
		let key = self.inner.key().expect("valid iterator has a key").to_vec();
		let value = self
			.inner
			.value()
			.expect("valid iterator has a value")
			.to_vec();
		Some(Ok((key, value)))
	}
}

/// Adjacency slice scan yielding decoded [`AdjEntry`] records.
pub struct AdjIter<'txn, 'db> {
	inner: RawIter<'txn, 'db>,
	first: bool,
	done: bool,
}

impl Iterator for AdjIter<'_, '_> {
	type Item = Result<AdjEntry, EngineError>;

	fn next(&mut self) -> Option<Self::Item> {
		raw_advance!(self);
		let decoded = (|| {
			let key = self.inner.key().expect("valid iterator has a key");
			let value = self.inner.value().expect("valid iterator has a value");
			let (src, inout, edge) = QuiverGraphStorage::unpack_adj_key(key)?;
			let dst = QuiverGraphStorage::unpack_adj_value(value)?;
			Ok(AdjEntry {
				src,
				inout,
				edge,
				dst,
			})
		})();
		if decoded.is_err() {
			self.done = true;
		}
		Some(decoded)
	}
}

/// Full node scan yielding `(id, node)` in element-id order.
pub struct NodeIter<'txn, 'db> {
	inner: RawIter<'txn, 'db>,
	first: bool,
	done: bool,
}

impl Iterator for NodeIter<'_, '_> {
	type Item = Result<(ElementId, Node), EngineError>;

	fn next(&mut self) -> Option<Self::Item> {
		raw_advance!(self);
		let key = self.inner.key().expect("valid iterator has a key");
		let Some(id) = ElementId::from_slice(key).filter(|_| key.len() == ELEMENT_ID_LEN) else {
			self.done = true;
			return Some(Err(StorageError::Corruption(format!(
				"node key has length {}, expected {ELEMENT_ID_LEN}",
				key.len()
			))
			.into()));
		};
		let value = self.inner.value().expect("valid iterator has a value");
		match Node::from_bytes(id, value) {
			Ok(node) => Some(Ok((id, node))),
			Err(err) => {
				warn!(?err, node_id = %id, "error decoding node");
				self.done = true;
				Some(Err(err.into()))
			}
		}
	}
}

/// Full edge scan yielding `(id, edge)` in element-id order.
pub struct EdgeIter<'txn, 'db> {
	inner: RawIter<'txn, 'db>,
	first: bool,
	done: bool,
}

impl Iterator for EdgeIter<'_, '_> {
	type Item = Result<(ElementId, Edge), EngineError>;

	fn next(&mut self) -> Option<Self::Item> {
		raw_advance!(self);
		let key = self.inner.key().expect("valid iterator has a key");
		let Some(id) = ElementId::from_slice(key).filter(|_| key.len() == ELEMENT_ID_LEN) else {
			self.done = true;
			return Some(Err(StorageError::Corruption(format!(
				"edge key has length {}, expected {ELEMENT_ID_LEN}",
				key.len()
			))
			.into()));
		};
		let value = self.inner.value().expect("valid iterator has a value");
		match Edge::from_bytes(id, value) {
			Ok(edge) => Some(Ok((id, edge))),
			Err(err) => {
				warn!(?err, edge_id = %id, "error decoding edge");
				self.done = true;
				Some(Err(err.into()))
			}
		}
	}
}
