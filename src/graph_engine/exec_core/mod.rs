//! # Executor Core
//!
//! ## Purpose
//! Pull-based streaming execution of query plans: one flat assignment row,
//! one state slot per operator, rows produced strictly on demand.
//!
//! ## Mental model
//! The single primitive is `pull(end_index)`: advance the plan prefix up
//! to but not including `end_index` by one row. `end_index == 0` is the
//! implicit root row (true once); otherwise the operator at
//! `end_index - 1` runs, itself pulling from its own prefix — or from its
//! `Begin`-delimited subquery for join-like operators. `run()` pulls the
//! whole plan and snapshots the result identifiers into a fresh row.
//!
//! ## Key types
//! | Type | Description |
//! | --- | --- |
//! | `Executor` | Owns assignments, state slots, and the pull budget. |
//! | `OpState` | Tagged per-operator state variant (see `state`). |
//! | `Row` | One output row: the values of the plan's result identifiers. |
//!
//! ## Invariants
//! - Streaming: no operator buffers more than a constant number of rows;
//!   peak memory beyond stored state is the assignment row plus operator
//!   state.
//!   - Enforced in: every operator runner (single-row pulls, no
//!     collection).
//!   - Tested by: `exec_core_tests::test_two_step_traversal` and the
//!     join tests, which stream over graphs without materializing.
//!   - Failure symptom: memory grows with result cardinality.
//! - Determinism: for a given snapshot and plan, repeated runs produce
//!   the same rows in the same order (key order of the underlying scans).
//!   - Tested by: `exec_core_tests::test_rerun_is_deterministic`.
//!
//! ## Concurrency & ordering
//! - One executor is strictly single-threaded and bound to one
//!   transaction; queries parallelize by running executors over
//!   independent transactions.
//! - Cancellation is cooperative at row boundaries: stop pulling, or let
//!   the per-pull budget abort a runaway traversal.
//!
//! ## Failure modes & recovery
//! - Operator errors propagate out of `pull` with partial state intact;
//!   dropping the executor releases all iterators and values.

pub mod state;


use std::mem;

use indexmap::IndexMap;
use tracing::trace;

use crate::graph_engine::plan_core::expr::Params;
use crate::graph_engine::plan_core::{
	FilterClause, InsertEdgeSpec, InsertNodeSpec, Operator, Plan, ProjectClause, Step, StepDir,
};
use crate::graph_engine::storage_core::GraphTxn;
use crate::graph_engine::storage_core::txn::{EdgeIter, NodeIter};
use crate::graph_engine::types::{EngineError, ExecError, StorageError};
use crate::protocol::value::Value;
use crate::utils::id::ElementId;
use crate::utils::items::{Edge, Inout, Node};

use self::state::{JoinSide, OpState, StepPhase, StepState};

/// One result row: the values of the plan's result identifiers, in order.
pub type Row = Vec<Value>;

/// Streaming plan executor bound to a single transaction.
///
/// Pull `run()` (or iterate) to exhaustion; commit or roll back the
/// transaction afterwards at the caller's direction.
pub struct Executor<'p, 'txn, 'db>
where
	'db: 'txn,
{
	plan: &'p Plan,
	txn: &'txn GraphTxn<'db>,
	params: Params,
	assignments: Vec<Value>,
	states: Vec<OpState<'txn, 'db>>,
	root_pulled: bool,
	pulls: u64,
	max_pulls: Option<u64>,
}

impl<'p, 'txn, 'db> Executor<'p, 'txn, 'db> {
	pub fn new(plan: &'p Plan, txn: &'txn GraphTxn<'db>) -> Self {
		Self {
			plan,
			txn,
			params: Params::new(),
			assignments: vec![Value::Empty; plan.width()],
			states: plan.ops().iter().map(OpState::for_op).collect(),
			root_pulled: false,
			pulls: 0,
			max_pulls: txn.storage().config().max_pulls,
		}
	}

	pub fn with_params(mut self, params: Params) -> Self {
		self.params = params;
		self
	}

	/// Overrides the configured per-query pull budget; `None` removes it.
	pub fn with_pull_budget(mut self, max_pulls: Option<u64>) -> Self {
		self.max_pulls = max_pulls;
		self
	}

	/// Produces the next result row, or `None` when the plan is
	/// exhausted.
	pub fn run(&mut self) -> Result<Option<Row>, EngineError> {
		if !self.pull(self.plan.len())? {
			return Ok(None);
		}
		let row = self
			.plan
			.returns()
			.iter()
			.map(|&ident| self.assignments[ident].clone())
			.collect();
		Ok(Some(row))
	}

	/// Advances the plan prefix `[0, end)` by one row. Returns whether a
	/// row was produced; assignments written by the prefix are current
	/// exactly when it returns true.
	fn pull(&mut self, end: usize) -> Result<bool, EngineError> {
		self.charge_pull()?;
		if end == 0 {
			if self.root_pulled {
				return Ok(false);
			}
			self.root_pulled = true;
			return Ok(true);
		}
		let i = end - 1;
		let plan = self.plan;
		match &plan.ops()[i] {
			Operator::NodeScan { ident, label } => self.node_scan(i, *ident, label.as_deref()),
			Operator::EdgeScan { ident, label } => self.edge_scan(i, *ident, label.as_deref()),
			Operator::NodeById { ident, id_ident } => self.node_by_id(i, *ident, *id_ident),
			Operator::EdgeById { ident, id_ident } => self.edge_by_id(i, *ident, *id_ident),
			Operator::Step(step) => self.step(i, step),
			Operator::Begin => self.begin(i),
			Operator::Argument { .. } => self.pull(i),
			Operator::Join => self.join(i),
			Operator::SemiJoin => self.semi_join(i),
			Operator::Anti => self.anti(i),
			Operator::UnionAll => self.union_all(i),
			Operator::Project { clauses } => self.project(i, clauses),
			Operator::Filter { clauses } => self.filter(i, clauses),
			Operator::Limit { count } => self.limit(i, *count),
			Operator::Skip { count } => self.skip(i, *count),
			Operator::EmptyResult => self.empty_result(i),
			Operator::InsertNode(spec) => self.insert_node(i, spec),
			Operator::InsertEdge(spec) => self.insert_edge(i, spec),
		}
	}

	fn charge_pull(&mut self) -> Result<(), EngineError> {
		self.pulls += 1;
		if let Some(limit) = self.max_pulls
			&& self.pulls > limit
		{
			trace!(limit, "pull budget exhausted");
			return Err(ExecError::PullBudgetExhausted { limit }.into());
		}
		Ok(())
	}

	/// Reinitializes the state slots in `[start, end)`; run before each
	/// right-side pass of a join-like operator.
	fn reset_state_range(&mut self, start: usize, end: usize) {
		let plan = self.plan;
		for k in start..end {
			self.states[k] = OpState::for_op(&plan.ops()[k]);
		}
	}

	fn flag(&mut self, i: usize) -> &mut bool {
		match &mut self.states[i] {
			OpState::Flag(flag) => flag,
			_ => unreachable!("state slot mismatch"),
		}
	}

	// ---- sources -------------------------------------------------------

	fn node_scan(
		&mut self,
		i: usize,
		ident: usize,
		label: Option<&str>,
	) -> Result<bool, EngineError> {
		let OpState::NodeScan(mut slot) = mem::replace(&mut self.states[i], OpState::None)
		else {
			unreachable!("state slot mismatch");
		};
		let result = self.node_scan_pull(i, ident, label, &mut slot);
		self.states[i] = OpState::NodeScan(slot);
		result
	}

	fn node_scan_pull(
		&mut self,
		i: usize,
		ident: usize,
		label: Option<&str>,
		slot: &mut Option<NodeIter<'txn, 'db>>,
	) -> Result<bool, EngineError> {
		if slot.is_none() {
			if !self.pull(i)? {
				return Ok(false);
			}
			*slot = Some(self.txn.iterate_nodes());
		}
		let iter = slot.as_mut().expect("scan opened above");
		for item in iter {
			let (id, node) = item?;
			if let Some(label) = label
				&& !node.has_label(label)
			{
				continue;
			}
			self.assignments[ident] = Value::NodeRef(id);
			return Ok(true);
		}
		Ok(false)
	}

	fn edge_scan(
		&mut self,
		i: usize,
		ident: usize,
		label: Option<&str>,
	) -> Result<bool, EngineError> {
		let OpState::EdgeScan(mut slot) = mem::replace(&mut self.states[i], OpState::None)
		else {
			unreachable!("state slot mismatch");
		};
		let result = self.edge_scan_pull(i, ident, label, &mut slot);
		self.states[i] = OpState::EdgeScan(slot);
		result
	}

	fn edge_scan_pull(
		&mut self,
		i: usize,
		ident: usize,
		label: Option<&str>,
		slot: &mut Option<EdgeIter<'txn, 'db>>,
	) -> Result<bool, EngineError> {
		if slot.is_none() {
			if !self.pull(i)? {
				return Ok(false);
			}
			*slot = Some(self.txn.iterate_edges());
		}
		let iter = slot.as_mut().expect("scan opened above");
		for item in iter {
			let (id, edge) = item?;
			if let Some(label) = label
				&& !edge.has_label(label)
			{
				continue;
			}
			self.assignments[ident] = Value::EdgeRef(id);
			return Ok(true);
		}
		Ok(false)
	}

	fn node_by_id(&mut self, i: usize, ident: usize, id_ident: usize) -> Result<bool, EngineError> {
		loop {
			if !self.pull(i)? {
				return Ok(false);
			}
			// a non-id value or a missing node drops the row
			let Some(id) = self.assignments[id_ident].as_id() else {
				continue;
			};
			if self.txn.get_node(&id)?.is_none() {
				continue;
			}
			self.assignments[ident] = Value::NodeRef(id);
			return Ok(true);
		}
	}

	fn edge_by_id(&mut self, i: usize, ident: usize, id_ident: usize) -> Result<bool, EngineError> {
		loop {
			if !self.pull(i)? {
				return Ok(false);
			}
			let Some(id) = self.assignments[id_ident].as_id() else {
				continue;
			};
			if self.txn.get_edge(&id)?.is_none() {
				continue;
			}
			self.assignments[ident] = Value::EdgeRef(id);
			return Ok(true);
		}
	}

	// ---- traversal -----------------------------------------------------

	fn step(&mut self, i: usize, step: &Step) -> Result<bool, EngineError> {
		let OpState::Step(mut st) = mem::replace(&mut self.states[i], OpState::None) else {
			unreachable!("state slot mismatch");
		};
		let result = self.step_pull(i, step, &mut st);
		self.states[i] = OpState::Step(st);
		result
	}

	fn step_pull(
		&mut self,
		i: usize,
		step: &Step,
		st: &mut StepState<'txn, 'db>,
	) -> Result<bool, EngineError> {
		loop {
			if st.iter.is_none() {
				if !self.pull(i)? {
					return Ok(false);
				}
				let Some(src) = self.assignments[step.src].as_node_ref() else {
					// type mismatch: no match for this pull
					return Ok(false);
				};
				let (min_inout, max_inout, phase) = match step.dir {
					StepDir::Left => (Inout::In, Inout::In, StepPhase::Iterating),
					StepDir::Right => (Inout::Out, Inout::Out, StepPhase::Iterating),
					StepDir::Undirected => (Inout::Simple, Inout::Simple, StepPhase::Iterating),
					StepDir::LeftOrUndirected => (Inout::Simple, Inout::In, StepPhase::Iterating),
					StepDir::RightOrUndirected => (Inout::Out, Inout::Simple, StepPhase::Iterating),
					StepDir::Any => (Inout::Out, Inout::In, StepPhase::Iterating),
					// out and in are not contiguous without simple; two scans
					StepDir::LeftOrRight => (Inout::Out, Inout::Out, StepPhase::OutBeforeIn),
				};
				st.iter = Some(self.txn.iterate_adj(&src, min_inout, max_inout));
				st.phase = phase;
			}

			let iter = st.iter.as_mut().expect("scan opened above");
			for item in iter {
				let entry = item?;
				if let Some(edge_label) = step.edge_label.as_deref() {
					let edge = self.txn.get_edge(&entry.edge)?.ok_or_else(|| {
						StorageError::CorruptedIndex(format!(
							"adjacency entry references missing edge {}",
							entry.edge
						))
					})?;
					if !edge.has_label(edge_label) {
						continue;
					}
				}
				if let Some(edge_ident) = step.edge {
					self.assignments[edge_ident] = Value::EdgeRef(entry.edge);
				}
				if let Some(dst_ident) = step.dst {
					self.assignments[dst_ident] = Value::NodeRef(entry.dst);
				}
				return Ok(true);
			}

			match st.phase {
				StepPhase::OutBeforeIn => {
					let Some(src) = self.assignments[step.src].as_node_ref() else {
						return Ok(false);
					};
					st.iter = Some(self.txn.iterate_adj(&src, Inout::In, Inout::In));
					st.phase = StepPhase::Iterating;
				}
				_ => {
					st.iter = None;
					st.phase = StepPhase::Init;
				}
			}
		}
	}

	// ---- composition ---------------------------------------------------

	fn begin(&mut self, i: usize) -> Result<bool, EngineError> {
		let emitted = self.flag(i);
		if *emitted {
			return Ok(false);
		}
		*emitted = true;
		Ok(true)
	}

	fn join(&mut self, i: usize) -> Result<bool, EngineError> {
		let begin = self.plan.subquery_begin(i);
		loop {
			let side = match &self.states[i] {
				OpState::Join(side) => *side,
				_ => unreachable!("state slot mismatch"),
			};
			match side {
				JoinSide::Left => {
					if !self.pull(begin)? {
						return Ok(false);
					}
					self.reset_state_range(begin, i);
					self.states[i] = OpState::Join(JoinSide::Right);
				}
				JoinSide::Right => {
					if self.pull(i)? {
						return Ok(true);
					}
					self.states[i] = OpState::Join(JoinSide::Left);
				}
			}
		}
	}

	fn semi_join(&mut self, i: usize) -> Result<bool, EngineError> {
		let begin = self.plan.subquery_begin(i);
		loop {
			if !self.pull(begin)? {
				return Ok(false);
			}
			self.reset_state_range(begin, i);
			if self.pull(i)? {
				return Ok(true);
			}
		}
	}

	fn anti(&mut self, i: usize) -> Result<bool, EngineError> {
		if *self.flag(i) {
			return Ok(false);
		}
		*self.flag(i) = true;
		Ok(!self.pull(i)?)
	}

	fn union_all(&mut self, i: usize) -> Result<bool, EngineError> {
		if !*self.flag(i) {
			if self.pull(i)? {
				return Ok(true);
			}
			*self.flag(i) = true;
		}
		let begin = self.plan.subquery_begin(i);
		self.pull(begin)
	}

	// ---- row shaping ---------------------------------------------------

	fn project(&mut self, i: usize, clauses: &[ProjectClause]) -> Result<bool, EngineError> {
		if !self.pull(i)? {
			return Ok(false);
		}
		// clause order matters: later clauses observe earlier outputs
		for clause in clauses {
			let value = clause.expr.eval(&self.assignments, &self.params)?;
			self.assignments[clause.ident] = value;
		}
		Ok(true)
	}

	fn filter(&mut self, i: usize, clauses: &[FilterClause]) -> Result<bool, EngineError> {
		let txn = self.txn;
		'rows: loop {
			if !self.pull(i)? {
				return Ok(false);
			}
			for clause in clauses {
				match clause {
					FilterClause::BoolExpr(expr) => {
						if !expr.eval(&self.assignments, &self.params)?.is_truthy() {
							continue 'rows;
						}
					}
					FilterClause::IdentLabel { ident, label } => {
						let passes = match &self.assignments[*ident] {
							Value::NodeRef(id) => {
								txn.get_node(id)?.is_some_and(|n| n.has_label(label))
							}
							Value::EdgeRef(id) => {
								txn.get_edge(id)?.is_some_and(|e| e.has_label(label))
							}
							other => {
								return Err(ExecError::WrongType {
									expected: "node or edge reference",
									got: other.kind(),
								}
								.into());
							}
						};
						if !passes {
							continue 'rows;
						}
					}
				}
			}
			return Ok(true);
		}
	}

	fn limit(&mut self, i: usize, count: u64) -> Result<bool, EngineError> {
		let emitted = match &self.states[i] {
			OpState::Limit(emitted) => *emitted,
			_ => unreachable!("state slot mismatch"),
		};
		if emitted >= count {
			return Ok(false);
		}
		if !self.pull(i)? {
			return Ok(false);
		}
		self.states[i] = OpState::Limit(emitted + 1);
		Ok(true)
	}

	fn skip(&mut self, i: usize, count: u64) -> Result<bool, EngineError> {
		if !*self.flag(i) {
			*self.flag(i) = true;
			for _ in 0..count {
				if !self.pull(i)? {
					return Ok(false);
				}
			}
		}
		self.pull(i)
	}

	fn empty_result(&mut self, i: usize) -> Result<bool, EngineError> {
		while self.pull(i)? {}
		Ok(false)
	}

	// ---- mutation ------------------------------------------------------

	fn insert_node(&mut self, i: usize, spec: &InsertNodeSpec) -> Result<bool, EngineError> {
		if !self.pull(i)? {
			return Ok(false);
		}
		let mut properties = IndexMap::with_capacity(spec.properties.len());
		for (key, expr) in &spec.properties {
			let value = expr.eval(&self.assignments, &self.params)?;
			properties.insert(key.clone(), value);
		}
		let node = Node::new(ElementId::random(), spec.labels.clone(), properties);
		self.txn.put_node(&node)?;
		trace!(node_id = %node.id, "inserted node");
		if let Some(ident) = spec.ident {
			self.assignments[ident] = Value::NodeRef(node.id);
		}
		Ok(true)
	}

	fn insert_edge(&mut self, i: usize, spec: &InsertEdgeSpec) -> Result<bool, EngineError> {
		if !self.pull(i)? {
			return Ok(false);
		}
		let src = match &self.assignments[spec.src] {
			Value::NodeRef(id) => *id,
			other => {
				return Err(ExecError::WrongType {
					expected: "node reference",
					got: other.kind(),
				}
				.into());
			}
		};
		let dst = match &self.assignments[spec.dst] {
			Value::NodeRef(id) => *id,
			other => {
				return Err(ExecError::WrongType {
					expected: "node reference",
					got: other.kind(),
				}
				.into());
			}
		};
		let mut properties = IndexMap::with_capacity(spec.properties.len());
		for (key, expr) in &spec.properties {
			let value = expr.eval(&self.assignments, &self.params)?;
			properties.insert(key.clone(), value);
		}
		let edge = Edge::new(
			ElementId::random(),
			src,
			dst,
			spec.directed,
			spec.labels.clone(),
			properties,
		);
		self.txn.put_edge(&edge)?;
		trace!(edge_id = %edge.id, "inserted edge");
		if let Some(ident) = spec.ident {
			self.assignments[ident] = Value::EdgeRef(edge.id);
		}
		Ok(true)
	}
}

impl Iterator for Executor<'_, '_, '_> {
	type Item = Result<Row, EngineError>;

	fn next(&mut self) -> Option<Self::Item> {
		self.run().transpose()
	}
}
