//! Per-operator execution state.
//!
//! Each operator's state has an operator-specific shape, so the slot is a
//! tagged variant parallel to the operator tag; the dispatching pull
//! matches on the operator and mutates the matching variant. No dynamic
//! dispatch is involved.

use crate::graph_engine::plan_core::Operator;
use crate::graph_engine::storage_core::{AdjIter, EdgeIter, NodeIter};

/// Which side a `Join` pulls from next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinSide {
	Left,
	Right,
}

/// `Step` scan phases. `LeftOrRight` runs two non-contiguous scans, so it
/// passes through `OutBeforeIn` before the final `Iterating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepPhase {
	Init,
	Iterating,
	OutBeforeIn,
}

pub(crate) struct StepState<'txn, 'db> {
	pub iter: Option<AdjIter<'txn, 'db>>,
	pub phase: StepPhase,
}

pub(crate) enum OpState<'txn, 'db> {
	None,
	NodeScan(Option<NodeIter<'txn, 'db>>),
	EdgeScan(Option<EdgeIter<'txn, 'db>>),
	Step(StepState<'txn, 'db>),
	/// Rows emitted so far.
	Limit(u64),
	/// Begin: row already emitted. Skip: prefix already drained.
	/// Anti: row already emitted. UnionAll: subquery already drained.
	Flag(bool),
	Join(JoinSide),
}

impl<'txn, 'db> OpState<'txn, 'db> {
	/// Fresh state for an operator; used at construction and by
	/// `reset_state_range` before each right-side pass of a join-like
	/// operator.
	pub fn for_op(op: &Operator) -> OpState<'txn, 'db> {
		match op {
			Operator::NodeScan { .. } => OpState::NodeScan(None),
			Operator::EdgeScan { .. } => OpState::EdgeScan(None),
			Operator::Step(_) => OpState::Step(StepState {
				iter: None,
				phase: StepPhase::Init,
			}),
			Operator::Limit { .. } => OpState::Limit(0),
			Operator::Begin | Operator::Skip { .. } | Operator::Anti | Operator::UnionAll => {
				OpState::Flag(false)
			}
			Operator::Join => OpState::Join(JoinSide::Left),
			Operator::NodeById { .. }
			| Operator::EdgeById { .. }
			| Operator::Argument { .. }
			| Operator::SemiJoin
			| Operator::Project { .. }
			| Operator::Filter { .. }
			| Operator::EmptyResult
			| Operator::InsertNode(_)
			| Operator::InsertEdge(_) => OpState::None,
		}
	}
}
