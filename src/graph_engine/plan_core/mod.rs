//! # Plan Core
//!
//! ## Purpose
//! Data model for query plans: a post-order sequence of streaming
//! operators plus the list of assignment indices a query returns.
//!
//! ## Mental model
//! A plan is a flat encoding of an operator tree: every operator's inputs
//! precede it in the sequence, and the right-hand subquery of a join-like
//! operator is delimited by a `Begin` marker at the same nesting depth.
//! Identifiers are non-negative integers indexing the executor's flat
//! assignment row; the plan width is one plus the largest identifier
//! referenced anywhere.
//!
//! ## Key types
//! | Type | Description |
//! | --- | --- |
//! | `Plan` | Validated operator sequence with cached subquery starts. |
//! | `Operator` | One streaming operator (scan, step, join, filter, ...). |
//! | `StepDir` | The seven traversal direction selectors. |
//!
//! ## Invariants
//! - Every join-like operator has a matching `Begin`, and every `Begin`
//!   belongs to exactly one join-like operator.
//!   - Enforced in: `Plan::new` (rejected as `MalformedPlan`).
//!   - Tested by: `tests::test_nested_subquery_begins`,
//!     `tests::test_unmatched_join_is_rejected`.
//!   - Failure symptom: the executor would pull across subquery
//!     boundaries and emit rows from the wrong branch.
//!
//! Planned vocabulary not dispatched by this executor: `Repeat`,
//! `ShortestPath`, `Distinct`, `Sort`, `Top`, `GroupAggregate`,
//! `Aggregate`, `Update`, `Delete`, `ProjectEndpoints`, `StepBetween`.

pub mod expr;

use itertools::Itertools;

use crate::graph_engine::plan_core::expr::Expr;
use crate::graph_engine::types::{EngineError, PlanError};

/// Direction selector for [`Operator::Step`], relative to the source node
/// of the pattern: `Right` follows edges outward, `Left` inward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDir {
	Left,
	Right,
	Undirected,
	LeftOrUndirected,
	RightOrUndirected,
	LeftOrRight,
	Any,
}

/// Adjacency walk: reads a source node ref, emits one row per matching
/// incident edge with optional edge/destination outputs.
#[derive(Debug, Clone)]
pub struct Step {
	pub src: usize,
	pub edge: Option<usize>,
	pub dst: Option<usize>,
	pub dir: StepDir,
	pub edge_label: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FilterClause {
	/// Keep the row when the expression evaluates truthy.
	BoolExpr(Expr),
	/// Keep the row when the referenced node/edge carries the label. A
	/// non-reference value in the slot is a hard type error.
	IdentLabel { ident: usize, label: String },
}

#[derive(Debug, Clone)]
pub struct ProjectClause {
	pub ident: usize,
	pub expr: Expr,
}

#[derive(Debug, Clone)]
pub struct InsertNodeSpec {
	pub ident: Option<usize>,
	pub labels: Vec<String>,
	pub properties: Vec<(String, Expr)>,
}

#[derive(Debug, Clone)]
pub struct InsertEdgeSpec {
	pub ident: Option<usize>,
	pub src: usize,
	pub dst: usize,
	pub directed: bool,
	pub labels: Vec<String>,
	pub properties: Vec<(String, Expr)>,
}

#[derive(Debug, Clone)]
pub enum Operator {
	/// Every node in the graph, optionally filtered by label.
	NodeScan { ident: usize, label: Option<String> },
	/// Every edge in the graph, optionally filtered by label.
	EdgeScan { ident: usize, label: Option<String> },
	/// Reads an `id` value, verifies the node exists, publishes a ref.
	NodeById { ident: usize, id_ident: usize },
	/// Reads an `id` value, verifies the edge exists, publishes a ref.
	EdgeById { ident: usize, id_ident: usize },
	Step(Step),
	/// Subquery delimiter: emits one row per reset, then exhausts.
	Begin,
	/// Pass-through declaring that `ident` is provided from outside.
	Argument { ident: usize },
	/// Cartesian product; the subquery re-evaluates per left row.
	Join,
	/// Left rows for which the subquery yields at least one row.
	SemiJoin,
	/// Exactly one row iff the child yields zero rows.
	Anti,
	/// All subquery rows, then all rows of the prefix before `Begin`.
	UnionAll,
	/// Evaluates clauses in order into their target identifiers.
	Project { clauses: Vec<ProjectClause> },
	/// Keeps rows satisfying every clause.
	Filter { clauses: Vec<FilterClause> },
	Limit { count: u64 },
	Skip { count: u64 },
	/// Drains its child and emits nothing.
	EmptyResult,
	InsertNode(InsertNodeSpec),
	InsertEdge(InsertEdgeSpec),
}

impl Operator {
	/// Join-like operators own a `Begin`-delimited subquery.
	#[inline]
	pub fn has_subquery(&self) -> bool {
		matches!(self, Operator::Join | Operator::SemiJoin | Operator::UnionAll)
	}

	fn for_each_ident(&self, f: &mut impl FnMut(usize)) {
		match self {
			Operator::NodeScan { ident, .. } | Operator::EdgeScan { ident, .. } => f(*ident),
			Operator::NodeById { ident, id_ident }
			| Operator::EdgeById { ident, id_ident } => {
				f(*ident);
				f(*id_ident);
			}
			Operator::Step(step) => {
				f(step.src);
				if let Some(edge) = step.edge {
					f(edge);
				}
				if let Some(dst) = step.dst {
					f(dst);
				}
			}
			Operator::Argument { ident } => f(*ident),
			Operator::Project { clauses } => {
				for clause in clauses {
					f(clause.ident);
					clause.expr.for_each_ident(f);
				}
			}
			Operator::Filter { clauses } => {
				for clause in clauses {
					match clause {
						FilterClause::BoolExpr(expr) => expr.for_each_ident(f),
						FilterClause::IdentLabel { ident, .. } => f(*ident),
					}
				}
			}
			Operator::InsertNode(spec) => {
				if let Some(ident) = spec.ident {
					f(ident);
				}
				for (_, expr) in &spec.properties {
					expr.for_each_ident(f);
				}
			}
			Operator::InsertEdge(spec) => {
				if let Some(ident) = spec.ident {
					f(ident);
				}
				f(spec.src);
				f(spec.dst);
				for (_, expr) in &spec.properties {
					expr.for_each_ident(f);
				}
			}
			Operator::Begin
			| Operator::Join
			| Operator::SemiJoin
			| Operator::Anti
			| Operator::UnionAll
			| Operator::Limit { .. }
			| Operator::Skip { .. }
			| Operator::EmptyResult => {}
		}
	}
}

/// A validated query plan.
#[derive(Debug, Clone)]
pub struct Plan {
	ops: Vec<Operator>,
	returns: Vec<usize>,
	width: usize,
	/// Per-operator index of the matching `Begin`, for join-like operators.
	begins: Vec<Option<usize>>,
}

impl Plan {
	/// Validates the post-order sequence, derives the assignment width,
	/// and caches each join-like operator's matching `Begin` index.
	pub fn new(ops: Vec<Operator>, returns: Vec<usize>) -> Result<Plan, EngineError> {
		if ops.is_empty() {
			return Err(PlanError::Empty.into());
		}

		let mut width = 0usize;
		{
			let mut widen = |ident: usize| width = width.max(ident + 1);
			for op in &ops {
				op.for_each_ident(&mut widen);
			}
			for &ident in &returns {
				widen(ident);
			}
		}

		let mut begins = vec![None; ops.len()];
		let mut owned = vec![false; ops.len()];
		for (j, op) in ops.iter().enumerate() {
			if !op.has_subquery() {
				continue;
			}
			begins[j] = Some(Self::find_begin(&ops, j)?);
			owned[begins[j].unwrap()] = true;
		}
		if let Some(j) = ops
			.iter()
			.positions(|op| matches!(op, Operator::Begin))
			.find(|&j| !owned[j])
		{
			return Err(PlanError::DanglingBegin { op_index: j }.into());
		}

		Ok(Plan {
			ops,
			returns,
			width,
			begins,
		})
	}

	/// Walks from the operator toward the front of the sequence, skipping
	/// complete inner subqueries, until the `Begin` at the same nesting
	/// depth.
	fn find_begin(ops: &[Operator], op_index: usize) -> Result<usize, EngineError> {
		let mut depth = 0usize;
		for i in (0..op_index).rev() {
			match &ops[i] {
				Operator::Begin if depth == 0 => return Ok(i),
				Operator::Begin => depth -= 1,
				op if op.has_subquery() => depth += 1,
				_ => {}
			}
		}
		Err(PlanError::UnmatchedSubquery { op_index }.into())
	}

	#[inline]
	pub fn ops(&self) -> &[Operator] {
		&self.ops
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.ops.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	/// Number of assignment slots: one plus the maximum identifier
	/// referenced by any operator or result.
	#[inline]
	pub fn width(&self) -> usize {
		self.width
	}

	#[inline]
	pub fn returns(&self) -> &[usize] {
		&self.returns
	}

	/// Cached matching-`Begin` index for the join-like operator at
	/// `op_index`. Calling this for any other operator is a programmer
	/// bug.
	#[inline]
	pub fn subquery_begin(&self, op_index: usize) -> usize {
		self.begins[op_index].expect("operator has no subquery")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph_engine::types::{EngineError, PlanError};
	use crate::protocol::value::Value;

	#[test]
	fn test_width_covers_ops_and_returns() {
		let plan = Plan::new(
			vec![Operator::NodeScan {
				ident: 2,
				label: None,
			}],
			vec![5],
		)
		.unwrap();
		assert_eq!(plan.width(), 6);

		let plan = Plan::new(
			vec![Operator::Project {
				clauses: vec![ProjectClause {
					ident: 0,
					expr: Expr::Literal(Value::I64(1)),
				}],
			}],
			vec![0],
		)
		.unwrap();
		assert_eq!(plan.width(), 1);
	}

	#[test]
	fn test_width_sees_expression_idents() {
		let plan = Plan::new(
			vec![Operator::Filter {
				clauses: vec![FilterClause::BoolExpr(Expr::Ident(9))],
			}],
			vec![],
		)
		.unwrap();
		assert_eq!(plan.width(), 10);
	}

	#[test]
	fn test_empty_plan_is_rejected() {
		let err = Plan::new(vec![], vec![]).unwrap_err();
		assert!(matches!(err, EngineError::Plan(PlanError::Empty)));
	}

	#[test]
	fn test_simple_join_begin() {
		let plan = Plan::new(
			vec![
				Operator::NodeScan {
					ident: 0,
					label: None,
				},
				Operator::Begin,
				Operator::NodeScan {
					ident: 1,
					label: None,
				},
				Operator::Join,
			],
			vec![0, 1],
		)
		.unwrap();
		assert_eq!(plan.subquery_begin(3), 1);
	}

	#[test]
	fn test_nested_subquery_begins() {
		// outer join whose right side itself contains a join
		let ops = vec![
			Operator::NodeScan {
				ident: 0,
				label: None,
			},
			Operator::Begin, // 1: outer subquery
			Operator::NodeScan {
				ident: 1,
				label: None,
			},
			Operator::Begin, // 3: inner subquery
			Operator::NodeScan {
				ident: 2,
				label: None,
			},
			Operator::Join, // 5: inner
			Operator::Join, // 6: outer
		];
		let plan = Plan::new(ops, vec![0, 1, 2]).unwrap();
		assert_eq!(plan.subquery_begin(5), 3);
		assert_eq!(plan.subquery_begin(6), 1);
	}

	#[test]
	fn test_unmatched_join_is_rejected() {
		let err = Plan::new(
			vec![
				Operator::NodeScan {
					ident: 0,
					label: None,
				},
				Operator::Join,
			],
			vec![0],
		)
		.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Plan(PlanError::UnmatchedSubquery { op_index: 1 })
		));
	}

	#[test]
	fn test_dangling_begin_is_rejected() {
		let err = Plan::new(
			vec![
				Operator::Begin,
				Operator::NodeScan {
					ident: 0,
					label: None,
				},
			],
			vec![0],
		)
		.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Plan(PlanError::DanglingBegin { op_index: 0 })
		));
	}
}
