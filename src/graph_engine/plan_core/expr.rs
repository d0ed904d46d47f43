//! Expressions evaluated against the executor's assignment row.

use std::collections::HashMap;

use crate::graph_engine::types::{EngineError, ExecError};
use crate::protocol::value::{Value, ops};

/// Caller-supplied query parameters, resolved by name at evaluation time.
pub type Params = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
	Add,
	Sub,
	Eq,
}

#[derive(Debug, Clone)]
pub enum Expr {
	Literal(Value),
	/// Reads the assignment slot at the index.
	Ident(usize),
	/// Reads a named query parameter; missing parameters are a user error.
	Param(String),
	Binary {
		op: BinOp,
		lhs: Box<Expr>,
		rhs: Box<Expr>,
	},
}

impl Expr {
	pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
		Expr::Binary {
			op,
			lhs: Box::new(lhs),
			rhs: Box::new(rhs),
		}
	}

	pub fn eval(&self, assignments: &[Value], params: &Params) -> Result<Value, EngineError> {
		match self {
			Expr::Literal(value) => Ok(value.clone()),
			Expr::Ident(ident) => Ok(assignments[*ident].clone()),
			Expr::Param(name) => params
				.get(name)
				.cloned()
				.ok_or_else(|| ExecError::ParamNotFound(name.clone()).into()),
			Expr::Binary { op, lhs, rhs } => {
				let lhs = lhs.eval(assignments, params)?;
				let rhs = rhs.eval(assignments, params)?;
				match op {
					BinOp::Add => Ok(ops::add(&lhs, &rhs)?),
					BinOp::Sub => Ok(ops::sub(&lhs, &rhs)?),
					BinOp::Eq => Ok(ops::eql(&lhs, &rhs)),
				}
			}
		}
	}

	pub(crate) fn for_each_ident(&self, f: &mut impl FnMut(usize)) {
		match self {
			Expr::Literal(_) | Expr::Param(_) => {}
			Expr::Ident(ident) => f(*ident),
			Expr::Binary { lhs, rhs, .. } => {
				lhs.for_each_ident(f);
				rhs.for_each_ident(f);
			}
		}
	}
}
