use std::fmt;

use crate::protocol::value_error::ValueKind;
use crate::utils::id::ElementId;

pub mod conv;
pub mod encoding;
pub mod ops;


/// Dynamically-tagged property value shared by storage, plans, and the
/// executor's assignment row.
///
/// Equality is structural; `I64` and `F64` cross-compare with lossless
/// numeric promotion (see `ops`). The canonical binary form (one tag byte
/// plus a big-endian payload) lives in `encoding`.
#[derive(Clone, Debug, Default)]
pub enum Value {
	String(String),
	I64(i64),
	F64(f64),
	NodeRef(ElementId),
	EdgeRef(ElementId),
	Id(ElementId),
	Boolean(bool),
	#[default]
	Empty,
}

impl Value {
	pub fn kind(&self) -> ValueKind {
		match self {
			Value::String(_) => ValueKind::String,
			Value::I64(_) => ValueKind::I64,
			Value::F64(_) => ValueKind::F64,
			Value::NodeRef(_) => ValueKind::NodeRef,
			Value::EdgeRef(_) => ValueKind::EdgeRef,
			Value::Id(_) => ValueKind::Id,
			Value::Boolean(_) => ValueKind::Bool,
			Value::Empty => ValueKind::Empty,
		}
	}

	/// `false`, numeric zero, NaN, the empty string, and `Empty` are falsy;
	/// everything else is truthy.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Boolean(b) => *b,
			Value::I64(i) => *i != 0,
			Value::F64(f) => *f != 0.0 && !f.is_nan(),
			Value::String(s) => !s.is_empty(),
			Value::Empty => false,
			Value::NodeRef(_) | Value::EdgeRef(_) | Value::Id(_) => true,
		}
	}

	#[inline]
	pub fn as_node_ref(&self) -> Option<ElementId> {
		match self {
			Value::NodeRef(id) => Some(*id),
			_ => None,
		}
	}

	#[inline]
	pub fn as_edge_ref(&self) -> Option<ElementId> {
		match self {
			Value::EdgeRef(id) => Some(*id),
			_ => None,
		}
	}

	#[inline]
	pub fn as_id(&self) -> Option<ElementId> {
		match self {
			Value::Id(id) => Some(*id),
			_ => None,
		}
	}

	#[inline]
	pub fn is_numeric(&self) -> bool {
		matches!(self, Value::I64(_) | Value::F64(_))
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Value::String(s) => f.write_str(s),
			Value::I64(i) => write!(f, "{i}"),
			Value::F64(v) => write!(f, "{v}"),
			Value::NodeRef(id) | Value::EdgeRef(id) | Value::Id(id) => write!(f, "{id}"),
			Value::Boolean(b) => write!(f, "{b}"),
			Value::Empty => f.write_str("null"),
		}
	}
}
