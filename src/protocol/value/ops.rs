//! Arithmetic and comparison over [`Value`], as used by the expression
//! evaluator. Type mismatches outside the table below produce `Empty`
//! rather than an error; only integer overflow is surfaced.

use crate::protocol::value::Value;
use crate::protocol::value_error::ValueError;

/// `string + string` concatenates; integers add with overflow surfaced;
/// mixed int/float widens to float; everything else is `Empty`.
pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
	match (lhs, rhs) {
		(Value::String(a), Value::String(b)) => {
			let mut out = String::with_capacity(a.len() + b.len());
			out.push_str(a);
			out.push_str(b);
			Ok(Value::String(out))
		}
		(Value::I64(a), Value::I64(b)) => a
			.checked_add(*b)
			.map(Value::I64)
			.ok_or(ValueError::IntegerOverflow { op: "add" }),
		(Value::I64(a), Value::F64(b)) => Ok(Value::F64(*a as f64 + b)),
		(Value::F64(a), Value::I64(b)) => Ok(Value::F64(a + *b as f64)),
		(Value::F64(a), Value::F64(b)) => Ok(Value::F64(a + b)),
		_ => Ok(Value::Empty),
	}
}

/// Numeric-only subtraction; everything else is `Empty`.
pub fn sub(lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
	match (lhs, rhs) {
		(Value::I64(a), Value::I64(b)) => a
			.checked_sub(*b)
			.map(Value::I64)
			.ok_or(ValueError::IntegerOverflow { op: "sub" }),
		(Value::I64(a), Value::F64(b)) => Ok(Value::F64(*a as f64 - b)),
		(Value::F64(a), Value::I64(b)) => Ok(Value::F64(a - *b as f64)),
		(Value::F64(a), Value::F64(b)) => Ok(Value::F64(a - b)),
		_ => Ok(Value::Empty),
	}
}

/// Structural equality with numeric promotion; distinct tags that are not
/// both numeric are unequal, and `Empty` equals only `Empty`.
pub fn eql(lhs: &Value, rhs: &Value) -> Value {
	tracing::trace!(lhs = ?lhs, rhs = ?rhs, "value equality");
	Value::Boolean(lhs == rhs)
}

impl PartialEq for Value {
	fn eq(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::String(a), Value::String(b)) => a == b,
			(Value::I64(a), Value::I64(b)) => a == b,
			(Value::F64(a), Value::F64(b)) => a == b,
			(Value::I64(i), Value::F64(f)) | (Value::F64(f), Value::I64(i)) => i64_eq_f64(*i, *f),
			(Value::NodeRef(a), Value::NodeRef(b)) => a == b,
			(Value::EdgeRef(a), Value::EdgeRef(b)) => a == b,
			(Value::Id(a), Value::Id(b)) => a == b,
			(Value::Boolean(a), Value::Boolean(b)) => a == b,
			(Value::Empty, Value::Empty) => true,
			_ => false,
		}
	}
}

/// Lossless cross-type comparison: an f64 equals an i64 only when it is an
/// integral value inside the i64 range whose integer part matches. The i64
/// is never cast to f64, which rounds above 2^53.
#[inline]
fn i64_eq_f64(i: i64, f: f64) -> bool {
	if !f.is_finite() || f.fract() != 0.0 {
		return false;
	}
	// 2^63 is exactly representable; everything at or above it is out of range
	if f < -(2f64.powi(63)) || f >= 2f64.powi(63) {
		return false;
	}
	f as i64 == i
}
