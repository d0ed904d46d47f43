//! Conversions into [`Value`] for property-building ergonomics.
//!
//! Element ids are deliberately left out: an id converts to `NodeRef`,
//! `EdgeRef`, or `Id` depending on what it names, so callers pick the
//! variant explicitly.

use crate::protocol::value::Value;

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::I64(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Value::I64(value as i64)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::F64(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Boolean(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::String(value)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		match value {
			Some(inner) => inner.into(),
			None => Value::Empty,
		}
	}
}
