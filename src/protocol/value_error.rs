use thiserror::Error;

/// Discriminant-only view of a [`super::value::Value`], used in error reporting.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValueKind {
	String,
	I64,
	F64,
	NodeRef,
	EdgeRef,
	Id,
	Bool,
	Empty,
}

#[derive(Debug, Error)]
pub enum ValueError {
	#[error("unknown value tag {0:#04x}")]
	InvalidValueTag(u8),

	#[error("truncated value data: wanted {wanted} more bytes, had {remaining}")]
	Truncated { wanted: usize, remaining: usize },

	#[error("invalid utf-8 in {what}")]
	InvalidUtf8 { what: &'static str },

	#[error("invalid boolean byte {0:#04x}")]
	InvalidBool(u8),

	#[error("integer overflow in {op}")]
	IntegerOverflow { op: &'static str },
}
