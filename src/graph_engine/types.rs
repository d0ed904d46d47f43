use rocksdb::ErrorKind;
use thiserror::Error;

use crate::protocol::value_error::{ValueError, ValueKind};
use crate::utils::id::{ElementId, ParseElementIdError};

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("write conflict detected at commit, retry with a fresh transaction")]
	Busy,

	#[error("conflict-tracking history exhausted, retry with a fresh transaction")]
	TryAgain,

	#[error("not found")]
	NotFound,

	#[error("data corruption: {0}")]
	Corruption(String),

	#[error("adjacency index corruption: {0}")]
	CorruptedIndex(String),

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("edge {id} already exists with different endpoints or direction")]
	EdgeDataMismatch { id: ElementId },

	#[error("conversion error: {0}")]
	Conversion(String),

	#[error("storage backend error: {0}")]
	Backend(String),
}

impl From<rocksdb::Error> for StorageError {
	fn from(error: rocksdb::Error) -> Self {
		match error.kind() {
			ErrorKind::Busy => StorageError::Busy,
			ErrorKind::TryAgain => StorageError::TryAgain,
			ErrorKind::NotFound => StorageError::NotFound,
			ErrorKind::Corruption => StorageError::Corruption(error.to_string()),
			ErrorKind::InvalidArgument => StorageError::InvalidArgument(error.to_string()),
			ErrorKind::IOError => StorageError::Io(std::io::Error::other(error.to_string())),
			_ => StorageError::Backend(error.to_string()),
		}
	}
}

impl From<sonic_rs::Error> for StorageError {
	fn from(error: sonic_rs::Error) -> Self {
		StorageError::Conversion(format!("sonic error: {error}"))
	}
}

impl From<ParseElementIdError> for StorageError {
	fn from(error: ParseElementIdError) -> Self {
		StorageError::Conversion(error.to_string())
	}
}

#[derive(Debug, Error)]
pub enum PlanError {
	#[error("operator at index {op_index} has no matching Begin for its subquery")]
	UnmatchedSubquery { op_index: usize },

	#[error("Begin at index {op_index} belongs to no join-like operator")]
	DanglingBegin { op_index: usize },

	#[error("plan has no operators")]
	Empty,
}

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("expected {expected}, got {got:?}")]
	WrongType {
		expected: &'static str,
		got: ValueKind,
	},

	#[error("parameter {0} not found in request")]
	ParamNotFound(String),

	#[error("pull budget of {limit} exhausted")]
	PullBudgetExhausted { limit: u64 },
}

#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error(transparent)]
	Plan(#[from] PlanError),

	#[error(transparent)]
	Exec(#[from] ExecError),

	#[error(transparent)]
	Value(#[from] ValueError),
}

impl From<rocksdb::Error> for EngineError {
	fn from(error: rocksdb::Error) -> Self {
		StorageError::from(error).into()
	}
}

impl From<std::io::Error> for EngineError {
	fn from(error: std::io::Error) -> Self {
		StorageError::Io(error).into()
	}
}

impl From<sonic_rs::Error> for EngineError {
	fn from(error: sonic_rs::Error) -> Self {
		StorageError::from(error).into()
	}
}

impl From<ParseElementIdError> for EngineError {
	fn from(error: ParseElementIdError) -> Self {
		StorageError::from(error).into()
	}
}

/// Stable identifiers for errors crossing the database boundary. The wire
/// representation is up to the embedding layer; these names are the
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
	NotFound,
	Corruption,
	Busy,
	TryAgain,
	InvalidArgument,
	IoError,
	CorruptedIndex,
	EdgeDataMismatch,
	WrongType,
	MalformedPlan,
	InvalidValueTag,
}

impl ErrorCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::NotFound => "NotFound",
			ErrorCode::Corruption => "Corruption",
			ErrorCode::Busy => "Busy",
			ErrorCode::TryAgain => "TryAgain",
			ErrorCode::InvalidArgument => "InvalidArgument",
			ErrorCode::IoError => "IOError",
			ErrorCode::CorruptedIndex => "CorruptedIndex",
			ErrorCode::EdgeDataMismatch => "EdgeDataMismatch",
			ErrorCode::WrongType => "WrongType",
			ErrorCode::MalformedPlan => "MalformedPlan",
			ErrorCode::InvalidValueTag => "InvalidValueTag",
		}
	}
}

impl EngineError {
	/// Boundary code for this error, or `None` for conditions that never
	/// cross the wire (such as an exhausted caller-chosen pull budget).
	pub fn code(&self) -> Option<ErrorCode> {
		match self {
			EngineError::Storage(err) => Some(match err {
				StorageError::Io(_) => ErrorCode::IoError,
				StorageError::Busy => ErrorCode::Busy,
				StorageError::TryAgain => ErrorCode::TryAgain,
				StorageError::NotFound => ErrorCode::NotFound,
				StorageError::Corruption(_) => ErrorCode::Corruption,
				StorageError::CorruptedIndex(_) => ErrorCode::CorruptedIndex,
				StorageError::InvalidArgument(_) => ErrorCode::InvalidArgument,
				StorageError::EdgeDataMismatch { .. } => ErrorCode::EdgeDataMismatch,
				StorageError::Conversion(_) => ErrorCode::InvalidArgument,
				StorageError::Backend(_) => ErrorCode::IoError,
			}),
			EngineError::Plan(_) => Some(ErrorCode::MalformedPlan),
			EngineError::Exec(err) => match err {
				ExecError::WrongType { .. } => Some(ErrorCode::WrongType),
				ExecError::ParamNotFound(_) => Some(ErrorCode::InvalidArgument),
				ExecError::PullBudgetExhausted { .. } => None,
			},
			EngineError::Value(err) => Some(match err {
				ValueError::InvalidValueTag(_) => ErrorCode::InvalidValueTag,
				ValueError::Truncated { .. }
				| ValueError::InvalidUtf8 { .. }
				| ValueError::InvalidBool(_) => ErrorCode::Corruption,
				ValueError::IntegerOverflow { .. } => ErrorCode::InvalidArgument,
			}),
		}
	}

	/// Whether the caller should abort the transaction and retry from
	/// scratch with a fresh one.
	pub fn is_retryable(&self) -> bool {
		matches!(self.code(), Some(ErrorCode::Busy | ErrorCode::TryAgain))
	}
}
