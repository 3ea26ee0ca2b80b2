use thiserror::Error;

use crate::config::ConfigError;
use crate::types::Bid;

/// Failures of a single store operation.
///
/// Every variant is recoverable at the operation boundary. Raw driver errors
/// are folded into [`StoreError::StoreUnavailable`] as text and never exposed
/// as structured data.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("User Does Not Exist: {0}")]
	UnknownUser(String),

	#[error("User Already Exists: {0}")]
	DuplicateUser(String),

	#[error("Book Not Found")]
	NotFound,

	#[error("missing required field: {0}")]
	MissingField(&'static str),

	#[error("invalid status: {0} (expected one of now, next, done)")]
	InvalidStatus(String),

	#[error("field cannot be edited: {0}")]
	UnknownField(String),

	#[error("stored book {book_id} is unreadable: {reason}")]
	CorruptRecord { book_id: Bid, reason: String },

	#[error("store unavailable: {0}")]
	StoreUnavailable(String),
}

impl StoreError {
	/// Stable name of the error kind, for callers that map errors to a transport.
	pub fn kind(&self) -> &'static str {
		match self {
			StoreError::UnknownUser(_) => "unknown_user",
			StoreError::DuplicateUser(_) => "duplicate_user",
			StoreError::NotFound => "not_found",
			StoreError::MissingField(_) => "missing_field",
			StoreError::InvalidStatus(_) => "invalid_status",
			StoreError::UnknownField(_) => "unknown_field",
			StoreError::CorruptRecord { .. } => "corrupt_record",
			StoreError::StoreUnavailable(_) => "store_unavailable",
		}
	}
}

impl From<sqlx::Error> for StoreError {
	fn from(err: sqlx::Error) -> Self {
		StoreError::StoreUnavailable(err.to_string())
	}
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Process-level failures, fatal at startup.
#[derive(Debug, Error)]
pub enum AppError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("can't connect to database: {0}")]
	Connect(#[source] sqlx::Error),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
