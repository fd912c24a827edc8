/// Error vocabulary for the driver runtime
///
/// Every failure surfaced by this crate is a `DriverError`. Callers branch on
/// `code()` (or the five-character `sql_state()`), never on the message text.
use std::time::Duration;

use thiserror::Error;

use crate::coerce::TargetKind;
use crate::value::ValueKind;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Stable condition codes carried by every `DriverError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ClassCast,
    NumericOverflow,
    EntryNotFound,
    NotSupported,
    LockTimeout,
    BadArgument,
    TransactionProtocol,
    InvalidCursorState,
    Closed,
    Connection,
    Transport,
    Internal,
}

impl ErrorCode {
    /// SQLSTATE-style five character code for this condition.
    pub fn sql_state(self) -> &'static str {
        match self {
            ErrorCode::ClassCast => "22005",
            ErrorCode::NumericOverflow => "22003",
            ErrorCode::EntryNotFound => "42S22",
            ErrorCode::NotSupported => "0A000",
            ErrorCode::LockTimeout => "HYT00",
            ErrorCode::BadArgument => "22023",
            ErrorCode::TransactionProtocol => "XAE06",
            ErrorCode::InvalidCursorState => "24000",
            ErrorCode::Closed => "08003",
            ErrorCode::Connection => "08001",
            ErrorCode::Transport => "08S01",
            ErrorCode::Internal => "XX000",
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot convert {from:?} value to {to:?}")]
    ClassCast { from: ValueKind, to: TargetKind },

    #[error("value {value} does not fit in {target:?}")]
    NumericOverflow { value: String, target: TargetKind },

    #[error("no entry named '{0}'")]
    EntryNotFound(String),

    #[error("{0} is not supported")]
    NotSupported(&'static str),

    #[error("no connection became available within {0:?}")]
    LockTimeout(Duration),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("cannot {operation} while the branch is {state}")]
    TransactionProtocol {
        operation: &'static str,
        state: String,
    },

    #[error("cursor is not positioned on a row")]
    InvalidCursorState,

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("failed to connect: {0}")]
    Connection(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DriverError::ClassCast { .. } => ErrorCode::ClassCast,
            DriverError::NumericOverflow { .. } => ErrorCode::NumericOverflow,
            DriverError::EntryNotFound(_) => ErrorCode::EntryNotFound,
            DriverError::NotSupported(_) => ErrorCode::NotSupported,
            DriverError::LockTimeout(_) => ErrorCode::LockTimeout,
            DriverError::BadArgument(_) => ErrorCode::BadArgument,
            DriverError::TransactionProtocol { .. } => ErrorCode::TransactionProtocol,
            DriverError::InvalidCursorState => ErrorCode::InvalidCursorState,
            DriverError::Closed(_) => ErrorCode::Closed,
            DriverError::Connection(_) => ErrorCode::Connection,
            DriverError::Transport(_) => ErrorCode::Transport,
            DriverError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn sql_state(&self) -> &'static str {
        self.code().sql_state()
    }

    pub(crate) fn class_cast(from: ValueKind, to: TargetKind) -> Self {
        DriverError::ClassCast { from, to }
    }

    pub(crate) fn bad_argument(message: impl Into<String>) -> Self {
        DriverError::BadArgument(message.into())
    }
}

impl From<libsql::Error> for DriverError {
    fn from(err: libsql::Error) -> Self {
        DriverError::Transport(err.to_string())
    }
}
