//! `rowbridge`: client-side runtime of a relational database driver
//!
//! This is the root module of the crate. It turns decoded server values into the
//! typed results callers ask for, describes result columns, walks result sets
//! with a forward-only cursor, pools physical connections per endpoint and
//! credentials, and coordinates XA two-phase commit on a single connection.
//!
//! The wire protocol stays behind the `transport` seams. `libsql_transport`
//! provides a LibSQL/Turso implementation of them.
pub mod coerce;
pub mod connection;
pub mod constants;
pub mod cursor;
pub mod decode;
pub mod error;
pub mod libsql_transport;
pub mod metadata;
pub mod models;
pub mod pool;
pub mod statement;
pub mod transaction;
pub mod transport;
pub mod utils;
pub mod value;
pub mod warning;

// Re-export the types most callers need
pub use coerce::{coerce, coerce_scaled, coerce_with, ArrayElements, Coerced, Coercion, CoercionMode, TargetKind};
pub use connection::Connection;
pub use cursor::{ColumnRef, ResultCursor};
pub use error::{DriverError, ErrorCode, Result};
pub use libsql_transport::LibsqlDialer;
pub use metadata::{resolve, ColumnDescriptor, Nullability, ResultMetadata, SqlKind, SqlType};
pub use models::*;
pub use pool::{ConnectionPool, PoolRegistry, PooledConnection};
pub use statement::ExecuteOutcome;
pub use transaction::{BranchState, EndFlag, PrepareOutcome, RecoverFlag, StartFlag, TransactionCoordinator};
pub use utils::should_use_query;
pub use value::{Decimal, DecodedValue, ValueKind};
pub use warning::{Warning, WarningChain};

#[cfg(test)]
mod tests;
