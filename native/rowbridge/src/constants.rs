/// Global constants for rowbridge
///
/// This module holds the shared async runtime, pool and dial defaults, and the
/// numeric codes of the driver-facing protocol (fetch directions, XA flags,
/// isolation levels).
use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

/// Global Tokio runtime for the async `libsql` client
///
/// IMPORTANT: This panics if Tokio runtime creation fails, which can only happen in
/// extremely rare circumstances (e.g., system has no available threads). The runtime
/// is created on the first dial through `LibsqlDialer`.
#[allow(clippy::expect_used)]
pub static TOKIO_RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    Runtime::new()
        .expect("Failed to initialize Tokio runtime - check system resources and thread limits")
});

/// Default timeout for establishing a physical connection (in seconds)
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 30;

/// Default number of physical connections a pool keeps per key
pub const DEFAULT_POOL_CAPACITY: usize = 20;

/// Hard ceiling on pool capacity
pub const MAXIMUM_POOL_CAPACITY: usize = 100;

/// Default time an acquirer waits for a free connection (in milliseconds)
pub const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 30_000;

/// Display size reported for unbounded text and binary columns
pub const MAX_DISPLAY_SIZE: i32 = i32::MAX;

/// Label of the synthesized row identifier column
pub const ROWID_LABEL: &str = "ROWID";

/// Labels of the two columns produced when an array is walked as a cursor
pub const ARRAY_INDEX_LABEL: &str = "INDEX";
pub const ARRAY_VALUE_LABEL: &str = "VALUE";

/// Maximum length in bytes of the global id and branch qualifier of an xid
pub const MAX_XID_PART_LEN: usize = 64;

/// SQLSTATE attached to advisory warnings
pub const WARNING_SQL_STATE: &str = "01000";

// Fetch direction codes
pub const FETCH_FORWARD: i32 = 1000;
pub const FETCH_REVERSE: i32 = 1001;
pub const FETCH_UNKNOWN: i32 = 1002;

// XA flag codes
pub const TMNOFLAGS: i32 = 0x0000_0000;
pub const TMJOIN: i32 = 0x0020_0000;
pub const TMENDRSCAN: i32 = 0x0080_0000;
pub const TMSTARTRSCAN: i32 = 0x0100_0000;
pub const TMSUSPEND: i32 = 0x0200_0000;
pub const TMSUCCESS: i32 = 0x0400_0000;
pub const TMRESUME: i32 = 0x0800_0000;
pub const TMFAIL: i32 = 0x2000_0000;

// Transaction isolation codes
pub const TRANSACTION_NONE: i32 = 0;
pub const TRANSACTION_READ_UNCOMMITTED: i32 = 1;
pub const TRANSACTION_READ_COMMITTED: i32 = 2;
pub const TRANSACTION_REPEATABLE_READ: i32 = 4;
pub const TRANSACTION_SERIALIZABLE: i32 = 8;
pub const TRANSACTION_USING_SNAPSHOT: i32 = 0x100;
