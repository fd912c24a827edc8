/// Data structures shared across the driver runtime
///
/// This module defines endpoints, credentials and the pool key derived from them,
/// pool configuration, transaction identifiers, and the small enums callers use to
/// configure cursors and transactions.
use std::fmt;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ADMISSION_TIMEOUT_MS, DEFAULT_DIAL_TIMEOUT_SECS, DEFAULT_POOL_CAPACITY,
    MAXIMUM_POOL_CAPACITY, MAX_XID_PART_LEN, TRANSACTION_READ_COMMITTED,
    TRANSACTION_READ_UNCOMMITTED, TRANSACTION_REPEATABLE_READ, TRANSACTION_SERIALIZABLE,
    TRANSACTION_USING_SNAPSHOT,
};
use crate::error::{DriverError, Result};
use crate::utils::hex;

/// Connection mode enumeration
///
/// Determines how a physical connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Local database file
    Local,
    /// Remote server reached by URL
    Remote,
}

/// Where a physical connection is dialed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub mode: Mode,
    /// File path for `Local`, URL for `Remote`.
    pub location: String,
    pub dial_timeout: Duration,
}

impl Endpoint {
    pub fn local(path: impl Into<String>) -> Self {
        Endpoint {
            mode: Mode::Local,
            location: path.into(),
            dial_timeout: Duration::from_secs(DEFAULT_DIAL_TIMEOUT_SECS),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Endpoint {
            mode: Mode::Remote,
            location: url.into(),
            dial_timeout: Duration::from_secs(DEFAULT_DIAL_TIMEOUT_SECS),
        }
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Local => write!(f, "file:{}", self.location),
            Mode::Remote => f.write_str(&self.location),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub user: Option<String>,
    pub auth_token: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn token(auth_token: impl Into<String>) -> Self {
        Credentials {
            user: None,
            auth_token: Some(auth_token.into()),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Identity of a pool: connections are only shared between identical keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
}

impl PoolKey {
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        PoolKey {
            endpoint,
            credentials,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    capacity: usize,
    pub admission_timeout: Duration,
}

impl PoolConfig {
    /// Capacity is clamped to `1..=MAXIMUM_POOL_CAPACITY`.
    pub fn new(capacity: usize, admission_timeout: Duration) -> Self {
        PoolConfig {
            capacity: capacity.clamp(1, MAXIMUM_POOL_CAPACITY),
            admission_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig::new(
            DEFAULT_POOL_CAPACITY,
            Duration::from_millis(DEFAULT_ADMISSION_TIMEOUT_MS),
        )
    }
}

/// Keyword options a caller supplies when opening a data source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOptions {
    pub database: Option<String>,
    pub uri: Option<String>,
    pub auth_token: Option<String>,
    pub user: Option<String>,
    pub pool_size: Option<usize>,
    pub admission_timeout: Option<Duration>,
    pub dial_timeout: Option<Duration>,
}

impl DriverOptions {
    /// A `uri` selects a remote endpoint, otherwise `database` names a local file.
    pub fn endpoint(&self) -> Result<Endpoint> {
        let endpoint = match (&self.uri, &self.database) {
            (Some(uri), _) => Endpoint::remote(uri.clone()),
            (None, Some(path)) => Endpoint::local(path.clone()),
            (None, None) => {
                return Err(DriverError::bad_argument(
                    "either `uri` or `database` must be supplied",
                ));
            }
        };
        Ok(match self.dial_timeout {
            Some(timeout) => endpoint.with_dial_timeout(timeout),
            None => endpoint,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.user.clone(),
            auth_token: self.auth_token.clone(),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig::new(
            self.pool_size.unwrap_or(defaults.capacity()),
            self.admission_timeout.unwrap_or(defaults.admission_timeout),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    /// Read from a consistent snapshot taken at branch start.
    UsingSnapshot,
}

impl IsolationLevel {
    pub fn code(self) -> i32 {
        match self {
            IsolationLevel::ReadUncommitted => TRANSACTION_READ_UNCOMMITTED,
            IsolationLevel::ReadCommitted => TRANSACTION_READ_COMMITTED,
            IsolationLevel::RepeatableRead => TRANSACTION_REPEATABLE_READ,
            IsolationLevel::Serializable => TRANSACTION_SERIALIZABLE,
            IsolationLevel::UsingSnapshot => TRANSACTION_USING_SNAPSHOT,
        }
    }

    /// Clause appended to `XA START`.
    pub fn start_clause(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => ",ISOLATION LEVEL READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => ",ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => ",ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => ",ISOLATION LEVEL SERIALIZABLE",
            IsolationLevel::UsingSnapshot => ",USING SNAPSHOT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchDirection {
    Forward,
    Reverse,
    Unknown,
}

/// Scrolling supported by a cursor. Only forward iteration exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorType {
    ForwardOnly,
}

/// Update capability of a cursor. Only read access exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorConcurrency {
    ReadOnly,
}

/// Global transaction branch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    format_id: i32,
    global_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl Xid {
    pub fn new(
        format_id: i32,
        global_id: impl Into<Vec<u8>>,
        branch_qualifier: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let global_id = global_id.into();
        let branch_qualifier = branch_qualifier.into();
        for (part, bytes) in [("global id", &global_id), ("branch qualifier", &branch_qualifier)] {
            if bytes.len() > MAX_XID_PART_LEN {
                return Err(DriverError::bad_argument(format!(
                    "xid {part} is {} bytes, limit is {MAX_XID_PART_LEN}",
                    bytes.len()
                )));
            }
        }
        Ok(Xid {
            format_id,
            global_id,
            branch_qualifier,
        })
    }

    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    pub fn global_id(&self) -> &[u8] {
        &self.global_id
    }

    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }
}

/// Wire form: `X'<gtrid>',X'<bqual>'`, followed by `,<format id>` unless negative.
impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X'{}',X'{}'",
            hex(&self.global_id),
            hex(&self.branch_qualifier)
        )?;
        if self.format_id > -1 {
            write!(f, ",{}", self.format_id)?;
        }
        Ok(())
    }
}
