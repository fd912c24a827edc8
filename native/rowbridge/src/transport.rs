/// Seams to the transport layer
///
/// The runtime never frames wire bytes itself. A `Dialer` opens a
/// `PhysicalConnection`, and a query on it yields a `QueryOutput`: the projection
/// and table schemas the SQL layer resolved, plus a stream of decoded tuples.
use std::collections::VecDeque;

use crate::error::Result;
use crate::metadata::{ProjectedExpr, SchemaCatalog};
use crate::models::{Credentials, Endpoint};
use crate::value::DecodedValue;

/// Decoded rows of one result set, pulled one tuple at a time.
pub trait TupleStream: Send {
    /// `Ok(None)` once the result set is exhausted.
    fn next_tuple(&mut self) -> Result<Option<Vec<DecodedValue>>>;
}

pub struct QueryOutput {
    pub projection: Vec<ProjectedExpr>,
    pub schemas: SchemaCatalog,
    pub tuples: Box<dyn TupleStream>,
}

/// An authenticated session with the server.
pub trait PhysicalConnection: Send {
    /// Identity of the server session, stable for the life of the handle.
    fn session_id(&self) -> &str;

    fn query(&mut self, sql: &str) -> Result<QueryOutput>;

    /// Run a statement that returns no rows; yields the affected row count.
    fn execute(&mut self, sql: &str) -> Result<u64>;

    fn close(&mut self) -> Result<()>;
}

pub trait Dialer: Send + Sync {
    fn dial(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn PhysicalConnection>>;
}

/// Tuples already held in memory.
#[derive(Debug, Default)]
pub struct MaterializedRows {
    rows: VecDeque<Vec<DecodedValue>>,
}

impl MaterializedRows {
    pub fn new(rows: Vec<Vec<DecodedValue>>) -> Self {
        MaterializedRows { rows: rows.into() }
    }
}

impl TupleStream for MaterializedRows {
    fn next_tuple(&mut self) -> Result<Option<Vec<DecodedValue>>> {
        Ok(self.rows.pop_front())
    }
}
