/// LibSQL/Turso transport
///
/// Implements the transport seams over the `libsql` client: a local database
/// file or a remote server reached with an auth token. Every call runs to
/// completion on the shared `TOKIO_RUNTIME`, so these handles must not be used
/// from inside another async runtime.
///
/// Result sets are materialized before the cursor sees them. Column types come
/// from the declared type of each column; schema resolution is left to the
/// server, so every projected column is reported as derived.
use bytes::Bytes;
use libsql::{Builder, Database, Value};
use uuid::Uuid;

use crate::constants::TOKIO_RUNTIME;
use crate::error::{DriverError, Result};
use crate::metadata::{ProjectedExpr, SchemaCatalog, SqlType};
use crate::models::{Credentials, Endpoint, Mode};
use crate::transport::{Dialer, MaterializedRows, PhysicalConnection, QueryOutput};
use crate::value::DecodedValue;

#[derive(Debug, Default, Clone, Copy)]
pub struct LibsqlDialer;

impl LibsqlDialer {
    pub fn new() -> Self {
        LibsqlDialer
    }
}

impl Dialer for LibsqlDialer {
    fn dial(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn PhysicalConnection>> {
        let timeout = endpoint.dial_timeout;
        let physical = TOKIO_RUNTIME.block_on(async {
            tokio::time::timeout(timeout, async {
                let db = match endpoint.mode {
                    Mode::Local => Builder::new_local(&endpoint.location).build().await,
                    Mode::Remote => {
                        let token = credentials.auth_token.clone().ok_or_else(|| {
                            DriverError::Connection(format!(
                                "auth token required for remote endpoint {endpoint}"
                            ))
                        })?;
                        Builder::new_remote(endpoint.location.clone(), token)
                            .build()
                            .await
                    }
                }
                .map_err(|e| DriverError::Connection(format!("Failed to build DB: {e}")))?;

                let conn = db
                    .connect()
                    .map_err(|e| DriverError::Connection(format!("Failed to connect: {e}")))?;

                // Remote builders are lazy; ping to surface bad urls and tokens now
                if endpoint.mode == Mode::Remote {
                    conn.query("SELECT 1", ())
                        .await
                        .map_err(|e| DriverError::Connection(format!("Failed ping: {e}")))?;
                }

                Ok::<_, DriverError>(LibsqlPhysical {
                    db: Some(db),
                    conn: Some(conn),
                    session_id: Uuid::new_v4().to_string(),
                })
            })
            .await
            .map_err(|_| {
                DriverError::Connection(format!(
                    "Connection timeout after {} seconds",
                    timeout.as_secs()
                ))
            })?
        })?;

        tracing::debug!(%endpoint, session = %physical.session_id, "libsql session established");
        Ok(Box::new(physical))
    }
}

/// One libsql connection and the database handle that owns it.
pub struct LibsqlPhysical {
    db: Option<Database>,
    conn: Option<libsql::Connection>,
    session_id: String,
}

impl LibsqlPhysical {
    fn conn(&self) -> Result<&libsql::Connection> {
        self.conn.as_ref().ok_or(DriverError::Closed("libsql session"))
    }
}

fn decode_value(value: Value) -> DecodedValue {
    match value {
        Value::Null => DecodedValue::Null,
        Value::Integer(i) => DecodedValue::Integer(i),
        Value::Real(f) => DecodedValue::Real(f),
        Value::Text(s) => DecodedValue::Text(s),
        Value::Blob(b) => DecodedValue::Binary(Bytes::from(b)),
    }
}

impl PhysicalConnection for LibsqlPhysical {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn query(&mut self, sql: &str) -> Result<QueryOutput> {
        let conn = self.conn()?;
        let (projection, rows) = TOKIO_RUNTIME.block_on(async {
            let stmt = conn.prepare(sql).await?;
            let projection: Vec<ProjectedExpr> = stmt
                .columns()
                .iter()
                .map(|column| {
                    let sql_type = column
                        .decl_type()
                        .map_or(SqlType::NText, SqlType::from_declared);
                    ProjectedExpr::derived(column.name(), sql_type)
                })
                .collect();

            let width = projection.len();
            let mut result_rows = stmt.query(()).await?;
            let mut rows = Vec::new();
            while let Some(row) = result_rows.next().await? {
                let mut tuple = Vec::with_capacity(width);
                for i in 0..width {
                    let index = i32::try_from(i)
                        .map_err(|_| DriverError::Internal(format!("column index {i} overflows")))?;
                    tuple.push(decode_value(row.get_value(index)?));
                }
                rows.push(tuple);
            }
            Ok::<_, DriverError>((projection, rows))
        })?;

        Ok(QueryOutput {
            projection,
            schemas: SchemaCatalog::new(),
            tuples: Box::new(MaterializedRows::new(rows)),
        })
    }

    fn execute(&mut self, sql: &str) -> Result<u64> {
        let conn = self.conn()?;
        TOKIO_RUNTIME
            .block_on(async { conn.execute(sql, ()).await })
            .map_err(DriverError::from)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handles releases the session
        self.conn.take();
        self.db.take();
        Ok(())
    }
}
