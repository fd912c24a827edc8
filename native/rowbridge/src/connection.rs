/// Logical connection over one physical session
///
/// A `Connection` owns its physical handle and an arena of statements and
/// cursors keyed by UUID. Entries leave the arena when they close: closing a
/// statement closes its cursor, and closing the connection closes everything it
/// owns and then the physical handle. Every close is idempotent.
///
/// The XA branch bound to the session is recorded here rather than in a
/// coordinator, so it outlives any one coordinator and survives pool reuse.
use std::collections::HashMap;

use uuid::Uuid;

use crate::cursor::ResultCursor;
use crate::error::{DriverError, Result};
use crate::models::{Credentials, Endpoint, IsolationLevel, Xid};
use crate::statement::{ExecuteOutcome, Statement};
use crate::transaction::{self, Branch, BranchState};
use crate::transport::{Dialer, PhysicalConnection};
use crate::utils::should_use_query;

struct CursorEntry {
    cursor: ResultCursor,
    stmt_id: String,
}

pub struct Connection {
    conn_id: String,
    physical: Box<dyn PhysicalConnection>,
    statements: HashMap<String, Statement>,
    cursors: HashMap<String, CursorEntry>,
    read_only: bool,
    isolation: Option<IsolationLevel>,
    branch: Option<Branch>,
    closed: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("conn_id", &self.conn_id)
            .field("session_id", &self.physical.session_id())
            .field("statements", &self.statements.len())
            .field("cursors", &self.cursors.len())
            .field("branch", &self.branch)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Connection {
    pub fn new(physical: Box<dyn PhysicalConnection>) -> Self {
        Connection {
            conn_id: Uuid::new_v4().to_string(),
            physical,
            statements: HashMap::new(),
            cursors: HashMap::new(),
            read_only: false,
            isolation: None,
            branch: None,
            closed: false,
        }
    }

    /// Dial a dedicated connection, bypassing any pool.
    pub fn open(dialer: &dyn Dialer, endpoint: &Endpoint, credentials: &Credentials) -> Result<Self> {
        let physical = dialer.dial(endpoint, credentials)?;
        tracing::info!(%endpoint, session = physical.session_id(), "connection opened");
        Ok(Connection::new(physical))
    }

    pub fn id(&self) -> &str {
        &self.conn_id
    }

    /// Identity of the server session behind this connection.
    pub fn session_id(&self) -> &str {
        self.physical.session_id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DriverError::Closed("connection"));
        }
        Ok(())
    }

    pub fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.ensure_open()?;
        self.read_only = read_only;
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// `None` leaves the isolation level to the server default.
    pub fn set_transaction_isolation(&mut self, level: Option<IsolationLevel>) -> Result<()> {
        self.ensure_open()?;
        self.isolation = level;
        Ok(())
    }

    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// XA branch bound to this session, terminal or not.
    pub fn xa_branch(&self) -> Option<(&Xid, BranchState)> {
        self.branch.as_ref().map(|branch| (&branch.xid, branch.state))
    }

    pub(crate) fn branch(&self) -> Option<&Branch> {
        self.branch.as_ref()
    }

    pub(crate) fn branch_mut(&mut self) -> Option<&mut Branch> {
        self.branch.as_mut()
    }

    pub(crate) fn set_branch(&mut self, branch: Option<Branch>) {
        self.branch = branch;
    }

    pub fn create_statement(&mut self) -> Result<String> {
        self.insert_statement(false)
    }

    fn insert_statement(&mut self, implicit: bool) -> Result<String> {
        self.ensure_open()?;
        let statement = Statement::new(implicit);
        let stmt_id = statement.id().to_string();
        self.statements.insert(stmt_id.clone(), statement);
        Ok(stmt_id)
    }

    fn statement(&mut self, stmt_id: &str) -> Result<&mut Statement> {
        self.statements
            .get_mut(stmt_id)
            .ok_or_else(|| DriverError::EntryNotFound(stmt_id.to_string()))
    }

    /// Close the cursor left by the statement's previous execution.
    fn retire_current_cursor(&mut self, stmt_id: &str) -> Result<()> {
        let previous = self.statement(stmt_id)?.current_cursor().map(str::to_string);
        if let Some(cursor_id) = previous {
            self.close_cursor(&cursor_id);
        }
        Ok(())
    }

    /// Run row-returning SQL on a statement. Returns the id of the new cursor.
    pub fn execute_query(&mut self, stmt_id: &str, sql: &str) -> Result<String> {
        self.ensure_open()?;
        self.retire_current_cursor(stmt_id)?;

        let cursor = self.query_direct(sql)?;
        let cursor_id = Uuid::new_v4().to_string();
        self.cursors.insert(
            cursor_id.clone(),
            CursorEntry {
                cursor,
                stmt_id: stmt_id.to_string(),
            },
        );
        self.statement(stmt_id)?.adopt_cursor(cursor_id.clone());
        Ok(cursor_id)
    }

    /// Run any SQL on a statement, routing it by whether it returns rows.
    pub fn execute(&mut self, stmt_id: &str, sql: &str) -> Result<ExecuteOutcome> {
        if should_use_query(sql) {
            return self.execute_query(stmt_id, sql).map(ExecuteOutcome::Rows);
        }
        self.ensure_open()?;
        self.retire_current_cursor(stmt_id)?;
        self.physical.execute(sql).map(ExecuteOutcome::Count)
    }

    /// Run row-returning SQL on a statement of its own. The statement goes away
    /// when the returned cursor is closed.
    pub fn query(&mut self, sql: &str) -> Result<String> {
        let stmt_id = self.insert_statement(true)?;
        let result = self.execute_query(&stmt_id, sql);
        if result.is_err() {
            self.statements.remove(&stmt_id);
        }
        result
    }

    /// Run SQL on the physical session without creating a statement.
    pub fn execute_direct(&mut self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        self.physical.execute(sql)
    }

    /// Run row-returning SQL outside the arena. The caller owns the cursor and
    /// closing the connection does not reach it.
    pub(crate) fn query_direct(&mut self, sql: &str) -> Result<ResultCursor> {
        self.ensure_open()?;
        let output = self.physical.query(sql)?;
        ResultCursor::from_query(output)
    }

    pub fn cursor(&mut self, cursor_id: &str) -> Result<&mut ResultCursor> {
        self.ensure_open()?;
        self.cursors
            .get_mut(cursor_id)
            .map(|entry| &mut entry.cursor)
            .ok_or_else(|| DriverError::EntryNotFound(cursor_id.to_string()))
    }

    /// Close one cursor and drop it from the arena. Unknown ids are ignored.
    pub fn close_cursor(&mut self, cursor_id: &str) {
        let Some(mut entry) = self.cursors.remove(cursor_id) else {
            return;
        };
        entry.cursor.close();
        let implicit = match self.statements.get_mut(&entry.stmt_id) {
            Some(statement) => {
                statement.release_cursor(cursor_id);
                statement.is_implicit()
            }
            None => false,
        };
        if implicit {
            self.statements.remove(&entry.stmt_id);
        }
    }

    /// Close a statement and its cursor, dropping both from the arena.
    pub fn close_statement(&mut self, stmt_id: &str) {
        let Some(statement) = self.statements.remove(stmt_id) else {
            return;
        };
        if let Some(cursor_id) = statement.current_cursor() {
            self.close_cursor(cursor_id);
        }
    }

    /// Open statements, including those `query` created.
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    fn close_children(&mut self) {
        for entry in self.cursors.values_mut() {
            entry.cursor.close();
        }
        self.cursors.clear();
        self.statements.clear();
    }

    /// Drop all statements and cursors and restore default settings, keeping
    /// the physical session.
    ///
    /// An active or ended XA branch is rolled back; a prepared one stays bound
    /// to the session until it is committed or rolled back.
    pub fn reset(&mut self) {
        self.close_children();
        self.read_only = false;
        self.isolation = None;
        if self.closed {
            return;
        }
        transaction::abandon_branch(self);
        if self
            .branch
            .as_ref()
            .is_some_and(|branch| branch.state.is_terminal())
        {
            self.branch = None;
        }
    }

    /// Close everything this connection owns, then the physical handle.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.close_children();
        tracing::debug!(conn_id = %self.conn_id, "closing connection");
        self.physical.close()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(conn_id = %self.conn_id, error = %err, "failed to close connection");
        }
    }
}
