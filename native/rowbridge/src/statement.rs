/// Statement handles
///
/// A statement is owned by its `Connection` and identified by a UUID. It keeps
/// the id of the cursor its latest execution produced so that closing the
/// statement, or executing it again, can close that cursor.
use uuid::Uuid;

/// Result of running SQL through `Connection::execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// The statement produced rows; the id names the new cursor.
    Rows(String),
    /// The statement changed rows; the count of affected rows.
    Count(u64),
}

#[derive(Debug)]
pub(crate) struct Statement {
    id: String,
    cursor: Option<String>,
    /// Created by `Connection::query`; goes away with its cursor.
    implicit: bool,
}

impl Statement {
    pub(crate) fn new(implicit: bool) -> Self {
        Statement {
            id: Uuid::new_v4().to_string(),
            cursor: None,
            implicit,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// Cursor of the most recent execution, if still open.
    pub(crate) fn current_cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub(crate) fn adopt_cursor(&mut self, cursor_id: String) {
        self.cursor = Some(cursor_id);
    }

    /// Forget `cursor_id` once it is closed.
    pub(crate) fn release_cursor(&mut self, cursor_id: &str) {
        if self.cursor.as_deref() == Some(cursor_id) {
            self.cursor = None;
        }
    }
}
