/// XA-style two-phase commit over one connection.
///
/// A `TransactionCoordinator` binds to a single connection for its lifetime and
/// drives at most one global transaction branch at a time through
///
/// ```text
/// Active --end--> Ended --prepare--> Prepared --commit--> Committed
///                   |                    \----rollback--> RolledBack
///                   |--commit(one phase)--> Committed
///                   \--rollback-----------> RolledBack
/// ```
///
/// Every transition issues the matching `XA ...` command on the connection and
/// only changes state once that command succeeds. A call out of order, or naming
/// a different branch, raises `TransactionProtocol` and changes nothing.
///
/// The branch itself is recorded on the `Connection`, so a session never holds
/// two branches in flight even across coordinators or pool reuse. Dropping a
/// coordinator closes it: an active or ended branch is rolled back, a prepared
/// one stays bound to the session for a later coordinator to finish.
///
/// Branches found through `recover` may be committed, rolled back or forgotten
/// by xid while no other branch is in flight; that is how a transaction manager
/// finishes work left in doubt by a crash.
use std::borrow::BorrowMut;
use std::fmt;

use crate::connection::Connection;
use crate::error::{DriverError, Result};
use crate::models::Xid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartFlag {
    NoFlags,
    /// Join an existing branch. Not supported.
    Join,
    /// Resume a suspended branch. Not supported.
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndFlag {
    Success,
    Fail,
    /// Suspend the branch. Not supported.
    Suspend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoverFlag {
    StartScan,
    EndScan,
    NoFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchState {
    Active,
    Ended,
    Prepared,
    Committed,
    RolledBack,
}

impl BranchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BranchState::Committed | BranchState::RolledBack)
    }
}

impl fmt::Display for BranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BranchState::Active => "active",
            BranchState::Ended => "ended",
            BranchState::Prepared => "prepared",
            BranchState::Committed => "committed",
            BranchState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrepareOutcome {
    /// The branch is prepared and awaits commit or rollback.
    Ok,
    /// The branch did no work and is already complete.
    ReadOnly,
}

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub(crate) xid: Xid,
    pub(crate) state: BranchState,
}

/// Roll back an active or ended branch on `conn`, best effort. Failures are
/// logged and leave the branch where it was.
pub(crate) fn abandon_branch(conn: &mut Connection) {
    let Some((xid, state)) = conn.branch().map(|branch| (branch.xid.clone(), branch.state)) else {
        return;
    };
    let commands = match state {
        BranchState::Active => vec![format!("XA END {xid}"), format!("XA ROLLBACK {xid}")],
        BranchState::Ended => vec![format!("XA ROLLBACK {xid}")],
        _ => return,
    };
    for sql in commands {
        if let Err(err) = conn.execute_direct(&sql) {
            tracing::warn!(%xid, error = %err, "rollback of abandoned branch failed");
            return;
        }
    }
    if let Some(branch) = conn.branch_mut() {
        branch.state = BranchState::RolledBack;
    }
    tracing::debug!(%xid, from = %state, "abandoned branch rolled back");
}

pub struct TransactionCoordinator<C: BorrowMut<Connection> = Connection> {
    connection: C,
    /// Xids returned by the latest `XA RECOVER`.
    in_doubt: Vec<Xid>,
    closed: bool,
}

impl<C: BorrowMut<Connection>> fmt::Debug for TransactionCoordinator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("connection", &self.connection().id())
            .field("branch", &self.connection().branch())
            .field("in_doubt", &self.in_doubt.len())
            .field("closed", &self.closed)
            .finish()
    }
}

fn protocol(operation: &'static str, state: impl fmt::Display) -> DriverError {
    DriverError::TransactionProtocol {
        operation,
        state: state.to_string(),
    }
}

impl<C: BorrowMut<Connection>> TransactionCoordinator<C> {
    pub fn new(connection: C) -> Self {
        TransactionCoordinator {
            connection,
            in_doubt: Vec::new(),
            closed: false,
        }
    }

    pub fn connection(&self) -> &Connection {
        self.connection.borrow()
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        self.connection.borrow_mut()
    }

    fn branch(&self) -> Option<&Branch> {
        self.connection().branch()
    }

    /// State of the session's branch, `None` before the first `start`.
    pub fn state(&self) -> Option<BranchState> {
        self.branch().map(|branch| branch.state)
    }

    pub fn current_xid(&self) -> Option<&Xid> {
        self.branch().map(|branch| &branch.xid)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DriverError::Closed("transaction coordinator"));
        }
        Ok(())
    }

    fn in_flight(&self) -> Option<&Branch> {
        self.branch()
            .filter(|branch| !branch.state.is_terminal())
    }

    /// Check that `xid` names the current branch and that it is in one of `allowed`.
    fn expect_state(&self, operation: &'static str, xid: &Xid, allowed: &[BranchState]) -> Result<()> {
        match self.branch() {
            Some(branch) if branch.xid != *xid => {
                Err(protocol(operation, format_args!("bound to another branch ({})", branch.state)))
            }
            Some(branch) if !allowed.contains(&branch.state) => Err(protocol(operation, branch.state)),
            Some(_) => Ok(()),
            None => Err(protocol(operation, "not started")),
        }
    }

    fn transition(&mut self, to: BranchState) {
        if let Some(branch) = self.connection_mut().branch_mut() {
            tracing::debug!(xid = %branch.xid, from = %branch.state, to = %to, "branch transition");
            branch.state = to;
        }
    }

    fn run(&mut self, sql: &str) -> Result<()> {
        self.connection_mut().execute_direct(sql).map(|_| ())
    }

    /// Whether `xid` came back from the latest recovery scan and no other
    /// branch is in flight on this connection.
    fn is_recoverable(&self, xid: &Xid) -> bool {
        self.in_flight().is_none() && self.in_doubt.contains(xid)
    }

    fn finish_recovered(&mut self, xid: &Xid, sql: &str) -> Result<()> {
        self.run(sql)?;
        self.in_doubt.retain(|x| x != xid);
        tracing::debug!(%xid, sql, "completed in-doubt branch");
        Ok(())
    }

    /// Begin a new branch. Only valid while no other branch is in flight.
    pub fn start(&mut self, xid: &Xid, flag: StartFlag) -> Result<()> {
        self.ensure_open()?;
        match flag {
            StartFlag::NoFlags => {}
            StartFlag::Join => return Err(DriverError::NotSupported("joining a branch")),
            StartFlag::Resume => return Err(DriverError::NotSupported("resuming a branch")),
        }
        if let Some(branch) = self.in_flight() {
            return Err(protocol("start", branch.state));
        }

        let connection = self.connection();
        let mode = if connection.is_read_only() {
            "READ ONLY"
        } else {
            "READ WRITE"
        };
        let isolation = connection
            .transaction_isolation()
            .map_or("", |level| level.start_clause());
        self.run(&format!("XA START {xid} {mode}{isolation}"))?;

        tracing::debug!(%xid, "branch started");
        self.connection_mut().set_branch(Some(Branch {
            xid: xid.clone(),
            state: BranchState::Active,
        }));
        Ok(())
    }

    pub fn end(&mut self, xid: &Xid, flag: EndFlag) -> Result<()> {
        self.ensure_open()?;
        if flag == EndFlag::Suspend {
            return Err(DriverError::NotSupported("suspending a branch"));
        }
        self.expect_state("end", xid, &[BranchState::Active])?;
        self.run(&format!("XA END {xid}"))?;
        self.transition(BranchState::Ended);
        Ok(())
    }

    /// First phase. A read-only connection completes the branch here.
    pub fn prepare(&mut self, xid: &Xid) -> Result<PrepareOutcome> {
        self.ensure_open()?;
        self.expect_state("prepare", xid, &[BranchState::Ended])?;
        self.run(&format!("XA PREPARE {xid}"))?;
        if self.connection().is_read_only() {
            self.transition(BranchState::Committed);
            Ok(PrepareOutcome::ReadOnly)
        } else {
            self.transition(BranchState::Prepared);
            Ok(PrepareOutcome::Ok)
        }
    }

    /// Second phase, or the whole commit when `one_phase` is set.
    ///
    /// One-phase commit needs an ended branch, two-phase a prepared one.
    pub fn commit(&mut self, xid: &Xid, one_phase: bool) -> Result<()> {
        self.ensure_open()?;
        if !one_phase && self.is_recoverable(xid) {
            return self.finish_recovered(xid, &format!("XA COMMIT {xid}"));
        }
        let required = if one_phase {
            BranchState::Ended
        } else {
            BranchState::Prepared
        };
        self.expect_state("commit", xid, &[required])?;
        let suffix = if one_phase { " ONE PHASE" } else { "" };
        self.run(&format!("XA COMMIT {xid}{suffix}"))?;
        self.transition(BranchState::Committed);
        Ok(())
    }

    pub fn rollback(&mut self, xid: &Xid) -> Result<()> {
        self.ensure_open()?;
        if self.is_recoverable(xid) {
            return self.finish_recovered(xid, &format!("XA ROLLBACK {xid}"));
        }
        self.expect_state("rollback", xid, &[BranchState::Ended, BranchState::Prepared])?;
        self.run(&format!("XA ROLLBACK {xid}"))?;
        self.transition(BranchState::RolledBack);
        Ok(())
    }

    /// Discard the server's record of a heuristically completed branch.
    pub fn forget(&mut self, xid: &Xid) -> Result<()> {
        self.ensure_open()?;
        if self.is_recoverable(xid) {
            return self.finish_recovered(xid, &format!("XA FORGET {xid}"));
        }
        self.expect_state("forget", xid, &[BranchState::Committed, BranchState::RolledBack])?;
        self.run(&format!("XA FORGET {xid}"))?;
        self.connection_mut().set_branch(None);
        Ok(())
    }

    /// List prepared branches the server holds.
    ///
    /// `StartScan` always returns the full list. Later calls in the same scan
    /// return an empty list when nothing changed since the previous call.
    pub fn recover(&mut self, flag: RecoverFlag) -> Result<Vec<Xid>> {
        self.ensure_open()?;
        let mut cursor = self.connection_mut().query_direct("XA RECOVER")?;
        let mut found = Vec::new();
        while cursor.next()? {
            let global_id = cursor.get_bytes(1)?;
            let branch_qualifier = cursor.get_bytes(2)?;
            let format_id = cursor.get_int(3)?;
            found.push(Xid::new(format_id, global_id.to_vec(), branch_qualifier.to_vec())?);
        }
        cursor.close();

        let unchanged = flag != RecoverFlag::StartScan
            && !self.in_doubt.is_empty()
            && self.in_doubt == found;
        tracing::debug!(?flag, count = found.len(), unchanged, "recovery scan");
        if unchanged {
            return Ok(Vec::new());
        }
        self.in_doubt = found.clone();
        Ok(found)
    }

    /// Stop coordinating. An active or ended branch is rolled back on a
    /// best-effort basis; a prepared branch is left for recovery. Closing twice
    /// is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.connection().is_closed() {
            return;
        }
        abandon_branch(self.connection_mut());
    }
}

impl<C: BorrowMut<Connection>> Drop for TransactionCoordinator<C> {
    fn drop(&mut self) {
        self.close();
    }
}
