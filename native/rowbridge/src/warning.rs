/// Advisory warnings attached to a cursor
///
/// Warnings record requests that were accepted but ignored. They are never raised;
/// callers read them back in the order they were appended.
use std::fmt;

use crate::constants::WARNING_SQL_STATE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    reason: String,
    sql_state: &'static str,
}

impl Warning {
    pub fn new(reason: impl Into<String>) -> Self {
        Warning {
            reason: reason.into(),
            sql_state: WARNING_SQL_STATE,
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn sql_state(&self) -> &'static str {
        self.sql_state
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.sql_state, self.reason)
    }
}

/// Append-only FIFO log, emptied only by `clear`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningChain {
    warnings: Vec<Warning>,
}

impl WarningChain {
    pub fn push(&mut self, warning: Warning) {
        tracing::debug!(reason = warning.reason(), "warning appended");
        self.warnings.push(warning);
    }

    pub fn first(&self) -> Option<&Warning> {
        self.warnings.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Warning> {
        self.warnings.iter()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn clear(&mut self) {
        self.warnings.clear();
    }
}

impl<'a> IntoIterator for &'a WarningChain {
    type Item = &'a Warning;
    type IntoIter = std::slice::Iter<'a, Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.warnings.iter()
    }
}
