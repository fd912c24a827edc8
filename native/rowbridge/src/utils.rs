/// Utility functions and helpers for rowbridge
///
/// Locking helpers that turn mutex poisoning into `DriverError::Internal`,
/// statement classification, and hex rendering.
use std::sync::{Mutex, MutexGuard};

use crate::error::{DriverError, Result};

/// Safely lock a mutex with proper error handling
///
/// Returns a descriptive error if the mutex is poisoned.
pub fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|e| DriverError::Internal(format!("Mutex poisoned in {context}: {e}")))
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// For paths that must not fail, such as returning a connection to its pool.
pub fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Case-insensitive ASCII keyword match at `bytes[at..]`, bounded by whitespace,
/// `(` or the end of input on the right.
fn keyword_at(bytes: &[u8], at: usize, keyword: &[u8]) -> bool {
    let end = at + keyword.len();
    end <= bytes.len()
        && bytes[at..end].eq_ignore_ascii_case(keyword)
        && bytes
            .get(end)
            .is_none_or(|c| c.is_ascii_whitespace() || *c == b'(')
}

/// Keywords that open a row-returning statement.
const ROW_KEYWORDS: [&[u8]; 4] = [b"SELECT", b"WITH", b"VALUES", b"PRAGMA"];

/// Determines if a statement returns rows and so must run through `query`.
///
/// True for statements opening with SELECT, WITH, VALUES or PRAGMA, for
/// `XA RECOVER`, and for any statement carrying a RETURNING clause.
///
/// This is keyword matching, not parsing: a RETURNING inside a string literal or
/// comment also matches. A false positive only routes the statement through
/// `query`, which still succeeds.
pub fn should_use_query(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let Some(start) = bytes.iter().position(|c| !c.is_ascii_whitespace()) else {
        return false;
    };

    if ROW_KEYWORDS
        .iter()
        .any(|keyword| keyword_at(bytes, start, keyword))
    {
        return true;
    }

    if keyword_at(bytes, start, b"XA") {
        let rest = start + 2;
        if let Some(offset) = bytes[rest..].iter().position(|c| !c.is_ascii_whitespace()) {
            if keyword_at(bytes, rest + offset, b"RECOVER") {
                return true;
            }
        }
    }

    (0..bytes.len()).any(|i| {
        (i == 0 || bytes[i - 1].is_ascii_whitespace()) && keyword_at(bytes, i, b"RETURNING")
    })
}

/// Upper-case hexadecimal rendering of `bytes`.
pub fn hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(DIGITS[usize::from(byte >> 4)]));
        out.push(char::from(DIGITS[usize::from(byte & 0x0f)]));
    }
    out
}
