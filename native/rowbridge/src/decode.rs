/// Decoding of raw caller codes and options
///
/// This module converts the integer codes and keyword options that cross the
/// driver boundary into typed values. Anything outside the accepted set is a
/// `BadArgument`.
use std::time::Duration;

use crate::constants::*;
use crate::error::{DriverError, Result};
use crate::models::{DriverOptions, FetchDirection, IsolationLevel};
use crate::transaction::{EndFlag, RecoverFlag, StartFlag};

pub fn decode_fetch_direction(code: i32) -> Result<FetchDirection> {
    match code {
        FETCH_FORWARD => Ok(FetchDirection::Forward),
        FETCH_REVERSE => Ok(FetchDirection::Reverse),
        FETCH_UNKNOWN => Ok(FetchDirection::Unknown),
        other => Err(DriverError::bad_argument(format!(
            "unknown fetch direction {other}"
        ))),
    }
}

/// `TRANSACTION_NONE` decodes to `None`: no isolation clause is sent and the
/// server default applies.
pub fn decode_isolation_level(code: i32) -> Result<Option<IsolationLevel>> {
    match code {
        TRANSACTION_NONE => Ok(None),
        TRANSACTION_READ_UNCOMMITTED => Ok(Some(IsolationLevel::ReadUncommitted)),
        TRANSACTION_READ_COMMITTED => Ok(Some(IsolationLevel::ReadCommitted)),
        TRANSACTION_REPEATABLE_READ => Ok(Some(IsolationLevel::RepeatableRead)),
        TRANSACTION_SERIALIZABLE => Ok(Some(IsolationLevel::Serializable)),
        TRANSACTION_USING_SNAPSHOT => Ok(Some(IsolationLevel::UsingSnapshot)),
        other => Err(DriverError::bad_argument(format!(
            "unknown isolation level {other}"
        ))),
    }
}

pub fn decode_start_flag(code: i32) -> Result<StartFlag> {
    match code {
        TMNOFLAGS => Ok(StartFlag::NoFlags),
        TMJOIN => Ok(StartFlag::Join),
        TMRESUME => Ok(StartFlag::Resume),
        other => Err(DriverError::bad_argument(format!(
            "invalid flag {other:#x} for start"
        ))),
    }
}

pub fn decode_end_flag(code: i32) -> Result<EndFlag> {
    match code {
        TMSUCCESS => Ok(EndFlag::Success),
        TMFAIL => Ok(EndFlag::Fail),
        TMSUSPEND => Ok(EndFlag::Suspend),
        other => Err(DriverError::bad_argument(format!(
            "invalid flag {other:#x} for end"
        ))),
    }
}

pub fn decode_recover_flag(code: i32) -> Result<RecoverFlag> {
    match code {
        TMSTARTRSCAN => Ok(RecoverFlag::StartScan),
        TMENDRSCAN => Ok(RecoverFlag::EndScan),
        TMNOFLAGS => Ok(RecoverFlag::NoFlags),
        other => Err(DriverError::bad_argument(format!(
            "invalid flag {other:#x} for recover"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DriverError::bad_argument(format!("option `{key}` expects a number, got '{value}'")))
}

/// Decode keyword options such as those of a connection string.
///
/// Recognized keys: `database`, `uri`, `auth_token`, `user`, `pool_size`,
/// `timeout_ms`, `dial_timeout_secs`. Unknown keys are ignored.
pub fn decode_options<'a, I>(pairs: I) -> Result<DriverOptions>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut options = DriverOptions::default();
    for (key, value) in pairs {
        match key {
            "database" => options.database = Some(value.to_string()),
            "uri" => options.uri = Some(value.to_string()),
            "auth_token" => options.auth_token = Some(value.to_string()),
            "user" => options.user = Some(value.to_string()),
            "pool_size" => {
                let size: usize = parse_number(key, value)?;
                if size == 0 {
                    return Err(DriverError::bad_argument("option `pool_size` must be at least 1"));
                }
                options.pool_size = Some(size);
            }
            "timeout_ms" => {
                options.admission_timeout = Some(Duration::from_millis(parse_number(key, value)?));
            }
            "dial_timeout_secs" => {
                options.dial_timeout = Some(Duration::from_secs(parse_number(key, value)?));
            }
            other => tracing::debug!(key = other, "ignoring unknown option"),
        }
    }
    Ok(options)
}
