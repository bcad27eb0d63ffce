// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for timestamps in the database
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

// used to print out readable forms of a data type
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

// ------------- Json -------------
// Opaque blobs (module configuration, field options and default values) are
// kept as JSON text. Their content is never inspected by the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json(pub serde_json::Value);

impl Json {
    pub fn null() -> Self {
        Self(serde_json::Value::Null)
    }
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}
impl From<serde_json::Value> for Json {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
impl fmt::Display for Json {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ToSql for Json {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}
impl FromSql for Json {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Json::null()),
            _ => serde_json::from_str(value.as_str()?)
                .map(Json)
                .map_err(|e| FromSqlError::Other(Box::new(e))),
        }
    }
}

// ------------- Time -------------
pub const DEFAULT_ROUNDING_MS: i64 = 1000;

/// Rounds a timestamp to the nearest multiple of `granularity`.
/// A granularity that cannot be applied leaves the timestamp untouched.
pub fn round_time(moment: DateTime<Utc>, granularity: TimeDelta) -> DateTime<Utc> {
    if granularity <= TimeDelta::zero() {
        return moment;
    }
    moment.duration_round(granularity).unwrap_or(moment)
}

/// Source of "now" for every timestamp the store writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    granularity: TimeDelta,
}
impl SystemClock {
    pub fn new(rounding_ms: i64) -> Self {
        Self {
            granularity: TimeDelta::milliseconds(rounding_ms),
        }
    }
}
impl Default for SystemClock {
    fn default() -> Self {
        Self::new(DEFAULT_ROUNDING_MS)
    }
}
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        round_time(Utc::now(), self.granularity)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    moment: Mutex<DateTime<Utc>>,
}
impl ManualClock {
    pub fn new(moment: DateTime<Utc>) -> Self {
        Self {
            moment: Mutex::new(moment),
        }
    }
    pub fn set(&self, moment: DateTime<Utc>) {
        *self.moment.lock().unwrap_or_else(PoisonError::into_inner) = moment;
    }
    pub fn advance(&self, by: TimeDelta) {
        let mut moment = self.moment.lock().unwrap_or_else(PoisonError::into_inner);
        *moment += by;
    }
}
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.moment.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
