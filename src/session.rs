//! Session identity and time source

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the random suffix appended to session tokens
const SESSION_SUFFIX_LEN: usize = 9;

/// Opaque session token, fixed for the lifetime of a collector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a token of the form `session_<unix millis>_<random suffix>`.
    ///
    /// The suffix comes from a v4 UUID, so two sessions started in the same
    /// millisecond still differ with overwhelming probability.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        let suffix = &random[..SESSION_SUFFIX_LEN];
        Self(format!("session_{}_{}", now.timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One browsing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(now),
            started_at: now,
        }
    }
}

/// Wall-clock source for record timestamps
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clamps a clock to never run backwards.
///
/// Every timestamp the collector stamps goes through here, which keeps each
/// record list non-decreasing in append order even when the wall clock steps
/// back.
pub(crate) struct MonotonicClock {
    inner: Box<dyn Clock>,
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    pub(crate) fn new(inner: Box<dyn Clock>) -> Self {
        Self { inner, last: None }
    }

    pub(crate) fn now(&mut self) -> DateTime<Utc> {
        let reading = self.inner.now();
        let now = match self.last {
            Some(last) if reading < last => last,
            _ => reading,
        };
        self.last = Some(now);
        now
    }
}
