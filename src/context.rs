//! Per-request execution context.
//!
//! The cache freezes a single timestamp per request so that every TTL and
//! invalidation comparison within one logical operation sequence sees the
//! same "now". The current user and session key feed the session-tier key
//! namespace. Constructing the context explicitly (rather than reading
//! process-wide state) keeps the loaders testable with synthetic clocks
//! and users.

use time::OffsetDateTime;

/// Context threaded through every cache operation for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Frozen epoch-seconds timestamp for this request.
    pub now: i64,
    /// The user the request is acting as, if any.
    pub user_id: Option<i64>,
    /// Opaque session key; namespaces session-tier caches and lock owners.
    pub session_key: String,
}

impl RequestContext {
    /// Context with a frozen wall-clock timestamp and no user.
    pub fn capture() -> Self {
        Self::at(OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Context frozen at an explicit timestamp. Useful in tests.
    pub fn at(now: i64) -> Self {
        Self {
            now,
            user_id: None,
            session_key: String::from("global"),
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = session_key.into();
        self
    }
}
