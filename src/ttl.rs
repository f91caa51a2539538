//! Expiry envelope for stores without native TTL.
//!
//! When a definition declares a TTL but its store cannot expire entries
//! itself, values are wrapped with an absolute expiry stamp computed from
//! the request's frozen clock. Expiry checks compare against that same
//! frozen clock, so one logical operation sequence can never observe an
//! entry as both live and expired.

use crate::store::Payload;

/// A payload paired with its absolute expiry time (epoch seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct TtlWrapper {
    payload: Payload,
    expires_at: i64,
}

impl TtlWrapper {
    /// Wrap `payload`, expiring `ttl_secs` after the frozen `now`.
    pub fn new(payload: Payload, ttl_secs: i64, now: i64) -> Self {
        Self {
            payload,
            expires_at: now + ttl_secs,
        }
    }

    pub fn has_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}
