//! Access token credentials.
//!
//! A [`Credential`] is the bearer token returned by the token endpoint together
//! with the moment it was issued and how long it stays valid. It is a value
//! object: refreshing produces a new credential, it never updates one in place.
//!
//! Validity is checked against wall-clock time with no skew margin. Hosts that
//! want to refresh early should persist a shortened credential via
//! [`Credential::with_safety_margin`].

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Secret;

/// A bearer access token with its issuance time and lifetime.
///
/// The serialized form is `{"access_token", "expires_in", "create_at"}` with
/// `create_at` in Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The token value.
    #[serde(rename = "access_token", default)]
    token: Secret,

    /// When the token endpoint handed out this token (millisecond precision).
    #[serde(rename = "create_at", with = "chrono::serde::ts_milliseconds")]
    issued_at: DateTime<Utc>,

    /// Lifetime in seconds, as reported by the token endpoint.
    #[serde(rename = "expires_in", default)]
    ttl_seconds: i64,
}

impl Credential {
    /// Create a credential issued now.
    pub fn new(token: impl Into<String>, ttl_seconds: i64) -> Self {
        Self::issued_at(token, Utc::now(), ttl_seconds)
    }

    /// Create a credential with an explicit issuance time.
    ///
    /// The timestamp is truncated to milliseconds so a credential survives a
    /// round trip through persistent storage unchanged.
    pub fn issued_at(token: impl Into<String>, issued_at: DateTime<Utc>, ttl_seconds: i64) -> Self {
        Self {
            token: Secret::new(token),
            issued_at: issued_at.trunc_subsecs(3),
            ttl_seconds,
        }
    }

    /// The bearer token.
    pub fn token(&self) -> &Secret {
        &self.token
    }

    /// When the token was issued.
    pub fn issued(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Lifetime in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// The instant at which the token stops being valid (exclusive).
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.ttl_seconds.max(0))
            .and_then(|ttl| self.issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the credential can be used at `now`.
    ///
    /// False for an empty token or a non-positive lifetime, regardless of
    /// timestamps. The expiry instant itself is already invalid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && self.ttl_seconds > 0 && now < self.expires_at()
    }

    /// Whether the credential can be used right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).max(Duration::zero())
    }

    /// A copy of this credential whose lifetime is shortened by `margin_seconds`.
    ///
    /// The lifetime never goes below zero, so an over-large margin yields a
    /// credential that is always invalid.
    pub fn with_safety_margin(&self, margin_seconds: i64) -> Self {
        Self {
            token: self.token.clone(),
            issued_at: self.issued_at,
            ttl_seconds: self.ttl_seconds.saturating_sub(margin_seconds.max(0)).max(0),
        }
    }
}
