//! Top-level error types.
//!
//! Every boundary call returns a [`Result`] with [`ApiError`]. Remote
//! application errors keep their numeric `errcode` so callers can branch on
//! it, and a failed credential save after a successful exchange is reported
//! as a [`PersistenceFailure`] without aborting the call in flight.

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::model::CorpId;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Well-known WeCom `errcode` values.
pub mod codes {
    /// The service is busy; the request may be retried later.
    pub const SYSTEM_BUSY: i64 = -1;
    /// The corp secret is wrong or the credential is invalid.
    pub const INVALID_CREDENTIAL: i64 = 40001;
    /// The corp ID is not valid.
    pub const INVALID_CORP_ID: i64 = 40013;
    /// The access token is not valid.
    pub const INVALID_ACCESS_TOKEN: i64 = 40014;
    /// No access token was supplied.
    pub const ACCESS_TOKEN_MISSING: i64 = 41001;
    /// The access token has expired.
    pub const ACCESS_TOKEN_EXPIRED: i64 = 42001;
}

/// A credential obtained from the token endpoint could not be saved.
///
/// The fresh credential was still used for the call in flight; the store may
/// now hold a stale or missing entry.
#[derive(Debug, Error)]
#[error("failed to persist access token for {corp_id}: {source}")]
pub struct PersistenceFailure {
    /// The corp whose credential was not saved.
    pub corp_id: CorpId,

    /// What the store reported.
    #[source]
    pub source: StoreError,
}

/// Error type for calls against the WeCom API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The transport itself failed (network, DNS, timeout).
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The API answered with a non-zero `errcode`.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// No credential has ever been established for this corp and the client
    /// is configured not to fetch one on its own.
    #[error("no access token for {corp_id}, please authorize first")]
    NoCredential { corp_id: CorpId },

    /// The credential store failed to load.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// The response body was not the JSON that was expected.
    #[error("invalid response body (HTTP {status}): {source}")]
    Decode {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    /// A non-success HTTP status without an application error code.
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// The client configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A credential save failed and the caller asked for it to be fatal.
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),

    /// The call failed after the refreshed credential also failed to persist.
    #[error("{error} (additionally: {persistence})")]
    AfterPersistenceFailure {
        error: Box<ApiError>,
        persistence: PersistenceFailure,
    },
}

impl ApiError {
    /// The remote `errcode`, looking through persistence wrappers.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            Self::AfterPersistenceFailure { error, .. } => error.remote_code(),
            _ => None,
        }
    }

    /// Whether the remote side rejected the access token.
    ///
    /// The client does not retry these; callers that want to can force a
    /// refresh with `WecomClient::refresh_access_token` and try again.
    pub fn is_token_rejected(&self) -> bool {
        matches!(
            self.remote_code(),
            Some(codes::INVALID_ACCESS_TOKEN | codes::ACCESS_TOKEN_MISSING | codes::ACCESS_TOKEN_EXPIRED)
        )
    }

    /// Whether the failure happened below the API (network, DNS, timeout).
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::AfterPersistenceFailure { error, .. } => error.is_transport(),
            _ => false,
        }
    }

    /// The persistence failure attached to this error, if any.
    pub fn persistence_failure(&self) -> Option<&PersistenceFailure> {
        match self {
            Self::Persistence(failure) => Some(failure),
            Self::AfterPersistenceFailure { persistence, .. } => Some(persistence),
            _ => None,
        }
    }

    pub(crate) fn with_persistence(self, persistence: Option<PersistenceFailure>) -> Self {
        match persistence {
            Some(persistence) => Self::AfterPersistenceFailure {
                error: Box::new(self),
                persistence,
            },
            None => self,
        }
    }
}
