//! Token exchange.
//!
//! [`TokenExchanger`] trades a corp ID and its secret for a fresh access token
//! at `GET /cgi-bin/gettoken?corpid=..&corpsecret=..`, then writes the new
//! [`Credential`] through to the store before handing it back.

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;

use crate::classify::classify;
use crate::credential::Credential;
use crate::endpoint::Endpoints;
use crate::error::{ApiError, PersistenceFailure};
use crate::model::Identity;
use crate::store::CredentialStore;
use crate::transport::{HttpRequest, HttpTransport, RequestDefaults};

/// Path of the token issuance endpoint, relative to the API base URL.
pub const TOKEN_PATH: &str = "cgi-bin/gettoken";

/// Success payload of the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Result of a successful exchange.
#[derive(Debug)]
pub struct Exchanged {
    /// The freshly issued credential.
    pub credential: Credential,

    /// Set when the credential could not be saved. The credential is still
    /// usable; the store just does not know about it.
    pub persistence_failure: Option<PersistenceFailure>,
}

/// Exchanges an [`Identity`] for a fresh [`Credential`].
#[derive(Clone)]
pub struct TokenExchanger {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
    defaults: RequestDefaults,
}

impl TokenExchanger {
    /// Create an exchanger that talks to `endpoints` over `transport`.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: Endpoints,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            transport,
            endpoints,
            defaults,
        }
    }

    /// Request a new access token and persist it.
    ///
    /// Exactly one request is made. An application error from the token
    /// endpoint is returned as [`ApiError::Remote`] and nothing is saved. A
    /// failing save does not fail the exchange; it is reported through
    /// [`Exchanged::persistence_failure`].
    pub async fn exchange(
        &self,
        identity: &Identity,
        store: &dyn CredentialStore,
    ) -> Result<Exchanged, ApiError> {
        let corp_id = identity.corp_id();

        let mut request = HttpRequest::new(Method::GET, self.endpoints.url(TOKEN_PATH)?);
        request.query = vec![
            ("corpid".to_string(), corp_id.to_string()),
            ("corpsecret".to_string(), identity.secret().expose().to_string()),
        ];
        self.defaults.apply(&mut request);

        tracing::info!("Requesting access token for {}", corp_id);
        let outcome = self.transport.execute(request).await;
        let issued: TokenResponse = classify(outcome).map_err(|e| {
            tracing::error!("Failed to obtain access token for {}: {}", corp_id, e);
            e
        })?;

        let credential = Credential::new(issued.access_token, issued.expires_in);

        let persistence_failure = match store.save(corp_id, &credential).await {
            Ok(()) => {
                tracing::debug!(
                    "Stored access token for {} in {} store (valid for {}s)",
                    corp_id,
                    store.backend_name(),
                    credential.ttl_seconds()
                );
                None
            }
            Err(source) => {
                tracing::warn!(
                    "Obtained access token for {} but could not store it: {}",
                    corp_id,
                    source
                );
                Some(PersistenceFailure {
                    corp_id: corp_id.clone(),
                    source,
                })
            }
        };

        Ok(Exchanged {
            credential,
            persistence_failure,
        })
    }
}

impl std::fmt::Debug for TokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchanger")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CorpId;
    use crate::store::{MemoryStore, StoreError};
    use crate::transport::ReqwestTransport;
    use async_trait::async_trait;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FailingStore;

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn load(&self, _: &CorpId) -> Result<Option<Credential>, StoreError> {
            Ok(None)
        }

        async fn save(&self, _: &CorpId, _: &Credential) -> Result<(), StoreError> {
            Err(StoreError::BackendError {
                message: "read-only".to_string(),
            })
        }

        async fn clear(&self, _: &CorpId) -> Result<(), StoreError> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    fn exchanger(server: &MockServer) -> TokenExchanger {
        TokenExchanger::new(
            Arc::new(ReqwestTransport::new()),
            Endpoints::new(&server.uri()).unwrap(),
            RequestDefaults::default(),
        )
    }

    #[tokio::test]
    async fn test_exchange_persists_fresh_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .and(query_param("corpid", "ww1"))
            .and(query_param("corpsecret", "s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "errmsg": "ok",
                "access_token": "fresh-token",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let identity = Identity::new("ww1", "s3cret");

        let exchanged = exchanger(&server).exchange(&identity, &store).await.unwrap();

        assert!(exchanged.persistence_failure.is_none());
        assert_eq!(exchanged.credential.token().expose(), "fresh-token");
        assert_eq!(exchanged.credential.ttl_seconds(), 7200);

        let saved = store.load(identity.corp_id()).await.unwrap().unwrap();
        assert_eq!(saved, exchanged.credential);
        assert!(saved.is_valid());
    }

    #[tokio::test]
    async fn test_exchange_remote_error_saves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 40001,
                "errmsg": "invalid credential"
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let identity = Identity::new("ww1", "wrong");

        let err = exchanger(&server)
            .exchange(&identity, &store)
            .await
            .unwrap_err();

        assert_eq!(err.remote_code(), Some(40001));
        assert!(store.load(identity.corp_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exchange_save_failure_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "expires_in": 7200
            })))
            .mount(&server)
            .await;

        let identity = Identity::new("ww1", "s3cret");
        let exchanged = exchanger(&server)
            .exchange(&identity, &FailingStore)
            .await
            .unwrap();

        assert_eq!(exchanged.credential.token().expose(), "fresh-token");
        let failure = exchanged.persistence_failure.unwrap();
        assert_eq!(failure.corp_id.as_str(), "ww1");
        assert!(matches!(failure.source, StoreError::BackendError { .. }));
    }

    #[tokio::test]
    async fn test_exchange_missing_token_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "errmsg": "ok"
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let err = exchanger(&server)
            .exchange(&Identity::new("ww1", "s"), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
