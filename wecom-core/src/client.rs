//! The client facade.
//!
//! [`WecomClient`] runs every authenticated call through the same steps:
//!
//! 1. Load the corp's credential from the [`CredentialStore`].
//! 2. If it is still valid, use it. If it is expired, empty or missing,
//!    exchange the secret for a new one (which also saves it).
//! 3. Send the request with the token attached and classify the response.
//!
//! The client keeps no token of its own between calls; the store is the only
//! cache. A token that the server rejects as expired is reported as
//! [`ApiError::Remote`] and not retried. Callers that want to retry can call
//! [`WecomClient::refresh_access_token`] first.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use wecom_core::{FileStore, Recipients, TextMessage, WecomClient};
//!
//! let client = WecomClient::builder("ww1234567890abcdef", "corp-secret")
//!     .store(FileStore::new("/var/lib/wecom/tokens.json"))
//!     .build()?;
//!
//! let message = TextMessage::new(Recipients::users(["alice"]), "Build finished")
//!     .with_agent_id(1000002);
//! let receipt = client.send_text(&message).await?.into_inner();
//! println!("sent message {:?}", receipt.msgid);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::classify::classify;
use crate::config::{
    diagnose, ClientConfig, ConfigDiagnostic, ConfigError, DeploymentMode, MissingCredential,
};
use crate::credential::Credential;
use crate::endpoint::{Endpoints, DEFAULT_BASE_URL};
use crate::error::{ApiError, PersistenceFailure};
use crate::exchange::{Exchanged, TokenExchanger};
use crate::message::{SendReceipt, TextMessage, SEND_PATH};
use crate::model::{CorpId, Identity};
use crate::store::{create_store, CredentialStore, MemoryStore};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport, RequestDefaults};

/// A successful call, plus any non-fatal persistence failure it ran into.
#[derive(Debug)]
pub struct Response<T> {
    /// The decoded response.
    pub value: T,

    /// Set when a token was refreshed during the call but could not be
    /// saved. The call itself succeeded with the fresh token.
    pub persistence_failure: Option<PersistenceFailure>,
}

impl<T> Response<T> {
    /// Discard the persistence signal and return the value.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Return the value, or the persistence failure as an error.
    pub fn require_persisted(self) -> Result<T, ApiError> {
        match self.persistence_failure {
            Some(failure) => Err(ApiError::Persistence(failure)),
            None => Ok(self.value),
        }
    }

    /// Transform the value, keeping the persistence signal.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            value: f(self.value),
            persistence_failure: self.persistence_failure,
        }
    }
}

impl From<Exchanged> for Response<Credential> {
    fn from(exchanged: Exchanged) -> Self {
        Self {
            value: exchanged.credential,
            persistence_failure: exchanged.persistence_failure,
        }
    }
}

/// An authenticated API request, independent of the token it will carry.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    timeout: Option<Duration>,
}

impl ApiRequest {
    /// Create a request for `path` relative to the API base URL.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// A GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Set the JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a header; it takes precedence over the client's default headers.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Override the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Client for the WeCom server API, bound to one corp identity.
///
/// Cloning is cheap; clones share the store, the transport and the exchange
/// gate.
#[derive(Clone)]
pub struct WecomClient {
    identity: Identity,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    exchanger: TokenExchanger,
    endpoints: Endpoints,
    defaults: RequestDefaults,
    missing_credential: MissingCredential,
    // Held around token exchanges when single-flight is on.
    exchange_gate: Option<Arc<tokio::sync::Mutex<()>>>,
    diagnostics: Vec<ConfigDiagnostic>,
}

impl WecomClient {
    /// Start building a client for a corp.
    pub fn builder(corp_id: impl Into<CorpId>, corp_secret: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(corp_id, corp_secret)
    }

    /// Build a client from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(ClientBuilder::from_config(config)?.build()?)
    }

    /// The corp this client acts for.
    pub fn corp_id(&self) -> &CorpId {
        self.identity.corp_id()
    }

    /// Diagnostics raised while building the client.
    pub fn diagnostics(&self) -> &[ConfigDiagnostic] {
        &self.diagnostics
    }

    /// The credential store in use.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Get a usable access token, exchanging the secret if needed.
    pub async fn access_token(&self) -> Result<Response<Credential>, ApiError> {
        let corp_id = self.identity.corp_id();

        match self.store.load(corp_id).await? {
            Some(credential) if credential.is_valid() => {
                tracing::debug!("Using cached access token for {}", corp_id);
                return Ok(Response {
                    value: credential,
                    persistence_failure: None,
                });
            }
            Some(credential) if !credential.token().is_empty() => {
                tracing::info!(
                    "Access token for {} expired at {}, refreshing",
                    corp_id,
                    credential.expires_at()
                );
            }
            _ if self.missing_credential == MissingCredential::Fail => {
                return Err(ApiError::NoCredential {
                    corp_id: corp_id.clone(),
                });
            }
            _ => {
                tracing::debug!("No access token stored for {}, requesting one", corp_id);
            }
        }

        self.exchange(false).await.map(Response::from)
    }

    /// Exchange the secret for a new access token regardless of what is cached.
    pub async fn refresh_access_token(&self) -> Result<Response<Credential>, ApiError> {
        self.exchange(true).await.map(Response::from)
    }

    /// Remove the stored access token for this corp.
    pub async fn clear_access_token(&self) -> Result<(), ApiError> {
        self.store.clear(self.identity.corp_id()).await?;
        tracing::info!("Cleared stored access token for {}", self.identity.corp_id());
        Ok(())
    }

    /// Send a text message.
    pub async fn send_text(&self, message: &TextMessage) -> Result<Response<SendReceipt>, ApiError> {
        if message.recipients.is_empty() {
            return Err(ApiError::Config(ConfigError::Invalid {
                message: "text message has no recipients".to_string(),
            }));
        }
        self.call(ApiRequest::post(SEND_PATH).json(message.to_payload()))
            .await
    }

    /// Make an authenticated call and decode the response into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Response<T>, ApiError> {
        let url = self.endpoints.url(&request.path)?;
        let Response {
            value: credential,
            persistence_failure,
        } = self.access_token().await?;

        let mut http = HttpRequest::new(request.method, url);
        http.query
            .push(("access_token".to_string(), credential.token().expose().to_string()));
        http.query.extend(request.query);
        http.headers = request.headers;
        http.body = request.body;
        http.timeout = request.timeout;
        self.defaults.apply(&mut http);

        tracing::debug!("Dispatching {} {}", http.method, request.path);
        let outcome = self.transport.execute(http).await;

        match classify(outcome) {
            Ok(value) => Ok(Response {
                value,
                persistence_failure,
            }),
            Err(e) => {
                if e.is_token_rejected() {
                    tracing::warn!(
                        "Access token for {} was rejected by the server: {}",
                        self.identity.corp_id(),
                        e
                    );
                }
                Err(e.with_persistence(persistence_failure))
            }
        }
    }

    async fn exchange(&self, forced: bool) -> Result<Exchanged, ApiError> {
        let Some(gate) = &self.exchange_gate else {
            return self
                .exchanger
                .exchange(&self.identity, self.store.as_ref())
                .await;
        };

        let _permit = gate.lock().await;
        let corp_id = self.identity.corp_id();

        if !forced {
            if let Some(credential) = self.store.load(corp_id).await? {
                if credential.is_valid() {
                    tracing::debug!(
                        "Access token for {} was refreshed by a concurrent call",
                        corp_id
                    );
                    return Ok(Exchanged {
                        credential,
                        persistence_failure: None,
                    });
                }
            }
        }

        self.exchanger
            .exchange(&self.identity, self.store.as_ref())
            .await
    }
}

impl std::fmt::Debug for WecomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WecomClient")
            .field("corp_id", self.identity.corp_id())
            .field("store", &self.store.backend_name())
            .field("endpoints", &self.endpoints)
            .field("single_flight", &self.exchange_gate.is_some())
            .finish()
    }
}

/// Builder for [`WecomClient`].
pub struct ClientBuilder {
    identity: Identity,
    base_url: String,
    store: Option<Arc<dyn CredentialStore>>,
    transport: Option<Arc<dyn HttpTransport>>,
    defaults: RequestDefaults,
    deployment_mode: DeploymentMode,
    missing_credential: MissingCredential,
    single_flight: bool,
    strict: bool,
}

impl ClientBuilder {
    /// Create a builder with default settings: production base URL, memory
    /// store, reqwest transport, single-process mode.
    pub fn new(corp_id: impl Into<CorpId>, corp_secret: impl Into<String>) -> Self {
        Self {
            identity: Identity::new(corp_id, corp_secret),
            base_url: DEFAULT_BASE_URL.to_string(),
            store: None,
            transport: None,
            defaults: RequestDefaults::default(),
            deployment_mode: DeploymentMode::default(),
            missing_credential: MissingCredential::default(),
            single_flight: false,
            strict: false,
        }
    }

    /// Create a builder from configuration, including its storage backend.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let store = create_store(&config.store)?;

        Ok(Self::new(config.corp_id.as_str(), config.corp_secret()?.expose())
            .base_url(&config.base_url)
            .shared_store(store)
            .request_defaults(config.request.to_defaults()?)
            .deployment_mode(config.deployment_mode)
            .missing_credential(config.missing_credential)
            .single_flight(config.single_flight)
            .strict(config.strict))
    }

    /// Set the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a credential store.
    pub fn store(self, store: impl CredentialStore + 'static) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Use a credential store that is shared with other owners.
    pub fn shared_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom HTTP transport.
    pub fn transport(mut self, transport: impl HttpTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Options merged into every request.
    pub fn request_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Add a header sent with every request.
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.defaults.headers.insert(name, value);
        self
    }

    /// Timeout for requests that do not set their own.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Declare how the client is deployed.
    pub fn deployment_mode(mut self, mode: DeploymentMode) -> Self {
        self.deployment_mode = mode;
        self
    }

    /// Policy for a corp that has never been issued a token.
    pub fn missing_credential(mut self, policy: MissingCredential) -> Self {
        self.missing_credential = policy;
        self
    }

    /// Serialize token exchanges per corp within this process.
    ///
    /// Off by default: concurrent calls that all find an expired token each
    /// perform their own exchange.
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Fail [`build`](Self::build) when a configuration diagnostic is raised.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<WecomClient, ConfigError> {
        if self.identity.corp_id().is_empty() {
            return Err(ConfigError::Missing { field: "corp_id" });
        }
        if self.identity.secret().is_empty() {
            return Err(ConfigError::Missing {
                field: "corp_secret",
            });
        }

        let endpoints = Endpoints::new(&self.base_url)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));

        let diagnostics = diagnose(
            self.deployment_mode,
            store.is_shared(),
            store.backend_name(),
        );
        for diagnostic in &diagnostics {
            tracing::warn!("{}", diagnostic);
        }
        if self.strict && !diagnostics.is_empty() {
            return Err(ConfigError::Rejected(diagnostics));
        }

        let exchanger =
            TokenExchanger::new(transport.clone(), endpoints.clone(), self.defaults.clone());

        Ok(WecomClient {
            identity: self.identity,
            store,
            transport,
            exchanger,
            endpoints,
            defaults: self.defaults,
            missing_credential: self.missing_credential,
            exchange_gate: self.single_flight.then(Arc::default),
            diagnostics,
        })
    }
}
