//! HTTP transport seam.
//!
//! The client never talks to `reqwest` directly; it hands an [`HttpRequest`] to
//! an [`HttpTransport`] and gets back either an [`HttpResponse`] or a
//! [`TransportError`]. [`ReqwestTransport`] is the default implementation.
//! Timeouts and cancellation are entirely the transport's business.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Error raised when a request could not be completed at the transport level.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Error reported by the HTTP client.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Error reported by a host-supplied transport.
    #[error("{message}")]
    Other { message: String },
}

impl TransportError {
    /// Whether the request timed out.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            Self::Other { .. } => false,
        }
    }
}

/// One outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,

    /// Endpoint URL, without the query parameters below.
    pub url: Url,

    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,

    /// Request headers.
    pub headers: HeaderMap,

    /// JSON body, if any.
    pub body: Option<serde_json::Value>,

    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Create a request with no query, headers, or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Look up a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status.
    pub status: StatusCode,

    /// Raw response body.
    pub body: Vec<u8>,
}

/// Options merged into every outbound request.
///
/// Headers set on an individual request win over these defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestDefaults {
    /// Headers added to every request.
    pub headers: HeaderMap,

    /// Timeout applied when a request has none of its own.
    pub timeout: Option<Duration>,
}

impl RequestDefaults {
    /// Merge these defaults into a request.
    pub fn apply(&self, request: &mut HttpRequest) {
        for (name, value) in &self.headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        if request.timeout.is_none() {
            request.timeout = self.timeout;
        }
    }
}

/// Issues HTTP requests on behalf of the client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and return the raw response.
    ///
    /// Non-success statuses are returned as responses, not errors; only
    /// failures to complete the exchange are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh `reqwest::Client`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, USER_AGENT};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_defaults_do_not_override_request_headers() {
        let mut defaults = RequestDefaults::default();
        defaults
            .headers
            .insert(USER_AGENT, HeaderValue::from_static("default-agent"));
        defaults
            .headers
            .insert("x-trace", HeaderValue::from_static("on"));
        defaults.timeout = Some(Duration::from_secs(3));

        let mut request = HttpRequest::new(Method::GET, Url::parse("http://localhost/").unwrap());
        request
            .headers
            .insert(USER_AGENT, HeaderValue::from_static("call-agent"));
        defaults.apply(&mut request);

        assert_eq!(request.headers[USER_AGENT], "call-agent");
        assert_eq!(request.headers["x-trace"], "on");
        assert_eq!(request.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_request_timeout_wins_over_default() {
        let defaults = RequestDefaults {
            headers: HeaderMap::new(),
            timeout: Some(Duration::from_secs(3)),
        };
        let mut request = HttpRequest::new(Method::GET, Url::parse("http://localhost/").unwrap());
        request.timeout = Some(Duration::from_secs(1));
        defaults.apply(&mut request);

        assert_eq!(request.timeout, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_reqwest_transport_sends_query_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(query_param("access_token", "abc"))
            .and(header("x-trace", "on"))
            .and(body_json(serde_json::json!({"hello": "world"})))
            .respond_with(ResponseTemplate::new(201).set_body_string("done"))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = HttpRequest::new(
            Method::POST,
            Url::parse(&format!("{}/echo", server.uri())).unwrap(),
        );
        request.query.push(("access_token".to_string(), "abc".to_string()));
        request
            .headers
            .insert("x-trace", HeaderValue::from_static("on"));
        request.body = Some(serde_json::json!({"hello": "world"}));

        let response = ReqwestTransport::new().execute(request).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body, b"done");
    }

    #[tokio::test]
    async fn test_reqwest_transport_connection_refused_is_error() {
        let request = HttpRequest::new(
            Method::GET,
            Url::parse("http://127.0.0.1:1/unreachable").unwrap(),
        );
        let result = ReqwestTransport::new().execute(request).await;
        assert!(matches!(result, Err(TransportError::Http(_))));
    }
}
