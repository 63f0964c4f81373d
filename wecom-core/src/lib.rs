//! # WeCom Core
//!
//! Client library for the WeCom (WeChat Work) server API.
//!
//! This crate provides:
//! - Access token lifecycle: load from a store, exchange on expiry, write through
//! - Pluggable credential storage (memory, JSON file, and optionally the OS keyring)
//! - A pluggable HTTP transport with a `reqwest` default
//! - Response classification into transport, remote, and decode errors
//! - Text message dispatch
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wecom_core::{Recipients, TextMessage, WecomClient};
//!
//! async fn notify() -> Result<(), wecom_core::ApiError> {
//!     let client = WecomClient::builder("ww1234567890abcdef", "corp-secret").build()?;
//!     let message = TextMessage::new(Recipients::all(), "Deploy finished").with_agent_id(1000002);
//!     let receipt = client.send_text(&message).await?.into_inner();
//!     assert!(receipt.all_delivered());
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod message;
pub mod model;
pub mod store;
pub mod transport;

// Re-export commonly used types at crate root
pub use model::{CorpId, Identity};

pub use credential::Credential;

pub use store::{create_store, CredentialStore, FileStore, MemoryStore, Secret, StoreError};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RequestDefaults, TransportError,
};

pub use classify::classify;

pub use endpoint::{Endpoints, DEFAULT_BASE_URL};

pub use error::{codes, ApiError, PersistenceFailure};

pub use exchange::{Exchanged, TokenExchanger};

pub use message::{Recipients, SendReceipt, TextMessage};

pub use config::{
    ClientConfig, ConfigDiagnostic, ConfigError, DeploymentMode, MissingCredential, StoreConfig,
    StoreKind,
};

pub use client::{ApiRequest, ClientBuilder, Response, WecomClient};
