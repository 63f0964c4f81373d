//! Integration tests for the authenticated send flow.
//!
//! These tests run a WecomClient against a mock WeCom server and verify that:
//! - Tokens are exchanged only when the store has no valid one
//! - Fresh tokens are saved and then used for dispatch
//! - Remote and transport failures surface as structured errors
//! - Single-flight collapses concurrent exchanges into one

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wecom_core::{
    ApiError, CorpId, Credential, CredentialStore, MemoryStore, Recipients, TextMessage,
    WecomClient,
};
use wiremock::{
    matchers::{body_partial_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const CORP_ID: &str = "ww-test-corp";
const SECRET: &str = "test-secret";

/// Mount the token endpoint, answering with `token`.
async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/gettoken"))
        .and(query_param("corpid", CORP_ID))
        .and(query_param("corpsecret", SECRET))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 0,
            "errmsg": "ok",
            "access_token": token,
            "expires_in": 7200
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Mount the send endpoint, accepting only `token`.
async fn mount_send(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/send"))
        .and(query_param("access_token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 0,
            "errmsg": "ok",
            "msgid": "msg-1"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn client(server: &MockServer, store: MemoryStore) -> WecomClient {
    WecomClient::builder(CORP_ID, SECRET)
        .base_url(server.uri())
        .store(store)
        .build()
        .unwrap()
}

fn message() -> TextMessage {
    TextMessage::new(Recipients::users(["alice", "bob"]), "Build #42 passed").with_agent_id(1000002)
}

async fn seeded_store(credential: Credential) -> MemoryStore {
    let store = MemoryStore::new();
    store.save(&CorpId::new(CORP_ID), &credential).await.unwrap();
    store
}

#[tokio::test]
async fn test_absent_token_is_exchanged_once_before_dispatch() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh-token", 1).await;
    mount_send(&server, "fresh-token", 1).await;

    let client = client(&server, MemoryStore::new());
    let response = client.send_text(&message()).await.unwrap();

    assert!(response.persistence_failure.is_none());
    let receipt = response.into_inner();
    assert_eq!(receipt.msgid.as_deref(), Some("msg-1"));
    assert!(receipt.all_delivered());
}

#[tokio::test]
async fn test_exchanged_token_is_valid_right_after_save() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh-token", 1).await;
    mount_send(&server, "fresh-token", 1).await;

    let client = client(&server, MemoryStore::new());
    client.send_text(&message()).await.unwrap();

    let stored = client
        .store()
        .load(&CorpId::new(CORP_ID))
        .await
        .unwrap()
        .expect("token should be stored");
    assert_eq!(stored.token().expose(), "fresh-token");
    assert_eq!(stored.ttl_seconds(), 7200);
    assert!(stored.is_valid());
}

#[tokio::test]
async fn test_valid_cached_token_needs_no_exchange() {
    let server = MockServer::start().await;
    mount_token(&server, "unused", 0).await;
    mount_send(&server, "cached-token", 2).await;

    let client = client(&server, seeded_store(Credential::new("cached-token", 7200)).await);

    client.send_text(&message()).await.unwrap();
    client.send_text(&message()).await.unwrap();
}

#[tokio::test]
async fn test_expired_token_is_replaced_and_used() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh-token", 1).await;
    mount_send(&server, "fresh-token", 1).await;

    let expired = Credential::issued_at("stale-token", Utc::now() - chrono::Duration::hours(3), 7200);
    let client = client(&server, seeded_store(expired).await);

    client.send_text(&message()).await.unwrap();

    let stored = client.store().load(client.corp_id()).await.unwrap().unwrap();
    assert_eq!(stored.token().expose(), "fresh-token");
}

#[tokio::test]
async fn test_payload_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/send"))
        .and(body_partial_json(json!({
            "touser": "alice|bob",
            "msgtype": "text",
            "agentid": 1000002,
            "text": { "content": "Build #42 passed" },
            "safe": 0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errcode": 0, "errmsg": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, seeded_store(Credential::new("cached-token", 7200)).await);
    client.send_text(&message()).await.unwrap();
}

#[tokio::test]
async fn test_exchange_rejection_stops_before_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/gettoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 40001,
            "errmsg": "invalid credential"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_send(&server, "never", 0).await;

    let client = client(&server, MemoryStore::new());
    let err = client.send_text(&message()).await.unwrap_err();

    match err {
        ApiError::Remote { code, message } => {
            assert_eq!(code, 40001);
            assert_eq!(message, "invalid credential");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_token_expiry_is_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server, "unused", 0).await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 42001,
            "errmsg": "access_token expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, seeded_store(Credential::new("revoked-token", 7200)).await);
    let err = client.send_text(&message()).await.unwrap_err();

    assert!(err.is_token_rejected());
    assert_eq!(err.remote_code(), Some(42001));
}

#[tokio::test]
async fn test_forced_refresh_then_retry() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh-token", 1).await;
    mount_send(&server, "fresh-token", 1).await;

    let client = client(&server, seeded_store(Credential::new("revoked-token", 7200)).await);

    let refreshed = client.refresh_access_token().await.unwrap().into_inner();
    assert_eq!(refreshed.token().expose(), "fresh-token");

    client.send_text(&message()).await.unwrap();
}

#[tokio::test]
async fn test_server_error_without_errcode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/send"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = client(&server, seeded_store(Credential::new("cached-token", 7200)).await);
    let err = client.send_text(&message()).await.unwrap_err();

    match err {
        ApiError::UnexpectedStatus { status, body } => {
            assert_eq!(status.as_u16(), 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("expected unexpected status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/gettoken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "late", "expires_in": 7200}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = WecomClient::builder(CORP_ID, SECRET)
        .base_url(server.uri())
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let err = client.send_text(&message()).await.unwrap_err();

    assert!(err.is_transport());
    assert!(client.store().load(client.corp_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_single_flight_collapses_concurrent_exchanges() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/gettoken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh-token", "expires_in": 7200}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_send(&server, "fresh-token", 4).await;

    let expired = Credential::issued_at("stale-token", Utc::now() - chrono::Duration::hours(3), 7200);
    let client = WecomClient::builder(CORP_ID, SECRET)
        .base_url(server.uri())
        .store(seeded_store(expired).await)
        .single_flight(true)
        .build()
        .unwrap();

    let message = message();
    let other = client.clone();
    let (a, b, c, d) = tokio::join!(
        client.send_text(&message),
        client.send_text(&message),
        other.send_text(&message),
        other.send_text(&message),
    );

    for result in [a, b, c, d] {
        assert!(result.unwrap().persistence_failure.is_none());
    }
}
