mod common;

use chrono::{Duration, Utc};
use common::*;
use futures_util::future::join_all;
use kis_client::broker::{Credential, KisClient, TokenStore};
use kis_client::utils::token_cache_key;
use kis_client::KisError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mount_price(server: &wiremock::MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/uapi/domestic-stock/v1/quotations/inquire-price"))
        .and(header("authorization", format!("Bearer {}", ACCESS_TOKEN).as_str()))
        .and(header("appkey", APP_KEY))
        .and(header("appsecret", APP_SECRET))
        .and(header("tr_id", "FHKST01010100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body(json!({
            "output": {"stck_prpr": "57500", "prdy_vrss": "500", "prdy_vrss_sign": "2", "prdy_ctrt": "0.88"}
        }))))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_token_issued_once_and_reused() {
    let (server, client, store) = setup().await;
    mount_token(&server, 1).await;
    mount_price(&server, 2).await;

    client.fetch_ticker("005930").await.unwrap();
    client.fetch_ticker("005930").await.unwrap();

    let cached = store.load(&token_cache_key(APP_KEY)).unwrap();
    assert_eq!(cached.token, ACCESS_TOKEN);
    assert!(cached.expires_at > Utc::now() + Duration::hours(23));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let (server, client, _store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/tokenP"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": ACCESS_TOKEN, "expires_in": 86400}))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = client.auth();
    let tokens = join_all((0..10).map(|_| auth.access_token())).await;

    assert_eq!(tokens.len(), 10);
    assert!(tokens.iter().all(|t| t.as_deref().ok() == Some(ACCESS_TOKEN)));
}

#[tokio::test]
async fn test_persisted_token_survives_new_client() {
    let server = wiremock::MockServer::start().await;
    mount_token(&server, 1).await;
    mount_price(&server, 2).await;

    let store = Arc::new(kis_client::broker::MemoryTokenStore::new());

    let first = KisClient::with_token_store(config_for(&server), store.clone()).unwrap();
    first.fetch_ticker("005930").await.unwrap();

    let second = KisClient::with_token_store(config_for(&server), store.clone()).unwrap();
    second.fetch_ticker("005930").await.unwrap();
}

#[tokio::test]
async fn test_token_inside_safety_margin_is_refreshed() {
    let server = wiremock::MockServer::start().await;
    mount_token(&server, 1).await;
    mount_price(&server, 1).await;

    let stale = Credential {
        token: "about-to-expire".to_string(),
        expires_at: Utc::now() + Duration::minutes(2),
    };
    let store = Arc::new(kis_client::broker::MemoryTokenStore::with_credential(&token_cache_key(APP_KEY), stale));

    let client = KisClient::with_token_store(config_for(&server), store.clone()).unwrap();
    assert!(client.auth().is_expired().await);

    client.fetch_ticker("005930").await.unwrap();
    assert_eq!(store.load(&token_cache_key(APP_KEY)).unwrap().token, ACCESS_TOKEN);
}

#[tokio::test]
async fn test_refresh_failure_is_authentication_error() {
    let (server, client, store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/tokenP"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error_description": "유효하지 않은 AppKey입니다.",
            "error_code": "EGW00103"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.fetch_ticker("005930").await.unwrap_err();
    match err {
        KisError::Authentication { code, message } => {
            assert_eq!(code.as_deref(), Some("EGW00103"));
            assert!(message.contains("AppKey"));
        }
        other => panic!("expected authentication error, got {:?}", other),
    }

    assert!(store.is_empty());
    assert!(client.auth().current_credential().await.is_none());
}

#[tokio::test]
async fn test_approval_key_issuance() {
    let (server, client, _store) = setup().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/Approval"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"approval_key": "approval-abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let key = client.auth().issue_approval_key().await.unwrap();
    assert_eq!(key, "approval-abc");
}

#[tokio::test]
async fn test_hung_token_endpoint_fails_within_request_timeout() {
    let server = wiremock::MockServer::start().await;
    let store = Arc::new(kis_client::broker::MemoryTokenStore::new());
    let mut config = config_for(&server);
    config.request_timeout_secs = 1;
    let client = KisClient::with_token_store(config, store.clone()).unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth2/tokenP"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": ACCESS_TOKEN, "expires_in": 86400}))
                .set_delay(std::time::Duration::from_secs(4)),
        )
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let err = client.auth().access_token().await.unwrap_err();

    assert!(matches!(err, KisError::Authentication { .. }));
    assert!(started.elapsed() < std::time::Duration::from_secs(3));
    assert!(client.auth().current_credential().await.is_none());
    assert!(store.is_empty());
}
