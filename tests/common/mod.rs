#![allow(dead_code)]

use kis_client::broker::{KisClient, MemoryTokenStore};
use kis_client::{Environment, KisConfig};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const APP_KEY: &str = "test-app-key";
pub const APP_SECRET: &str = "test-app-secret";
pub const ACCESS_TOKEN: &str = "mock-access-token";

/// Paper-trading config pointed at the mock server, no inter-window delay
pub fn config_for(server: &MockServer) -> KisConfig {
    let mut config = KisConfig::new(APP_KEY, APP_SECRET, "50012345-01", Environment::Paper);
    config.rest_base_url = Some(server.uri());
    config.history.request_delay_ms = Some(0);
    config
}

pub async fn setup() -> (MockServer, KisClient, Arc<MemoryTokenStore>) {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let client = KisClient::with_token_store(config_for(&server), store.clone()).unwrap();
    (server, client, store)
}

pub async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/tokenP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN,
            "access_token_token_expired": "2026-01-15 10:00:00",
            "token_type": "Bearer",
            "expires_in": 86400
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn ok_body(extra: serde_json::Value) -> serde_json::Value {
    let mut body = json!({
        "rt_cd": "0",
        "msg_cd": "MCA00000",
        "msg1": "정상처리 되었습니다."
    });
    if let (Some(target), Some(source)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
    body
}

pub fn fail_body(code: &str, message: &str) -> serde_json::Value {
    json!({ "rt_cd": "1", "msg_cd": code, "msg1": message })
}

pub fn daily_row(date: &str, close: u64) -> serde_json::Value {
    json!({
        "stck_bsop_date": date,
        "stck_oprc": (close - 100).to_string(),
        "stck_hgpr": (close + 200).to_string(),
        "stck_lwpr": (close - 300).to_string(),
        "stck_clpr": close.to_string(),
        "acml_vol": "1000000"
    })
}
