mod common;

use chrono::NaiveDate;
use common::*;
use futures_util::{SinkExt, StreamExt};
use kis_client::broker::MemoryTokenStore;
use kis_client::{blocking, KisClient, KisError, Timeframe};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAILY_CHART: &str = "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Mock server on its own runtime; the blocking client must not run inside one
fn start_server(rt: &Runtime) -> MockServer {
    rt.block_on(MockServer::start())
}

fn mount_daily_window(rt: &Runtime, server: &MockServer, window_end: &str, body: serde_json::Value, calls: u64) {
    rt.block_on(
        Mock::given(method("GET"))
            .and(path(DAILY_CHART))
            .and(query_param("FID_INPUT_DATE_2", window_end))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(calls)
            .mount(server),
    );
}

#[test]
fn test_blocking_range_matches_async_and_reuses_token() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    rt.block_on(mount_token(&server, 1));

    mount_daily_window(
        &rt,
        &server,
        "20231027",
        ok_body(json!({ "output2": [daily_row("20231027", 68000), daily_row("20230601", 71000)] })),
        2,
    );
    mount_daily_window(
        &rt,
        &server,
        "20230530",
        ok_body(json!({ "output2": [daily_row("20230530", 70000), daily_row("20230102", 55000)] })),
        2,
    );

    let mut config = config_for(&server);
    config.history.daily_window_days = 150;
    let store = Arc::new(MemoryTokenStore::new());

    let sync_client = blocking::KisClient::with_token_store(config.clone(), store.clone()).unwrap();
    let from_blocking = sync_client
        .fetch_ohlcv_range("005930", Timeframe::Day, date(2023, 1, 1), Some(date(2023, 10, 27)))
        .unwrap();

    let async_client = KisClient::with_token_store(config, store).unwrap();
    let from_async = rt
        .block_on(async_client.fetch_ohlcv_range("005930", Timeframe::Day, date(2023, 1, 1), Some(date(2023, 10, 27))))
        .unwrap();

    let closes: Vec<f64> = from_blocking.iter().map(|c| c.close).collect();
    assert_eq!(closes, vec![55000.0, 70000.0, 71000.0, 68000.0]);
    assert_eq!(from_blocking, from_async);

    drop(sync_client);
    rt.block_on(server.verify());
}

#[test]
fn test_blocking_range_aborts_on_failed_window() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    rt.block_on(mount_token(&server, 1));

    mount_daily_window(&rt, &server, "20231027", ok_body(json!({ "output2": [daily_row("20231027", 68000)] })), 1);
    mount_daily_window(&rt, &server, "20230719", fail_body("APBK1234", "조회할 자료가 없습니다"), 1);
    mount_daily_window(&rt, &server, "20230410", ok_body(json!({ "output2": [] })), 0);

    let mut config = config_for(&server);
    config.history.daily_window_days = 100;
    let client = blocking::KisClient::with_token_store(config, Arc::new(MemoryTokenStore::new())).unwrap();

    let err = client
        .fetch_ohlcv_range("005930", Timeframe::Day, date(2023, 1, 1), Some(date(2023, 10, 27)))
        .unwrap_err();
    assert!(matches!(err, KisError::Api { ref code, .. } if code == "APBK1234"));

    drop(client);
    rt.block_on(server.verify());
}

#[test]
fn test_blocking_stream_iterates_ticks() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    rt.block_on(
        Mock::given(method("POST"))
            .and(path("/oauth2/Approval"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"approval_key": "approval-abc"})))
            .expect(1)
            .mount(&server),
    );

    let listener = rt.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
    let addr = listener.local_addr().unwrap();
    let socket = rt.spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        // Subscribe request
        ws.next().await.unwrap().unwrap();

        let mut fields = vec!["0"; 46];
        fields[0] = "005930";
        fields[1] = "101530";
        fields[2] = "57400";
        fields[13] = "8123456";
        let frame = format!("0|001|H0STCNT0|{}", fields.join("^"));
        ws.send(Message::Text(frame)).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    let mut config = config_for(&server);
    config.ws_url = Some(format!("ws://{}", addr));
    let client = blocking::KisClient::with_token_store(config, Arc::new(MemoryTokenStore::new())).unwrap();

    let mut ticks = client.watch_ticker("005930").unwrap();
    assert_eq!(ticks.symbol(), "005930");
    let tick = ticks.next().unwrap();
    assert_eq!(tick.price, 57400.0);
    assert_eq!(tick.volume, 8_123_456);

    client.close().unwrap();
    assert!(ticks.next().is_none());

    rt.block_on(socket).unwrap();
}
