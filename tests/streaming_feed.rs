mod common;

use chrono::NaiveTime;
use chrono_tz::Asia::Seoul;
use common::*;
use futures_util::{SinkExt, StreamExt};
use kis_client::broker::{Channel, FeedState, MemoryTokenStore, StreamingFeed};
use kis_client::KisClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PINGPONG: &str = r#"{"header":{"tr_id":"PINGPONG","datetime":"20260114101530"}}"#;

/// 46-field trade record for 005930 at 10:15:30
fn ticker_payload() -> String {
    ticker_payload_at("101530", "57400")
}

fn ticker_payload_at(hhmmss: &str, price: &str) -> String {
    let mut fields = vec!["0"; 46];
    fields[0] = "005930";
    fields[1] = hhmmss;
    fields[2] = price;
    fields[3] = "2";
    fields[4] = "600";
    fields[5] = "1.06";
    fields[7] = "57800";
    fields[8] = "58000";
    fields[9] = "57100";
    fields[13] = "8123456";
    fields.join("^")
}

fn subscribe_ack(tr_key: &str) -> String {
    json!({
        "header": {"tr_id": "H0STCNT0", "tr_key": tr_key, "encrypt": "N"},
        "body": {"rt_cd": "0", "msg_cd": "OPSP0000", "msg1": "SUBSCRIBE SUCCESS"}
    })
    .to_string()
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

fn header_field(message: &str, name: &str) -> String {
    let value: Value = serde_json::from_str(message).unwrap();
    value["header"][name].as_str().unwrap_or_default().to_string()
}

/// Accept one client, feed it a burst of frames, then check what it sends back
async fn run_exchange_server(listener: TcpListener, expected_key: &'static str) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();

    let subscribe = next_text(&mut ws).await;
    assert_eq!(header_field(&subscribe, "tr_type"), "1");
    assert_eq!(header_field(&subscribe, "approval_key"), expected_key);
    let body: Value = serde_json::from_str(&subscribe).unwrap();
    assert_eq!(body["body"]["input"]["tr_id"], "H0STCNT0");
    assert_eq!(body["body"]["input"]["tr_key"], "005930");

    let frames = vec![
        subscribe_ack("005930"),
        "not a frame".to_string(),
        "0|001|H0STCNT0|005930^101530^57400".to_string(),
        PINGPONG.to_string(),
        format!("0|001|H0STCNT0|{}", ticker_payload()),
    ];
    for frame in frames {
        ws.send(Message::Text(frame)).await.unwrap();
    }

    let echo = next_text(&mut ws).await;
    assert_eq!(header_field(&echo, "tr_id"), "PINGPONG");

    let unsubscribe = next_text(&mut ws).await;
    assert_eq!(header_field(&unsubscribe, "tr_type"), "2");

    // Hold the socket until the client closes it
    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_close() {
            break;
        }
    }
}

#[tokio::test]
async fn test_feed_routes_valid_frames_and_skips_bad_ones() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(run_exchange_server(listener, "approval"));

    let feed = StreamingFeed::connect(&format!("ws://{}", addr), "approval").await.unwrap();
    assert_eq!(feed.state().await, FeedState::Connected);

    let mut ticks = feed.watch_ticker("005930").await.unwrap();
    assert_eq!(ticks.symbol(), "005930");

    let tick = timeout(Duration::from_secs(5), ticks.recv())
        .await
        .expect("tick within timeout")
        .expect("stream open");
    assert_eq!(tick.symbol, "005930");
    assert_eq!(tick.price, 57400.0);
    assert_eq!(tick.change, 600.0);
    assert_eq!(tick.volume, 8_123_456);
    assert_eq!(
        tick.timestamp.with_timezone(&Seoul).time(),
        NaiveTime::from_hms_opt(10, 15, 30).unwrap()
    );
    assert_eq!(feed.state().await, FeedState::Streaming);

    // The malformed and short frames produced nothing
    assert!(timeout(Duration::from_millis(200), ticks.recv()).await.is_err());

    feed.unsubscribe(Channel::Ticker, "005930").await.unwrap();
    assert_eq!(ticks.recv().await.map(|t| t.symbol), None);
    assert_eq!(feed.state().await, FeedState::Connected);

    feed.close().await.unwrap();
    assert_eq!(feed.state().await, FeedState::Disconnected);

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_subscribe_after_close_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    let feed = StreamingFeed::connect(&format!("ws://{}", addr), "approval").await.unwrap();
    feed.close().await.unwrap();

    let err = feed.watch_ticker("005930").await.unwrap_err();
    assert!(matches!(err, kis_client::KisError::NotConnected(_)));

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_connects_feed_with_issued_approval_key() {
    let rest = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/Approval"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"approval_key": "approval-abc"})))
        .expect(1)
        .mount(&rest)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(run_exchange_server(listener, "approval-abc"));

    let mut config = config_for(&rest);
    config.ws_url = Some(format!("ws://{}", addr));
    let client = KisClient::with_token_store(config, Arc::new(MemoryTokenStore::new())).unwrap();

    let mut ticks = client.watch_ticker("005930").await.unwrap();
    let tick = timeout(Duration::from_secs(5), ticks.next())
        .await
        .expect("tick within timeout")
        .expect("stream open");
    assert_eq!(tick.price, 57400.0);

    client.unsubscribe(Channel::Ticker, "005930").await.unwrap();
    client.close().await.unwrap();

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

/// Wait for `go`, push a burst of trades, and report once the client has read them all
async fn run_burst_server(listener: TcpListener, go: oneshot::Receiver<()>, drained: oneshot::Sender<()>) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();

    let subscribe = next_text(&mut ws).await;
    assert_eq!(header_field(&subscribe, "tr_type"), "1");

    go.await.unwrap();

    for (i, time) in ["101530", "101531", "101532", "101533", "101534"].iter().enumerate() {
        let price = (57400 + i * 100).to_string();
        let frame = format!("0|001|H0STCNT0|{}", ticker_payload_at(time, &price));
        ws.send(Message::Text(frame)).await.unwrap();
    }
    ws.send(Message::Text(PINGPONG.to_string())).await.unwrap();

    // A second subscribe for the same pair would arrive before the echo
    let echo = next_text(&mut ws).await;
    assert_eq!(header_field(&echo, "tr_id"), "PINGPONG");
    drained.send(()).unwrap();

    let unsubscribe = next_text(&mut ws).await;
    assert_eq!(header_field(&unsubscribe, "tr_type"), "2");

    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_close() {
            break;
        }
    }
}

#[tokio::test]
async fn test_same_symbol_streams_are_independent_and_bounded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (go_tx, go_rx) = oneshot::channel();
    let (drained_tx, drained_rx) = oneshot::channel();
    let server = tokio::spawn(run_burst_server(listener, go_rx, drained_tx));

    let feed = StreamingFeed::connect(&format!("ws://{}", addr), "approval").await.unwrap();
    let mut first = feed.watch_ticker("005930").await.unwrap();
    let mut second = feed.watch_ticker("005930").await.unwrap();

    // Neither stream is polled while the burst arrives
    go_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), drained_rx).await.unwrap().unwrap();

    for stream in [&mut first, &mut second] {
        let tick = timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("buffered tick")
            .expect("stream open");
        assert_eq!(tick.price, 57400.0);
        assert_eq!(
            tick.timestamp.with_timezone(&Seoul).time(),
            NaiveTime::from_hms_opt(10, 15, 30).unwrap()
        );
        // Later frames found the buffer full and were dropped
        assert!(timeout(Duration::from_millis(200), stream.recv()).await.is_err());
    }

    feed.unsubscribe(Channel::Ticker, "005930").await.unwrap();
    assert!(first.recv().await.is_none());
    assert!(second.recv().await.is_none());

    feed.close().await.unwrap();
    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_dropping_one_stream_keeps_the_other() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (go_tx, go_rx) = oneshot::channel();
    let (drained_tx, drained_rx) = oneshot::channel();
    let server = tokio::spawn(run_burst_server(listener, go_rx, drained_tx));

    let feed = StreamingFeed::connect(&format!("ws://{}", addr), "approval").await.unwrap();
    let dropped = feed.watch_ticker("005930").await.unwrap();
    let mut kept = feed.watch_ticker("005930").await.unwrap();
    drop(dropped);

    go_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), drained_rx).await.unwrap().unwrap();

    let tick = timeout(Duration::from_secs(1), kept.recv())
        .await
        .expect("buffered tick")
        .expect("stream open");
    assert_eq!(tick.symbol, "005930");
    assert_eq!(feed.state().await, FeedState::Streaming);

    feed.unsubscribe(Channel::Ticker, "005930").await.unwrap();
    feed.close().await.unwrap();
    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}
