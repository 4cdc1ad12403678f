/// KIS realtime WebSocket feed: one socket, many routed subscriptions
use futures_util::stream::{SplitSink, Stream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::broker::endpoints::tr_id;
use crate::broker::feed_codec::{self, Channel, DataFrame, Frame};
use crate::error::{KisError, Result};
use crate::types::{OrderBook, Tick};
use crate::utils::now_kst;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// Lifecycle of the feed. `Disconnected` is both the start and the end;
/// there is no automatic reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Streaming,
}

/// Values held per subscriber; a consumer that falls further behind misses frames
const SUBSCRIBER_BUFFER: usize = 1;

enum Subscriber {
    Ticker(mpsc::Sender<Tick>),
    OrderBook(mpsc::Sender<OrderBook>),
}

impl Subscriber {
    fn is_closed(&self) -> bool {
        match self {
            Subscriber::Ticker(tx) => tx.is_closed(),
            Subscriber::OrderBook(tx) => tx.is_closed(),
        }
    }
}

type RouteKey = (Channel, String);
type Routes = Arc<RwLock<HashMap<RouteKey, Vec<Subscriber>>>>;

/// Decoded values for one subscription.
///
/// Several streams may watch the same symbol; each gets every frame. Ends
/// (`None`) after `unsubscribe`, `close`, or when the socket drops.
#[derive(Debug)]
pub struct FeedStream<T> {
    symbol: String,
    rx: mpsc::Receiver<T>,
}

pub type TickerStream = FeedStream<Tick>;
pub type OrderBookStream = FeedStream<OrderBook>;

impl<T> FeedStream<T> {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Next decoded value, or `None` once the subscription has ended
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for FeedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Streaming market data over a single socket.
///
/// Frames are routed to subscribers by `(tr_id, symbol)`. Undecodable frames
/// are dropped with a debug log and never end a stream. Delivery never waits
/// on a slow consumer: a frame that finds its buffer full is dropped for that
/// consumer only.
pub struct StreamingFeed {
    approval_key: String,
    writer: WsWriter,
    routes: Routes,
    state: Arc<RwLock<FeedState>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingFeed {
    /// Open the socket and start the reader task
    pub async fn connect(ws_url: &str, approval_key: impl Into<String>) -> Result<Self> {
        let state = Arc::new(RwLock::new(FeedState::Connecting));
        let url = format!("{}/tryitout/{}", ws_url.trim_end_matches('/'), tr_id::WS_TICKER);

        info!("🔌 Connecting to KIS realtime feed...");

        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            KisError::WebSocket(format!("Connection failed: {}", e))
        })?;
        let (write, read) = ws_stream.split();

        let writer: WsWriter = Arc::new(Mutex::new(write));
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));

        {
            let mut s = state.write().await;
            *s = FeedState::Connected;
        }
        info!("✅ Realtime feed connected");

        let handle = tokio::spawn(read_loop(
            read,
            Arc::clone(&writer),
            Arc::clone(&routes),
            Arc::clone(&state),
        ));

        Ok(StreamingFeed {
            approval_key: approval_key.into(),
            writer,
            routes,
            state,
            reader: Mutex::new(Some(handle)),
        })
    }

    pub async fn state(&self) -> FeedState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await != FeedState::Disconnected
    }

    /// Live trades for `symbol`
    pub async fn watch_ticker(&self, symbol: &str) -> Result<TickerStream> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribe(Channel::Ticker, symbol, Subscriber::Ticker(tx)).await?;
        Ok(FeedStream { symbol: symbol.to_string(), rx })
    }

    /// Live 10-level order book for `symbol`
    pub async fn watch_order_book(&self, symbol: &str) -> Result<OrderBookStream> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribe(Channel::OrderBook, symbol, Subscriber::OrderBook(tx)).await?;
        Ok(FeedStream { symbol: symbol.to_string(), rx })
    }

    /// Release a `(channel, symbol)` pair; every stream watching it ends
    pub async fn unsubscribe(&self, channel: Channel, symbol: &str) -> Result<()> {
        self.ensure_connected().await?;

        let message = feed_codec::subscription_message(&self.approval_key, channel, symbol, false);
        self.send_text(message).await?;

        let remaining = {
            let mut routes = self.routes.write().await;
            routes.remove(&(channel, symbol.to_string()));
            routes.len()
        };

        if remaining == 0 {
            let mut state = self.state.write().await;
            if *state != FeedState::Disconnected {
                *state = FeedState::Connected;
            }
        }

        info!("📡 Unsubscribed {} {}", channel.tr_id(), symbol);
        Ok(())
    }

    /// Close the socket and end every stream
    pub async fn close(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.close().await {
                debug!("Socket close: {}", e);
            }
        }

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }

        self.routes.write().await.clear();
        *self.state.write().await = FeedState::Disconnected;

        info!("Realtime feed closed");
        Ok(())
    }

    async fn subscribe(&self, channel: Channel, symbol: &str, subscriber: Subscriber) -> Result<()> {
        self.ensure_connected().await?;

        let key = (channel, symbol.to_string());
        let first = {
            let mut routes = self.routes.write().await;
            let subscribers = routes.entry(key.clone()).or_default();
            subscribers.retain(|s| !s.is_closed());
            subscribers.push(subscriber);
            subscribers.len() == 1
        };

        // The vendor subscription is shared by every stream on the pair
        if first {
            let message = feed_codec::subscription_message(&self.approval_key, channel, symbol, true);
            if let Err(e) = self.send_text(message).await {
                self.routes.write().await.remove(&key);
                return Err(e);
            }
        } else {
            debug!("{} {} already subscribed, sharing the feed", channel.tr_id(), symbol);
        }

        {
            let mut state = self.state.write().await;
            if *state == FeedState::Connected {
                *state = FeedState::Subscribed;
            }
        }

        info!("📡 Subscribed {} {}", channel.tr_id(), symbol);
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<()> {
        match self.state().await {
            FeedState::Disconnected | FeedState::Connecting => Err(KisError::NotConnected(
                "realtime feed is not connected".to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|e| KisError::WebSocket(format!("Send failed: {}", e)))
    }
}

async fn read_loop(
    mut read: futures_util::stream::SplitStream<WsStream>,
    writer: WsWriter,
    routes: Routes,
    state: Arc<RwLock<FeedState>>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match feed_codec::classify(&text) {
                Frame::PingPong => {
                    debug!("PINGPONG received, echoing");
                    let mut w = writer.lock().await;
                    if let Err(e) = w.send(Message::Text(text.clone())).await {
                        warn!("Failed to echo PINGPONG: {}", e);
                    }
                }
                Frame::Control(ctrl) => {
                    if ctrl.is_success() {
                        debug!("Control {} {}: {}", ctrl.tr_id, ctrl.tr_key, ctrl.msg);
                    } else {
                        warn!("Control {} {} failed: [{}] {}", ctrl.tr_id, ctrl.tr_key, ctrl.msg_cd, ctrl.msg);
                    }
                }
                Frame::Data(data) => dispatch(&data, &routes, &state).await,
                Frame::Malformed => debug!("Dropping malformed frame ({} bytes)", text.len()),
            },
            Ok(Message::Ping(_)) => {
                debug!("Received ping");
            }
            Ok(Message::Close(_)) => {
                warn!("Realtime feed closed by server");
                break;
            }
            Err(e) => {
                error!("Realtime feed error: {}", e);
                break;
            }
            _ => {}
        }
    }

    routes.write().await.clear();
    *state.write().await = FeedState::Disconnected;
    warn!("Realtime feed reader ended");
}

enum Decoded {
    Tick(Tick),
    Book(OrderBook),
}

impl Decoded {
    fn symbol(&self) -> &str {
        match self {
            Decoded::Tick(tick) => &tick.symbol,
            Decoded::Book(book) => &book.symbol,
        }
    }
}

async fn dispatch(data: &DataFrame<'_>, routes: &Routes, state: &Arc<RwLock<FeedState>>) {
    if data.encrypted {
        debug!("Skipping encrypted {} frame", data.tr_id);
        return;
    }
    let Some(channel) = Channel::from_tr_id(data.tr_id) else {
        debug!("No decoder for {}", data.tr_id);
        return;
    };

    let trade_date = now_kst().date_naive();
    let mut decoded = Vec::new();
    for fields in data.records() {
        let result = match channel {
            Channel::Ticker => feed_codec::decode_tick(&fields, trade_date).map(Decoded::Tick),
            Channel::OrderBook => feed_codec::decode_order_book(&fields, trade_date).map(Decoded::Book),
        };
        match result {
            Ok(value) => decoded.push(value),
            Err(e) => debug!("Dropping {} frame: {}", data.tr_id, e),
        }
    }
    if decoded.is_empty() {
        return;
    }

    let mut streaming = false;
    let mut closed: Vec<RouteKey> = Vec::new();
    {
        let routes = routes.read().await;
        for value in decoded {
            let key = (channel, value.symbol().to_string());
            let Some(subscribers) = routes.get(&key) else {
                continue;
            };

            if !streaming {
                let mut s = state.write().await;
                if matches!(*s, FeedState::Connected | FeedState::Subscribed) {
                    *s = FeedState::Streaming;
                }
                streaming = true;
            }

            let mut any_closed = false;
            for subscriber in subscribers {
                let open = match (subscriber, &value) {
                    (Subscriber::Ticker(tx), Decoded::Tick(tick)) => offer(tx, tick.clone(), &key),
                    (Subscriber::OrderBook(tx), Decoded::Book(book)) => offer(tx, book.clone(), &key),
                    _ => true,
                };
                any_closed |= !open;
            }
            if any_closed && !closed.contains(&key) {
                closed.push(key);
            }
        }
    }

    if !closed.is_empty() {
        let mut routes = routes.write().await;
        for key in closed {
            if let Some(subscribers) = routes.get_mut(&key) {
                subscribers.retain(|s| !s.is_closed());
                debug!("Pruned dropped subscribers for {} {} ({} left)", key.0.tr_id(), key.1, subscribers.len());
                if subscribers.is_empty() {
                    routes.remove(&key);
                }
            }
        }
    }
}

/// Hand one value to a subscriber without waiting; false once the stream is gone
fn offer<T>(tx: &mpsc::Sender<T>, value: T, key: &RouteKey) -> bool {
    match tx.try_send(value) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Subscriber for {} {} is behind, dropping frame", key.0.tr_id(), key.1);
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
