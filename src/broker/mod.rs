pub mod account;
pub mod auth;
pub mod client;
pub mod endpoints;
pub mod feed_codec;
pub mod orders;
pub mod quote;
pub mod token_store;
pub mod transport;
pub mod websocket;

pub use account::AccountApi;
pub use auth::AuthManager;
pub use client::KisClient;
pub use feed_codec::Channel;
pub use orders::OrderApi;
pub use quote::QuoteApi;
pub use token_store::{Credential, FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::Transport;
pub use websocket::{FeedState, FeedStream, OrderBookStream, StreamingFeed, TickerStream};
