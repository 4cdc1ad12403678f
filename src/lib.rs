pub mod blocking;
pub mod broker;
pub mod config;
pub mod data;
pub mod error;
pub mod types;
pub mod utils;

pub use broker::KisClient;
pub use config::{load_config, load_config_from_env, KisConfig};
pub use data::CancelToken;
pub use error::{KisError, Result};
pub use types::*;
