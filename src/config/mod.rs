pub mod loader;

pub use loader::{load_config, load_config_from_env, validate_config, HistoryConfig, KisConfig};
