pub mod hashing;
pub mod parse;
pub mod rate_limiter;
pub mod time;

pub use hashing::token_cache_key;
pub use parse::{lenient_f64, lenient_i64, strict_f64, strict_i64};
pub use rate_limiter::RateLimiter;
pub use time::*;
