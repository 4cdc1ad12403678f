/// Token cache key derivation
use sha2::{Digest, Sha256};

/// Stable, non-reversible identity for an app key.
///
/// Processes sharing an app key land on the same cache entry without the key
/// itself being written to disk.
pub fn token_cache_key(app_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(app_key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cache_key() {
        let key1 = token_cache_key("PSabcdef1234");
        let key2 = token_cache_key("PSabcdef1234");
        let key3 = token_cache_key("PSabcdef1235");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
        assert_eq!(key1.len(), 16);
        assert!(!key1.contains("PSabcdef"));
    }
}
