//! Cache key derivation.

use sha2::{Digest, Sha256};

/// Key under which the snapshot of `url` is stored: `{prefix}:{hex(sha256(url))}`.
///
/// Stable across processes, so a shared store is addressed the same way by
/// every worker.
pub fn build_key(prefix: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{prefix}:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_prefixed_hex_digest() {
        let key = build_key("prerender-gate", "http://example.com/test");
        let (prefix, digest) = key.split_once(':').expect("separator");
        assert_eq!(prefix, "prerender-gate");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(
            build_key("p", "http://example.com/test"),
            build_key("p", "http://example.com/test")
        );
        assert_eq!(
            build_key("p", ""),
            "p:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn different_urls_produce_different_keys() {
        assert_ne!(
            build_key("p", "http://example.com/a"),
            build_key("p", "http://example.com/b")
        );
        assert_ne!(
            build_key("p", "http://example.com/a"),
            build_key("q", "http://example.com/a")
        );
    }
}
