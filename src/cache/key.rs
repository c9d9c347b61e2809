//! Cache key derivation.

use sha2::{Digest, Sha256};

/// Keys longer than this are re-hashed before being used as a file name.
pub const MAX_KEY_LEN: usize = 64;

/// Hex characters kept from the digest for a derived key.
const DERIVED_KEY_LEN: usize = 32;

/// Derives the cache key for a city and keyword list.
///
/// The natural key is `"{city}_{kw1_kw2_...}"`; keyword order matters.
/// The result is a 32-character lowercase hex digest, stable across
/// processes and platforms.
pub fn derive_key<S: AsRef<str>>(city: &str, keywords: &[S]) -> String {
    let joined = keywords
        .iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join("_");
    let natural = format!("{}_{}", city, joined);

    let mut digest = sha256_hex(natural.as_bytes());
    digest.truncate(DERIVED_KEY_LEN);
    digest
}

/// Maps a cache key to the stem used for its files.
///
/// Keys of at most [`MAX_KEY_LEN`] characters are used verbatim; longer ones
/// are replaced by their full SHA-256 hex digest.
pub fn file_stem(key: &str) -> String {
    if key.chars().count() > MAX_KEY_LEN {
        sha256_hex(key.as_bytes())
    } else {
        key.to_string()
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_is_deterministic() {
        let a = derive_key("北京", &["餐厅"]);
        let b = derive_key("北京", &["餐厅".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_derive_key_known_value() {
        // sha256("北京_餐厅"), first 32 hex chars; pinned so keys survive restarts.
        let expected = &sha256_hex("北京_餐厅".as_bytes())[..32];
        assert_eq!(derive_key("北京", &["餐厅"]), expected);
    }

    #[test]
    fn test_derive_key_is_order_sensitive() {
        let a = derive_key("上海", &["咖啡", "书店"]);
        let b = derive_key("上海", &["书店", "咖啡"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_key_distinguishes_cities() {
        assert_ne!(derive_key("北京", &["餐厅"]), derive_key("上海", &["餐厅"]));
    }

    #[test]
    fn test_file_stem_short_key_verbatim() {
        assert_eq!(file_stem("abc123"), "abc123");
        let exactly_64 = "a".repeat(64);
        assert_eq!(file_stem(&exactly_64), exactly_64);
    }

    #[test]
    fn test_file_stem_long_key_rehashed() {
        let long = "k".repeat(200);
        let stem = file_stem(&long);
        assert_eq!(stem.len(), 64);
        assert_ne!(stem, long);
        assert_eq!(stem, file_stem(&long));
    }
}
