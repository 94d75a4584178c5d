//! Key-hash computation (spec §3, §8.4): first 20 hex digits of
//! `sha256(key)` over the bytes of the key including its `sk-` prefix.

use sha2::{Digest, Sha256};

use crate::error::{ControllerError, Result};

/// Compute the stable key hash used to correlate trajectories with a proxy
/// key. `key` must start with `sk-`, matching the upstream's own key
/// format.
pub fn calc_keyhash(key: &str) -> Result<String> {
    if !key.starts_with("sk-") {
        return Err(ControllerError::Config(format!(
            "key does not start with sk-: {key:?}"
        )));
    }
    let digest = Sha256::digest(key.as_bytes());
    let hex = hex::encode(digest);
    Ok(hex[..20].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_first_twenty_hex_chars_of_sha256() {
        let key = "sk-test-key-123";
        let hash = calc_keyhash(key).unwrap();
        assert_eq!(hash.len(), 20);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let full = hex::encode(hasher.finalize());
        assert_eq!(hash, full[..20]);
    }

    #[test]
    fn hash_is_stable_for_same_input() {
        let a = calc_keyhash("sk-stable").unwrap();
        let b = calc_keyhash("sk-stable").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_keys_without_sk_prefix() {
        assert!(calc_keyhash("not-a-key").is_err());
    }
}
