//! Canonical byte forms used for every signature in the protocol.
//!
//! Values are converted to a `serde_json::Value` first, whose object maps are
//! ordered by key, then written without whitespace. Two parties serializing
//! the same value therefore produce identical bytes regardless of struct field
//! declaration order.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::Result;

/// Serialize `value` into its canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let tree = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&tree)?)
}

/// Serialize `value` into its canonical JSON string.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let tree = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&tree)?)
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Forward {
        alpha: u32,
        beta: &'static str,
    }

    #[derive(Serialize)]
    struct Reversed {
        beta: &'static str,
        alpha: u32,
    }

    #[test]
    fn field_order_does_not_matter() {
        let a = to_canonical_bytes(&Forward { alpha: 1, beta: "x" }).unwrap();
        let b = to_canonical_bytes(&Reversed { beta: "x", alpha: 1 }).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, br#"{"alpha":1,"beta":"x"}"#.to_vec());
    }

    #[test]
    fn sha256_hex_is_lowercase_and_64_chars() {
        let digest = sha256_hex(b"");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
