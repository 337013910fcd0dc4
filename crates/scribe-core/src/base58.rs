//! Bitcoin-alphabet base58 (omits `0`, `O`, `I`, `l`), with leading
//! zero bytes preserved as leading `"1"` characters.
//!
//! Thin wrapper over `bs58` so the rest of the crate depends on one
//! narrow seam rather than the `bs58` API directly.

use crate::error::{IngestError, Result};

/// Encode raw bytes as a base58 string.
pub fn encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a base58 string back into raw bytes.
pub fn decode(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| IngestError::Parse(format!("invalid base58: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_arbitrary_bytes() {
        let input = b"the quick brown fox jumps over the lazy dog";
        let encoded = encode(input);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn round_trip_leading_zero_bytes() {
        let input = [0u8, 0u8, 1u8, 2u8, 3u8];
        let encoded = encode(&input);
        assert!(encoded.starts_with("11"));
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn round_trip_empty() {
        let encoded = encode(&[]);
        let decoded = decode(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn alphabet_excludes_ambiguous_characters() {
        let encoded = encode(&[255; 32]);
        for c in ['0', 'O', 'I', 'l'] {
            assert!(!encoded.contains(c), "base58 output must not contain '{c}'");
        }
    }

    #[test]
    fn decode_rejects_invalid_characters() {
        assert!(decode("not-valid-0OIl").is_err());
    }
}
