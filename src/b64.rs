//! URL-safe base64 helpers for record bodies and root signatures.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;

use crate::error::{Error, Result};

/// Encode with the URL-safe alphabet, padded.
pub fn encode(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// Decode URL-safe base64, accepting padded and unpadded input.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(text.trim_end_matches('='))
        .map_err(|e| Error::Parse(format!("invalid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_and_padding() {
        let data = [0xfbu8, 0xef, 0xff, 0x01, 0x02];
        let enc = encode(&data);
        // URL-safe alphabet, padded
        assert!(!enc.contains('+') && !enc.contains('/'));
        assert!(enc.ends_with('='));
        assert_eq!(decode(&enc).unwrap(), data);
        assert_eq!(decode(enc.trim_end_matches('=')).unwrap(), data);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(decode("not base64!").is_err());
    }
}
