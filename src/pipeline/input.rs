//! Input resolution: normalise a photo source to raw bytes in memory.
//!
//! Photos arrive three ways: a local file path (CLI usage), an HTTP(S) URL,
//! or a `data:image/...;base64,` URI from a browser capture flow. All three
//! collapse to `Vec<u8>` here; the preprocessor never cares where the bytes
//! came from. Magic bytes are checked before returning so callers get a
//! meaningful decode error instead of garbage deep inside the image crate.

use crate::error::LedgerError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input string is a `data:` URI.
pub fn is_data_uri(input: &str) -> bool {
    input.starts_with("data:")
}

static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:(image/[\w+.-]+);base64,(.+)$").unwrap());

/// Split a `data:image/...;base64,...` URI into raw bytes and MIME type.
pub fn decode_data_uri(uri: &str) -> Result<(Vec<u8>, String), LedgerError> {
    let caps = RE_DATA_URI
        .captures(uri.trim())
        .ok_or_else(|| LedgerError::ImageDecode {
            detail: "not a base64 image data-URI".into(),
        })?;
    let mime = caps[1].to_string();
    let bytes = STANDARD
        .decode(caps[2].as_bytes())
        .map_err(|e| LedgerError::ImageDecode {
            detail: format!("invalid base64 payload: {e}"),
        })?;
    Ok((bytes, mime))
}

/// Sniff the MIME type of raw bytes from their magic numbers.
///
/// Only the formats the preprocessor can decode are recognised.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Resolve a photo source string to raw image bytes.
///
/// Accepts a local path, an HTTP(S) URL, or a base64 data-URI. The returned
/// bytes are verified to carry a known image magic number.
pub async fn load_photo(input: &str, timeout_secs: u64) -> Result<Vec<u8>, LedgerError> {
    let bytes = if is_data_uri(input) {
        decode_data_uri(input)?.0
    } else if is_url(input) {
        fetch_url(input, timeout_secs).await?
    } else {
        read_local(Path::new(input)).await?
    };

    match sniff_mime(&bytes) {
        Some(mime) => {
            debug!("Resolved photo: {} bytes, {}", bytes.len(), mime);
            Ok(bytes)
        }
        None => {
            let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
            Err(LedgerError::ImageDecode {
                detail: format!("unrecognised image format, first bytes: {magic:02X?}"),
            })
        }
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, LedgerError> {
    tokio::fs::read(path).await.map_err(|e| LedgerError::ImageDecode {
        detail: format!("cannot read '{}': {e}", path.display()),
    })
}

async fn fetch_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, LedgerError> {
    info!("Fetching photo from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LedgerError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LedgerError::FetchFailed {
            url: url.to_string(),
            reason: if e.is_timeout() {
                format!("timed out after {timeout_secs}s")
            } else {
                e.to_string()
            },
        })?;

    if !response.status().is_success() {
        return Err(LedgerError::FetchFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| LedgerError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/receipt.jpg"));
        assert!(is_url("http://example.com/receipt.jpg"));
        assert!(!is_url("/tmp/receipt.jpg"));
        assert!(!is_url("data:image/jpeg;base64,abc"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniff_recognises_common_formats() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_mime(&[0x89, b'P', b'N', b'G', 0x0D]), Some("image/png"));
        let webp = *b"RIFF\x00\x00\x00\x00WEBPVP8 ";
        assert_eq!(sniff_mime(&webp), Some("image/webp"));
        assert_eq!(sniff_mime(b"%PDF-1.7"), None);
        assert_eq!(sniff_mime(&[]), None);
    }

    #[test]
    fn data_uri_decodes_payload_and_mime() {
        let uri = format!(
            "data:image/png;base64,{}",
            STANDARD.encode([0x89, b'P', b'N', b'G'])
        );
        let (bytes, mime) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn data_uri_rejects_non_image_payloads() {
        assert!(decode_data_uri("data:text/plain;base64,aGk=").is_err());
        assert!(decode_data_uri("not a uri").is_err());
        assert!(decode_data_uri("data:image/png;base64,!!!").is_err());
    }

    #[tokio::test]
    async fn load_photo_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        // Smallest payload that passes the magic-number sniff.
        tokio::fs::write(&path, [0x89, b'P', b'N', b'G', 0x0D, 0x0A])
            .await
            .unwrap();

        let bytes = load_photo(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(sniff_mime(&bytes), Some("image/png"));
    }

    #[tokio::test]
    async fn load_photo_rejects_unknown_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let err = load_photo(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::ImageDecode { .. }));
    }

    #[tokio::test]
    async fn load_photo_missing_file_is_decode_error() {
        let err = load_photo("/no/such/photo.jpg", 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::ImageDecode { .. }));
    }
}
