//! Image fetching.
//!
//! Resolves an image reference (local path or http(s) URL) to raw bytes.
//! Content is sniffed so non-image payloads fail here instead of confusing
//! an OCR backend downstream.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tempfile::NamedTempFile;

use crate::models::{FailureKind, ScanFailure};

/// User agent sent with image requests.
const USER_AGENT: &str = concat!("datafog/", env!("CARGO_PKG_VERSION"));

/// Errors from image fetching.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for ScanFailure {
    fn from(e: FetchError) -> Self {
        ScanFailure::new(FailureKind::Fetch, e.to_string())
    }
}

/// A fetched image: raw bytes plus the sniffed format.
#[derive(Debug)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// File extension reported by content sniffing (e.g. "png").
    pub extension: String,
}

impl FetchedImage {
    /// Materialize the bytes as a named temp file for path-based OCR
    /// backends. The file is removed when the handle drops.
    pub fn into_temp_file(self) -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("datafog-")
            .suffix(&format!(".{}", self.extension))
            .tempfile()?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        Ok(file)
    }
}

/// A backend that resolves image references to bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<FetchedImage, FetchError>;
}

/// Default fetcher: local filesystem paths and http(s) URLs via reqwest.
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// Create a new fetcher with the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    fn is_url(reference: &str) -> bool {
        url::Url::parse(reference)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Sniff content and reject anything that isn't an image.
    fn validate(reference: &str, bytes: Vec<u8>) -> Result<FetchedImage, FetchError> {
        match infer::get(&bytes) {
            Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(FetchedImage {
                bytes,
                extension: kind.extension().to_string(),
            }),
            Some(kind) => Err(FetchError::UnsupportedFormat(format!(
                "{} is {}, not an image",
                reference,
                kind.mime_type()
            ))),
            None => Err(FetchError::UnsupportedFormat(format!(
                "{} has unrecognized content",
                reference
            ))),
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Self::validate(url, bytes.to_vec())
    }

    fn fetch_path(&self, path: &str) -> Result<FetchedImage, FetchError> {
        let path_ref = Path::new(path);
        if !path_ref.exists() {
            return Err(FetchError::NotFound(path.to_string()));
        }
        let bytes = std::fs::read(path_ref)?;
        Self::validate(path, bytes)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, reference: &str) -> Result<FetchedImage, FetchError> {
        if Self::is_url(reference) {
            tracing::debug!("fetching image from url: {}", reference);
            self.fetch_url(reference).await
        } else {
            tracing::debug!("reading image from path: {}", reference);
            self.fetch_path(reference)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal 1x1 PNG.
    const PNG_BYTES: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89,
    ];

    #[test]
    fn test_validate_accepts_png() {
        let img = HttpImageFetcher::validate("x.png", PNG_BYTES.to_vec()).unwrap();
        assert_eq!(img.extension, "png");
    }

    #[test]
    fn test_validate_rejects_text() {
        let err = HttpImageFetcher::validate("x.txt", b"hello world".to_vec()).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5));
        let err = fetcher.fetch("/no/such/file.png").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_local_png_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(PNG_BYTES).unwrap();
        file.flush().unwrap();

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5));
        let img = fetcher.fetch(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(img.bytes, PNG_BYTES);
        assert_eq!(img.extension, "png");
    }

    #[test]
    fn test_url_detection() {
        assert!(HttpImageFetcher::is_url("https://example.com/a.png"));
        assert!(HttpImageFetcher::is_url("http://example.com/a.png"));
        assert!(!HttpImageFetcher::is_url("/tmp/a.png"));
        assert!(!HttpImageFetcher::is_url("relative/a.png"));
    }
}
