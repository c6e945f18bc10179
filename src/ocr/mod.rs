//! Text extraction (OCR) module.
//!
//! Extracts text from image files using one of two interchangeable backends:
//!
//! - **Tesseract**: traditional OCR via the system binary (default)
//! - **OCRS**: pure-Rust OCR, models auto-download on first use
//!   (feature: `ocr-ocrs`)
//!
//! Backends are selected by configuration id and resolved once at
//! orchestrator construction. Extraction is CPU-bound; the image pipeline
//! runs it on the blocking pool.

mod model_utils;
mod tesseract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;

pub use model_utils::{check_binary, ensure_model_file, ModelDirConfig, ModelSpec};
pub use tesseract::TesseractExtractor;

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsExtractor;

use std::path::Path;
use std::sync::Arc;

use crate::models::{FailureKind, ScanFailure};

/// Errors from text extraction backends.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("image error: {0}")]
    ImageError(String),

    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExtractionError> for ScanFailure {
    fn from(e: ExtractionError) -> Self {
        ScanFailure::new(FailureKind::Extraction, e.to_string())
    }
}

/// A backend that extracts text from an image file.
///
/// Implementations are shared read-only across concurrent item executions;
/// `extract` takes `&self` and must not mutate backend state.
pub trait TextExtractor: Send + Sync {
    /// Backend id as used in configuration.
    fn name(&self) -> &str;

    /// Whether the backend is ready to run.
    fn is_available(&self) -> bool;

    /// Human-readable install/setup hint when the backend is unavailable.
    fn availability_hint(&self) -> String;

    /// Extract text from the image at `path`.
    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Extractor ids accepted in configuration.
#[cfg(feature = "ocr-ocrs")]
pub const EXTRACTOR_IDS: &[&str] = &["tesseract", "ocrs"];
#[cfg(not(feature = "ocr-ocrs"))]
pub const EXTRACTOR_IDS: &[&str] = &["tesseract"];

/// Resolve an extractor backend by configuration id.
pub fn create_extractor(id: &str) -> Option<Arc<dyn TextExtractor>> {
    match id {
        "tesseract" => Some(Arc::new(TesseractExtractor::new())),
        #[cfg(feature = "ocr-ocrs")]
        "ocrs" => Some(Arc::new(OcrsExtractor::new())),
        _ => None,
    }
}
