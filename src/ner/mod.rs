//! Entity recognition module.
//!
//! Recognizers scan plain text and report [`DetectedEntity`] spans. The
//! pipeline treats them as interchangeable backends behind the
//! [`EntityRecognizer`] trait, resolved once by name at orchestrator
//! construction.
//!
//! ## Backends
//!
//! - **pattern**: regex and heuristic matching for common PII categories
//!   (default, no external dependencies)
//!
//! Model-backed recognizers can be added by implementing the trait and
//! registering an id in [`create_recognizer`].

mod consolidate;
mod pattern;

pub use consolidate::consolidate;
pub use pattern::PatternRecognizer;

use std::sync::Arc;

use crate::models::{DetectedEntity, FailureKind, ScanFailure};

/// Texts beyond this size are truncated before recognition.
pub const MAX_TEXT_SIZE: usize = 1_000_000;

/// Errors from entity recognition backends.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("recognition failed: {0}")]
    Backend(String),

    #[error("recognizer not available: {0}")]
    BackendNotAvailable(String),
}

impl From<RecognitionError> for ScanFailure {
    fn from(e: RecognitionError) -> Self {
        ScanFailure::new(FailureKind::Recognition, e.to_string())
    }
}

/// A backend that detects entities in text.
///
/// Implementations must be safe to share read-only across concurrent item
/// executions; `recognize` takes `&self` and may run on the blocking pool.
pub trait EntityRecognizer: Send + Sync {
    /// Backend id as used in configuration.
    fn name(&self) -> &str;

    /// Whether the backend is ready to run.
    fn is_available(&self) -> bool;

    /// Human-readable reason when `is_available` returns false.
    fn availability_hint(&self) -> String;

    /// Detect entities in `text`. Spans are byte offsets into `text`.
    fn recognize(&self, text: &str) -> Result<Vec<DetectedEntity>, RecognitionError>;
}

/// Recognizer ids accepted in configuration.
pub const RECOGNIZER_IDS: &[&str] = &["pattern"];

/// Resolve a recognizer backend by configuration id.
pub fn create_recognizer(id: &str) -> Option<Arc<dyn EntityRecognizer>> {
    match id {
        "pattern" => Some(Arc::new(PatternRecognizer::new())),
        _ => None,
    }
}
