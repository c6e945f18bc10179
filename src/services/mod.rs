//! Pipeline services.
//!
//! [`TextService`] and [`ImageService`] drive batches of their input kind;
//! both delegate per-item work to the pure functions in [`item`], so the
//! inline, detached, and distributed execution paths all produce identical
//! results. Separated from UI concerns - progress is reported through
//! [`ScanEvent`]s when a channel is attached.

mod distributed;
mod events;
mod image;
mod item;
mod text;

pub use distributed::{DistributedRunner, LocalRunner};
pub use events::ScanEvent;
pub use image::ImageService;
pub use item::{
    annotate_text, process_image_item, process_item, process_text_item, PipelineContext,
};
pub use text::TextService;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::models::{
    AnnotationRequest, AnnotationResult, FailureKind, Input, OperationSet, ScanFailure,
};

/// Batch-level cancellation flag, shared between a caller and in-flight
/// workers. Cancelling stops dispatch of not-yet-started items; items already
/// running complete normally.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Spawn one bounded worker task per request.
///
/// Returned handles are aligned with `requests`. Each task waits for a
/// semaphore permit, honors the cancel flag before starting its item, and
/// reports progress on the event channel when one is attached.
pub(crate) fn spawn_requests(
    ctx: Arc<PipelineContext>,
    requests: Vec<AnnotationRequest>,
    operations: OperationSet,
    max_concurrency: usize,
    cancel: CancelFlag,
    event_tx: Option<mpsc::Sender<ScanEvent>>,
) -> Vec<JoinHandle<AnnotationResult>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    requests
        .into_iter()
        .map(|request| {
            let ctx = ctx.clone();
            let operations = operations.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let event_tx = event_tx.clone();

            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");

                let reference = match &request.input {
                    Input::Image(r) => Some(r.clone()),
                    Input::Text(_) => None,
                };

                if cancel.is_cancelled() {
                    let mut result = AnnotationResult::failure(
                        request.id,
                        request.index,
                        ScanFailure::cancelled(),
                    );
                    if let Some(ref r) = reference {
                        result = result.with_reference(r);
                    }
                    return result;
                }

                if let Some(ref tx) = event_tx {
                    let _ = tx
                        .send(ScanEvent::ItemStarted {
                            index: request.index,
                            description: request.input.describe(),
                        })
                        .await;
                }

                let result = process_item(ctx, request, operations).await;

                if let Some(ref tx) = event_tx {
                    let event = if result.is_success() {
                        ScanEvent::ItemCompleted {
                            index: result.index,
                            entity_count: result.entities.len(),
                        }
                    } else {
                        ScanEvent::ItemFailed {
                            index: result.index,
                            error: result
                                .error
                                .as_ref()
                                .map(|e| e.to_string())
                                .unwrap_or_default(),
                        }
                    };
                    let _ = tx.send(event).await;
                }

                result
            })
        })
        .collect()
}

/// Run requests to completion, restoring submission order.
///
/// A panicked worker yields a Failure entry for its slot; the output always
/// has the same length and order as `requests`.
pub(crate) async fn run_requests(
    ctx: Arc<PipelineContext>,
    requests: Vec<AnnotationRequest>,
    operations: OperationSet,
    max_concurrency: usize,
    cancel: CancelFlag,
    event_tx: Option<mpsc::Sender<ScanEvent>>,
) -> Vec<AnnotationResult> {
    // Remember identity per slot in case a worker panics.
    let slots: Vec<(uuid::Uuid, usize)> = requests.iter().map(|r| (r.id, r.index)).collect();

    let handles = spawn_requests(ctx, requests, operations, max_concurrency, cancel, event_tx);

    futures::future::join_all(handles)
        .await
        .into_iter()
        .zip(slots)
        .map(|(joined, (id, index))| match joined {
            Ok(result) => result,
            Err(join_err) => {
                tracing::warn!("item worker panicked: {}", join_err);
                AnnotationResult::failure(
                    id,
                    index,
                    ScanFailure::new(
                        FailureKind::Recognition,
                        format!("item worker failed: {join_err}"),
                    ),
                )
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Mock backends for pipeline tests.

    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::PipelineContext;
    use crate::fetch::{FetchError, FetchedImage, ImageFetcher};
    use crate::models::DetectedEntity;
    use crate::ner::{EntityRecognizer, RecognitionError};
    use crate::ocr::{ExtractionError, TextExtractor};

    /// Minimal 1x1 PNG header, enough for content sniffing.
    pub const PNG_BYTES: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89,
    ];

    /// Scriptable recognizer for tests. Counts invocations.
    pub struct FixedRecognizer {
        mode: RecognizerMode,
        pub calls: AtomicUsize,
    }

    enum RecognizerMode {
        /// Return these entities for every chunk.
        PerChunk(Vec<DetectedEntity>),
        /// Always fail.
        Failing(fn() -> RecognitionError),
        /// Fail when the text contains "FAIL", otherwise return per-text
        /// entities from the script (empty if unscripted).
        Scripted(HashMap<String, Vec<DetectedEntity>>),
    }

    impl FixedRecognizer {
        pub fn per_chunk(entities: Vec<DetectedEntity>) -> Self {
            Self {
                mode: RecognizerMode::PerChunk(entities),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(f: fn() -> RecognitionError) -> Self {
            Self {
                mode: RecognizerMode::Failing(f),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn scripted(script: HashMap<String, Vec<DetectedEntity>>) -> Self {
            Self {
                mode: RecognizerMode::Scripted(script),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn empty() -> Self {
            Self::scripted(HashMap::new())
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl EntityRecognizer for FixedRecognizer {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        fn recognize(&self, text: &str) -> Result<Vec<DetectedEntity>, RecognitionError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match &self.mode {
                RecognizerMode::PerChunk(entities) => Ok(entities.clone()),
                RecognizerMode::Failing(f) => Err(f()),
                RecognizerMode::Scripted(script) => {
                    if text.contains("FAIL") {
                        return Err(RecognitionError::Backend("scripted failure".to_string()));
                    }
                    Ok(script.get(text).cloned().unwrap_or_default())
                }
            }
        }
    }

    /// Extractor returning a fixed string, or failing.
    pub struct FixedExtractor {
        output: Result<String, String>,
    }

    impl FixedExtractor {
        pub fn returning(text: &str) -> Self {
            Self {
                output: Ok(text.to_string()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                output: Err(message.to_string()),
            }
        }
    }

    impl TextExtractor for FixedExtractor {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        fn extract(&self, _path: &Path) -> Result<String, ExtractionError> {
            match &self.output {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(ExtractionError::ExtractionFailed(message.clone())),
            }
        }
    }

    /// Fetcher serving PNG bytes for known references, NotFound otherwise.
    /// References listed in `slow` sleep first (timeout tests).
    pub struct FixedFetcher {
        known: Vec<String>,
        slow_for: Option<Duration>,
    }

    impl FixedFetcher {
        pub fn serving(refs: &[&str]) -> Self {
            Self {
                known: refs.iter().map(|s| s.to_string()).collect(),
                slow_for: None,
            }
        }

        pub fn slow(refs: &[&str], delay: Duration) -> Self {
            Self {
                known: refs.iter().map(|s| s.to_string()).collect(),
                slow_for: Some(delay),
            }
        }
    }

    #[async_trait]
    impl ImageFetcher for FixedFetcher {
        async fn fetch(&self, reference: &str) -> Result<FetchedImage, FetchError> {
            if let Some(delay) = self.slow_for {
                tokio::time::sleep(delay).await;
            }
            if self.known.iter().any(|r| r == reference) {
                Ok(FetchedImage {
                    bytes: PNG_BYTES.to_vec(),
                    extension: "png".to_string(),
                })
            } else {
                Err(FetchError::NotFound(reference.to_string()))
            }
        }
    }

    /// Context with the given recognizer and benign image backends.
    pub fn context_with_recognizer(recognizer: FixedRecognizer) -> PipelineContext {
        context(
            recognizer,
            FixedExtractor::returning("extracted text"),
            FixedFetcher::serving(&["good.png"]),
        )
    }

    pub fn context(
        recognizer: FixedRecognizer,
        extractor: FixedExtractor,
        fetcher: FixedFetcher,
    ) -> PipelineContext {
        PipelineContext {
            recognizer: Arc::new(recognizer),
            extractor: Arc::new(extractor),
            fetcher: Arc::new(fetcher),
            priority: Vec::new(),
            chunk_length: 1000,
            fetch_timeout: Duration::from_secs(5),
            extract_timeout: Duration::from_secs(5),
            recognize_timeout: Duration::from_secs(5),
        }
    }
}
