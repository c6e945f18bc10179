//! Image processing pipeline.
//!
//! Fetches each image reference, extracts its text, and optionally annotates
//! the result. Per-item failures (missing file, 404, OCR error, stage
//! timeout) become Failure entries in the batch; they never abort siblings.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::{run_requests, CancelFlag, PipelineContext, ScanEvent};
use crate::models::{AnnotationRequest, AnnotationResult, Input, OperationSet};

/// Service for processing image batches.
pub struct ImageService {
    ctx: Arc<PipelineContext>,
    max_concurrency: usize,
    event_tx: Option<mpsc::Sender<ScanEvent>>,
}

impl ImageService {
    /// Create a new image service.
    pub fn new(ctx: Arc<PipelineContext>, max_concurrency: usize) -> Self {
        Self {
            ctx,
            max_concurrency,
            event_tx: None,
        }
    }

    /// Attach a progress event channel.
    pub fn with_events(mut self, event_tx: mpsc::Sender<ScanEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Process a batch of image references (paths or URLs). Output is
    /// index-aligned with the input.
    pub async fn process(
        &self,
        references: Vec<String>,
        operations: OperationSet,
    ) -> Vec<AnnotationResult> {
        let requests = references
            .into_iter()
            .enumerate()
            .map(|(index, reference)| AnnotationRequest::new(index, Input::Image(reference)))
            .collect();
        self.process_requests(requests, operations, CancelFlag::new())
            .await
    }

    /// Process pre-built requests (used by the orchestrator for mixed
    /// batches, where indices refer to the full batch).
    pub(crate) async fn process_requests(
        &self,
        requests: Vec<AnnotationRequest>,
        operations: OperationSet,
        cancel: CancelFlag,
    ) -> Vec<AnnotationResult> {
        let total = requests.len();
        if let Some(ref tx) = self.event_tx {
            let _ = tx
                .send(ScanEvent::BatchStarted { total_items: total })
                .await;
        }

        let results = run_requests(
            self.ctx.clone(),
            requests,
            operations,
            self.max_concurrency,
            cancel,
            self.event_tx.clone(),
        )
        .await;

        if let Some(ref tx) = self.event_tx {
            let succeeded = results.iter().filter(|r| r.is_success()).count();
            let _ = tx
                .send(ScanEvent::BatchComplete {
                    succeeded,
                    failed: total - succeeded,
                })
                .await;
        }

        results
    }
}
