//! Distributed batch execution.
//!
//! Large batches are handed to a [`DistributedRunner`], which maps the pure
//! per-item processing functions over the requests. Because those functions
//! carry no process-local state, any runner that applies them faithfully
//! (local pool, worker fleet) produces results identical to the inline path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{run_requests, CancelFlag, PipelineContext, ScanEvent};
use crate::models::{AnnotationRequest, AnnotationResult, OperationSet};

/// Executes a batch of requests somewhere.
///
/// Implementations must return exactly one result per request, in request
/// order, and must isolate per-item failures. Per-item progress goes to
/// `event_tx` when a channel is attached, same as the inline path.
#[async_trait]
pub trait DistributedRunner: Send + Sync {
    /// Runner name for logs.
    fn name(&self) -> &str;

    /// Map the per-item pipeline over `requests`.
    async fn map(
        &self,
        ctx: Arc<PipelineContext>,
        requests: Vec<AnnotationRequest>,
        operations: OperationSet,
        cancel: CancelFlag,
        event_tx: Option<mpsc::Sender<ScanEvent>>,
    ) -> Vec<AnnotationResult>;
}

/// Default runner: the in-process bounded worker pool.
pub struct LocalRunner {
    max_concurrency: usize,
}

impl LocalRunner {
    pub fn new(max_concurrency: usize) -> Self {
        Self { max_concurrency }
    }
}

#[async_trait]
impl DistributedRunner for LocalRunner {
    fn name(&self) -> &str {
        "local"
    }

    async fn map(
        &self,
        ctx: Arc<PipelineContext>,
        requests: Vec<AnnotationRequest>,
        operations: OperationSet,
        cancel: CancelFlag,
        event_tx: Option<mpsc::Sender<ScanEvent>>,
    ) -> Vec<AnnotationResult> {
        run_requests(
            ctx,
            requests,
            operations,
            self.max_concurrency,
            cancel,
            event_tx,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::{DetectedEntity, Input, ScanStatus};
    use crate::services::test_support::{context_with_recognizer, FixedRecognizer};

    fn requests(texts: &[&str]) -> Vec<AnnotationRequest> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| AnnotationRequest::new(i, Input::Text(t.to_string())))
            .collect()
    }

    #[tokio::test]
    async fn test_local_runner_matches_inline_results() {
        let mut script = HashMap::new();
        script.insert(
            "call me at home".to_string(),
            vec![DetectedEntity::new("PHONE_NUMBER", 0, 4, "call", 0.8)],
        );

        let ctx = Arc::new(context_with_recognizer(FixedRecognizer::scripted(
            script.clone(),
        )));
        let runner = LocalRunner::new(2);
        let mapped = runner
            .map(
                ctx.clone(),
                requests(&["call me at home", "nothing here"]),
                OperationSet::annotate_pii(),
                CancelFlag::new(),
                None,
            )
            .await;

        let inline = run_requests(
            ctx,
            requests(&["call me at home", "nothing here"]),
            OperationSet::annotate_pii(),
            4,
            CancelFlag::new(),
            None,
        )
        .await;

        assert_eq!(mapped.len(), inline.len());
        for (m, i) in mapped.iter().zip(inline.iter()) {
            assert_eq!(m.status, i.status);
            assert_eq!(m.entities, i.entities);
            assert_eq!(m.index, i.index);
        }
    }

    #[tokio::test]
    async fn test_local_runner_preserves_order_and_length() {
        let ctx = Arc::new(context_with_recognizer(FixedRecognizer::empty()));
        let runner = LocalRunner::new(3);
        let texts: Vec<String> = (0..10).map(|i| format!("item {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();

        let results = runner
            .map(
                ctx,
                requests(&refs),
                OperationSet::annotate_pii(),
                CancelFlag::new(),
                None,
            )
            .await;

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(result.status, ScanStatus::Success);
        }
    }

    #[tokio::test]
    async fn test_local_runner_reports_per_item_events() {
        let ctx = Arc::new(context_with_recognizer(FixedRecognizer::empty()));
        let runner = LocalRunner::new(2);
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);

        let results = runner
            .map(
                ctx,
                requests(&["one", "two", "three"]),
                OperationSet::annotate_pii(),
                CancelFlag::new(),
                Some(tx),
            )
            .await;
        assert_eq!(results.len(), 3);

        let mut completed = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ScanEvent::ItemCompleted { .. }) {
                completed += 1;
            }
        }
        assert_eq!(completed, 3);
    }
}
