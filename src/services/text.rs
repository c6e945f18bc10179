//! Text annotation pipeline.
//!
//! Runs the entity recognizer over batches of text items. Items are
//! independent: no shared mutable state, and one item's recognizer failure
//! never aborts its siblings.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::{run_requests, CancelFlag, PipelineContext, ScanEvent};
use crate::models::{AnnotationRequest, AnnotationResult, Input, OperationSet};

/// Service for annotating text batches.
pub struct TextService {
    ctx: Arc<PipelineContext>,
    max_concurrency: usize,
    event_tx: Option<mpsc::Sender<ScanEvent>>,
}

impl TextService {
    /// Create a new text service.
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

    /// Annotate a batch of texts. Output is index-aligned with the input.
    pub async fn annotate(&self, texts: Vec<String>) -> Vec<AnnotationResult> {
        let requests = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| AnnotationRequest::new(index, Input::Text(text)))
            .collect();
        self.annotate_requests(requests, OperationSet::annotate_pii(), CancelFlag::new())
            .await
    }

    /// Annotate pre-built requests (used by the orchestrator for mixed
    /// batches, where indices refer to the full batch).
    pub(crate) async fn annotate_requests(
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

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::{DetectedEntity, EntityType, FailureKind, ScanStatus};
    use crate::services::test_support::{context_with_recognizer, FixedRecognizer};

    const TIM_COOK: &str = "Tim Cook is the CEO of Apple and is based in Cupertino, California";

    fn tim_cook_entities() -> Vec<DetectedEntity> {
        vec![
            DetectedEntity::new("PERSON", 0, 8, "Tim Cook", 0.85),
            DetectedEntity::new("ORG", 23, 28, "Apple", 0.85),
            DetectedEntity::new("LOC", 45, 66, "Cupertino, California", 0.85),
        ]
    }

    fn service_with(recognizer: FixedRecognizer) -> TextService {
        TextService::new(Arc::new(context_with_recognizer(recognizer)), 4)
    }

    #[tokio::test]
    async fn test_scenario_a_non_overlapping_entities_pass_through() {
        let mut script = HashMap::new();
        script.insert(TIM_COOK.to_string(), tim_cook_entities());
        let service = service_with(FixedRecognizer::scripted(script));

        let results = service.annotate(vec![TIM_COOK.to_string()]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ScanStatus::Success);
        assert_eq!(results[0].entities.len(), 3);
        let labels: Vec<&str> = results[0].entities.iter().map(|e| e.label.label()).collect();
        assert_eq!(labels, vec!["PERSON", "ORG", "LOC"]);
    }

    #[tokio::test]
    async fn test_scenario_d_identical_span_keeps_higher_score() {
        let mut script = HashMap::new();
        script.insert(
            "ambiguous".to_string(),
            vec![
                DetectedEntity::new("PERSON", 0, 9, "ambiguous", 0.90),
                DetectedEntity::new("ORG", 0, 9, "ambiguous", 0.95),
            ],
        );
        let service = service_with(FixedRecognizer::scripted(script));

        let results = service.annotate(vec!["ambiguous".to_string()]).await;
        assert_eq!(results[0].entities.len(), 1);
        assert_eq!(results[0].entities[0].label, EntityType::Org);
    }

    #[tokio::test]
    async fn test_isolation_one_failure_does_not_abort_batch() {
        let service = service_with(FixedRecognizer::empty());

        let texts = vec![
            "fine one".to_string(),
            "this will FAIL".to_string(),
            "fine two".to_string(),
        ];
        let results = service.annotate(texts).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, ScanStatus::Success);
        assert_eq!(results[1].status, ScanStatus::Failure);
        assert_eq!(
            results[1].error.as_ref().unwrap().kind,
            FailureKind::Recognition
        );
        assert_eq!(results[2].status, ScanStatus::Success);
    }

    #[tokio::test]
    async fn test_order_preserved_for_batch() {
        let service = service_with(FixedRecognizer::empty());

        let texts: Vec<String> = (0..16).map(|i| format!("text number {i}")).collect();
        let results = service.annotate(texts).await;

        assert_eq!(results.len(), 16);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
        }
    }

    #[tokio::test]
    async fn test_idempotence_same_input_same_entities() {
        let mut script = HashMap::new();
        script.insert(TIM_COOK.to_string(), tim_cook_entities());
        let service = service_with(FixedRecognizer::scripted(script));

        let first = service.annotate(vec![TIM_COOK.to_string()]).await;
        let second = service.annotate(vec![TIM_COOK.to_string()]).await;
        assert_eq!(first[0].entities, second[0].entities);
    }

    #[tokio::test]
    async fn test_cancelled_batch_yields_full_length_result() {
        let service = service_with(FixedRecognizer::empty());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let requests = vec![
            AnnotationRequest::new(0, Input::Text("a".to_string())),
            AnnotationRequest::new(1, Input::Text("b".to_string())),
        ];
        let results = service
            .annotate_requests(requests, OperationSet::annotate_pii(), cancel)
            .await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.status, ScanStatus::Failure);
            assert_eq!(
                result.error.as_ref().unwrap().kind,
                FailureKind::Cancelled
            );
        }
    }
}
