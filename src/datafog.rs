//! The DataFog orchestrator.
//!
//! Owns resolved backends and drives batches through the text and image
//! pipelines. Mixed batches are partitioned by input kind and re-merged into
//! submission order; batches at or above `distributed_threshold` go through
//! the configured [`DistributedRunner`] instead of the inline services.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ConfigError, DataFogConfig};
use crate::fetch::HttpImageFetcher;
use crate::models::{
    AnnotationRequest, AnnotationResult, BatchResult, FailureKind, Input, OperationSet,
    PipelineOperation, ScanFailure,
};
use crate::ner::{create_recognizer, RECOGNIZER_IDS};
use crate::ocr::{create_extractor, EXTRACTOR_IDS};
use crate::services::{
    spawn_requests, CancelFlag, DistributedRunner, ImageService, LocalRunner, PipelineContext,
    ScanEvent, TextService,
};

/// Handle to a batch running in the background.
///
/// Dropping the handle detaches the batch; [`BatchHandle::join`] awaits it
/// and yields the same index-aligned [`BatchResult`] the blocking path
/// produces. [`BatchHandle::cancel`] stops dispatch of not-yet-started
/// items; items already running complete normally.
pub struct BatchHandle {
    handles: Vec<JoinHandle<AnnotationResult>>,
    slots: Vec<(Uuid, usize)>,
    cancel: CancelFlag,
}

impl BatchHandle {
    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Request cancellation of not-yet-started items.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Await all items and collect results in submission order.
    pub async fn join(self) -> BatchResult {
        let results = futures::future::join_all(self.handles)
            .await
            .into_iter()
            .zip(self.slots)
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
            .collect();
        BatchResult::new(results)
    }
}

/// Orchestrates PII annotation over batches of text and image inputs.
///
/// Backends are resolved once at construction from the configured ids and
/// shared immutably across all batches this instance runs.
pub struct DataFog {
    config: DataFogConfig,
    ctx: Arc<PipelineContext>,
    runner: Arc<dyn DistributedRunner>,
    event_tx: Option<mpsc::Sender<ScanEvent>>,
}

impl DataFog {
    /// Build an orchestrator from configuration. Fails fast on invalid
    /// settings or unknown backend ids; no work is dispatched from here.
    pub fn new(config: DataFogConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let recognizer = create_recognizer(&config.recognizer_backend).ok_or_else(|| {
            ConfigError::UnknownRecognizer(
                config.recognizer_backend.clone(),
                RECOGNIZER_IDS.join(", "),
            )
        })?;
        let extractor = create_extractor(&config.extractor_backend).ok_or_else(|| {
            ConfigError::UnknownExtractor(
                config.extractor_backend.clone(),
                EXTRACTOR_IDS.join(", "),
            )
        })?;
        let fetcher = Arc::new(HttpImageFetcher::new(config.fetch_timeout()));

        info!(
            recognizer = recognizer.name(),
            extractor = extractor.name(),
            max_concurrency = config.max_concurrency,
            "datafog initialized"
        );

        let ctx = Arc::new(PipelineContext {
            recognizer,
            extractor,
            fetcher,
            priority: config.priority_order(),
            chunk_length: config.text_chunk_length,
            fetch_timeout: config.fetch_timeout(),
            extract_timeout: config.extract_timeout(),
            recognize_timeout: config.recognize_timeout(),
        });
        let runner = Arc::new(LocalRunner::new(config.max_concurrency));

        Ok(Self {
            config,
            ctx,
            runner,
            event_tx: None,
        })
    }

    /// Build with default configuration.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(DataFogConfig::default())
    }

    /// Replace the distributed runner used for large batches.
    pub fn with_runner(mut self, runner: Arc<dyn DistributedRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Attach a progress event channel.
    pub fn with_event_channel(mut self, event_tx: mpsc::Sender<ScanEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &DataFogConfig {
        &self.config
    }

    /// Shared pipeline context (backends and tuning).
    pub fn context(&self) -> Arc<PipelineContext> {
        self.ctx.clone()
    }

    /// Run a batch to completion. The result is index-aligned with `inputs`
    /// and always has the same length.
    pub async fn run(&self, inputs: Vec<Input>, operations: OperationSet) -> BatchResult {
        let requests = Self::to_requests(inputs);
        if requests.is_empty() {
            return BatchResult::new(Vec::new());
        }

        if requests.len() >= self.config.distributed_threshold {
            debug!(
                items = requests.len(),
                runner = self.runner.name(),
                "dispatching batch to distributed runner"
            );
            let results = self
                .runner
                .map(
                    self.ctx.clone(),
                    requests,
                    operations,
                    CancelFlag::new(),
                    self.event_tx.clone(),
                )
                .await;
            return BatchResult::new(results);
        }

        self.run_partitioned(requests, operations, CancelFlag::new())
            .await
    }

    /// Start a batch in the background and return a joinable handle with
    /// batch-level cancellation.
    pub fn run_detached(&self, inputs: Vec<Input>, operations: OperationSet) -> BatchHandle {
        let requests = Self::to_requests(inputs);
        let slots = requests.iter().map(|r| (r.id, r.index)).collect();
        let cancel = CancelFlag::new();
        let handles = spawn_requests(
            self.ctx.clone(),
            requests,
            operations,
            self.config.max_concurrency,
            cancel.clone(),
            self.event_tx.clone(),
        );
        BatchHandle {
            handles,
            slots,
            cancel,
        }
    }

    /// Annotate a batch of plain texts.
    pub async fn run_text_pipeline(&self, texts: Vec<String>) -> BatchResult {
        self.run(
            texts.into_iter().map(Input::Text).collect(),
            OperationSet::annotate_pii(),
        )
        .await
    }

    /// Extract and annotate a batch of image references.
    pub async fn run_ocr_pipeline(&self, image_refs: Vec<String>) -> BatchResult {
        let operations = OperationSet::new(&[
            PipelineOperation::ExtractText,
            PipelineOperation::AnnotatePii,
        ])
        .unwrap_or_default();
        self.run(image_refs.into_iter().map(Input::Image).collect(), operations)
            .await
    }

    fn to_requests(inputs: Vec<Input>) -> Vec<AnnotationRequest> {
        inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| AnnotationRequest::new(index, input))
            .collect()
    }

    /// Partition by input kind, run each kind through its service, and
    /// re-merge into submission order.
    async fn run_partitioned(
        &self,
        requests: Vec<AnnotationRequest>,
        operations: OperationSet,
        cancel: CancelFlag,
    ) -> BatchResult {
        let total = requests.len();
        let (text_requests, image_requests): (Vec<_>, Vec<_>) =
            requests.into_iter().partition(|r| r.input.is_text());

        let text_service = self.text_service();
        let image_service = self.image_service();

        let (text_results, image_results) = tokio::join!(
            text_service.annotate_requests(text_requests, operations.clone(), cancel.clone()),
            image_service.process_requests(image_requests, operations, cancel),
        );

        let mut merged: Vec<Option<AnnotationResult>> = (0..total).map(|_| None).collect();
        for result in text_results.into_iter().chain(image_results) {
            let index = result.index;
            merged[index] = Some(result);
        }

        // Every request lands in exactly one partition, so every slot fills.
        let results = merged
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    AnnotationResult::failure(
                        Uuid::nil(),
                        index,
                        ScanFailure::new(FailureKind::Recognition, "result slot never filled"),
                    )
                })
            })
            .collect();
        BatchResult::new(results)
    }

    fn text_service(&self) -> TextService {
        let service = TextService::new(self.ctx.clone(), self.config.max_concurrency);
        match &self.event_tx {
            Some(tx) => service.with_events(tx.clone()),
            None => service,
        }
    }

    fn image_service(&self) -> ImageService {
        let service = ImageService::new(self.ctx.clone(), self.config.max_concurrency);
        match &self.event_tx {
            Some(tx) => service.with_events(tx.clone()),
            None => service,
        }
    }
}
