//! Per-item processing functions.
//!
//! Everything here is a pure function over one [`AnnotationRequest`] plus a
//! shared read-only [`PipelineContext`]: no process-local mutable state, so a
//! distributed runner can apply the same functions across partitions of a
//! large batch and get byte-identical results to the single-process path.

use std::sync::Arc;
use std::time::Duration;

use crate::fetch::ImageFetcher;
use crate::models::{
    AnnotationRequest, AnnotationResult, DetectedEntity, EntityType, FailureKind, Input,
    OperationSet, ScanFailure,
};
use crate::ner::{consolidate, EntityRecognizer, MAX_TEXT_SIZE};
use crate::ocr::TextExtractor;

/// Shared, immutable backend handles and tuning for one pipeline run.
///
/// Resolved once at orchestrator construction; item executions only ever
/// read from it.
pub struct PipelineContext {
    pub recognizer: Arc<dyn EntityRecognizer>,
    pub extractor: Arc<dyn TextExtractor>,
    pub fetcher: Arc<dyn ImageFetcher>,
    /// Label priority for consolidation tie-breaks.
    pub priority: Vec<EntityType>,
    /// Chunk size for long texts, in bytes (floored to char boundaries).
    pub chunk_length: usize,
    pub fetch_timeout: Duration,
    pub extract_timeout: Duration,
    pub recognize_timeout: Duration,
}

/// Process one request, dispatching on input kind.
pub async fn process_item(
    ctx: Arc<PipelineContext>,
    request: AnnotationRequest,
    operations: OperationSet,
) -> AnnotationResult {
    match &request.input {
        Input::Text(_) => process_text_item(&ctx, &request, &operations).await,
        Input::Image(_) => process_image_item(&ctx, &request, &operations).await,
    }
}

/// Annotate one text item.
///
/// With `extract_text` only, text inputs pass through untouched: no
/// recognizer call, empty entity list.
pub async fn process_text_item(
    ctx: &PipelineContext,
    request: &AnnotationRequest,
    operations: &OperationSet,
) -> AnnotationResult {
    let Input::Text(ref text) = request.input else {
        return AnnotationResult::failure(
            request.id,
            request.index,
            ScanFailure::new(FailureKind::Recognition, "text pipeline got an image input"),
        );
    };

    if !operations.wants_annotation() {
        return AnnotationResult::success(request.id, request.index, Vec::new(), None);
    }

    match annotate_text(ctx, text).await {
        Ok(entities) => AnnotationResult::success(request.id, request.index, entities, None),
        Err(failure) => AnnotationResult::failure(request.id, request.index, failure),
    }
}

/// Run the fetch → extract → annotate chain for one image item.
///
/// A failure at any stage short-circuits the rest of this item's chain and
/// never touches sibling items.
pub async fn process_image_item(
    ctx: &PipelineContext,
    request: &AnnotationRequest,
    operations: &OperationSet,
) -> AnnotationResult {
    let Input::Image(ref reference) = request.input else {
        return AnnotationResult::failure(
            request.id,
            request.index,
            ScanFailure::new(FailureKind::Fetch, "image pipeline got a text input"),
        )
        .with_reference("");
    };

    match run_image_chain(ctx, reference, operations).await {
        Ok((entities, extracted_text)) => {
            AnnotationResult::success(request.id, request.index, entities, extracted_text)
                .with_reference(reference)
        }
        Err(failure) => {
            AnnotationResult::failure(request.id, request.index, failure).with_reference(reference)
        }
    }
}

async fn run_image_chain(
    ctx: &PipelineContext,
    reference: &str,
    operations: &OperationSet,
) -> Result<(Vec<DetectedEntity>, Option<String>), ScanFailure> {
    // Stage 1: fetch.
    let fetched = match tokio::time::timeout(ctx.fetch_timeout, ctx.fetcher.fetch(reference)).await
    {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ScanFailure::timeout("fetch", ctx.fetch_timeout.as_secs())),
    };

    // Stage 2: extract. OCR backends take paths, so materialize the bytes;
    // the temp file lives until this function returns.
    let temp_file = fetched
        .into_temp_file()
        .map_err(|e| ScanFailure::new(FailureKind::Fetch, e.to_string()))?;

    let extractor = ctx.extractor.clone();
    let path = temp_file.path().to_path_buf();
    let handle = tokio::task::spawn_blocking(move || extractor.extract(&path));

    let text = match tokio::time::timeout(ctx.extract_timeout, handle).await {
        Ok(Ok(Ok(text))) => text,
        Ok(Ok(Err(e))) => return Err(e.into()),
        Ok(Err(join_err)) => {
            return Err(ScanFailure::new(
                FailureKind::Extraction,
                format!("extraction task failed: {join_err}"),
            ))
        }
        Err(_) => {
            return Err(ScanFailure::timeout(
                "extract",
                ctx.extract_timeout.as_secs(),
            ))
        }
    };

    // Stage 3: annotate, unless extraction-only was requested.
    let entities = if operations.wants_annotation() {
        annotate_text(ctx, &text).await?
    } else {
        Vec::new()
    };

    let extracted_text = operations.wants_extraction().then_some(text);
    Ok((entities, extracted_text))
}

/// Annotate a single text: chunk, recognize concurrently on the blocking
/// pool, re-offset spans to the source text, consolidate.
pub async fn annotate_text(
    ctx: &PipelineContext,
    text: &str,
) -> Result<Vec<DetectedEntity>, ScanFailure> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let text = truncate_at_char_boundary(text, MAX_TEXT_SIZE);
    let chunks = chunk_text(text, ctx.chunk_length);

    let mut handles = Vec::with_capacity(chunks.len());
    for (offset, chunk) in chunks {
        let recognizer = ctx.recognizer.clone();
        let chunk = chunk.to_string();
        handles.push((
            offset,
            tokio::task::spawn_blocking(move || recognizer.recognize(&chunk)),
        ));
    }

    let recognize_all = async {
        let mut raw = Vec::new();
        for (offset, handle) in handles {
            let entities = handle.await.map_err(|join_err| {
                ScanFailure::new(
                    FailureKind::Recognition,
                    format!("recognition task failed: {join_err}"),
                )
            })?;
            let entities = entities.map_err(ScanFailure::from)?;
            raw.extend(entities.into_iter().map(|e| e.offset_by(offset)));
        }
        Ok::<_, ScanFailure>(raw)
    };

    let mut raw = match tokio::time::timeout(ctx.recognize_timeout, recognize_all).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ScanFailure::timeout(
                "recognize",
                ctx.recognize_timeout.as_secs(),
            ))
        }
    };

    // Enforce the span invariant before consolidation; a misbehaving backend
    // must not poison downstream consumers.
    raw.retain(|e| e.start <= e.end && e.end <= text.len());

    Ok(consolidate(raw, &ctx.priority))
}

/// Truncate to at most `max_len` bytes without splitting a char.
fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

/// Split text into chunks of at most `chunk_length` bytes, each starting at
/// a char boundary, paired with its byte offset into the source.
///
/// A char wider than `chunk_length` becomes its own chunk; the split must
/// always advance.
fn chunk_text(text: &str, chunk_length: usize) -> Vec<(usize, &str)> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + chunk_length).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end = start + 1;
            while !text.is_char_boundary(end) {
                end += 1;
            }
        }
        chunks.push((start, &text[start..end]));
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ner::RecognitionError;
    use crate::services::test_support::{context_with_recognizer, FixedRecognizer};

    #[test]
    fn test_chunk_text_offsets() {
        let text = "abcdefghij";
        let chunks = chunk_text(text, 4);
        assert_eq!(chunks, vec![(0, "abcd"), (4, "efgh"), (8, "ij")]);
    }

    #[test]
    fn test_chunk_text_respects_char_boundaries() {
        // 'é' is two bytes; a 3-byte chunk must not split it.
        let text = "aébé";
        let chunks = chunk_text(text, 3);
        for (_, chunk) in &chunks {
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
        let rejoined: String = chunks.iter().map(|(_, c)| *c).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_chunk_text_wide_char_exceeds_chunk_length() {
        // A 4-byte emoji with a 2-byte chunk size must still advance; the
        // wide char gets its own oversized chunk.
        let text = "\u{1F600}abc";
        let chunks = chunk_text(text, 2);
        assert_eq!(chunks, vec![(0, "\u{1F600}"), (4, "ab"), (6, "c")]);

        let rejoined: String = chunks.iter().map(|(_, c)| *c).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_chunk_text_one_byte_chunks_over_multibyte_text() {
        let text = "aé\u{4E2D}";
        let chunks = chunk_text(text, 1);
        assert_eq!(chunks, vec![(0, "a"), (1, "é"), (3, "\u{4E2D}")]);
    }

    #[test]
    fn test_truncate_at_char_boundary() {
        let text = "aaé";
        assert_eq!(truncate_at_char_boundary(text, 3), "aa");
        assert_eq!(truncate_at_char_boundary(text, 4), "aaé");
    }

    #[tokio::test]
    async fn test_annotate_text_reoffsets_chunked_spans() {
        // Recognizer reports span 0..5 in every chunk; with two chunks the
        // second hit must land at the chunk offset.
        let recognizer = FixedRecognizer::per_chunk(vec![DetectedEntity::new(
            "EMAIL", 0, 5, "aaaaa", 0.9,
        )]);
        let mut ctx = context_with_recognizer(recognizer);
        ctx.chunk_length = 10;
        let text = "a".repeat(20);

        let entities = annotate_text(&ctx, &text).await.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!((entities[0].start, entities[0].end), (0, 5));
        assert_eq!((entities[1].start, entities[1].end), (10, 15));
    }

    #[tokio::test]
    async fn test_annotate_text_drops_invalid_spans() {
        let recognizer = FixedRecognizer::per_chunk(vec![
            DetectedEntity::new("EMAIL", 0, 3, "abc", 0.9),
            DetectedEntity::new("EMAIL", 5, 4, "x", 0.9),
            DetectedEntity::new("EMAIL", 0, 9999, "x", 0.9),
        ]);
        let ctx = context_with_recognizer(recognizer);

        let entities = annotate_text(&ctx, "abcdef").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!((entities[0].start, entities[0].end), (0, 3));
    }

    #[tokio::test]
    async fn test_annotate_text_propagates_backend_error() {
        let recognizer = FixedRecognizer::failing(|| {
            RecognitionError::Backend("model exploded".to_string())
        });
        let ctx = context_with_recognizer(recognizer);

        let failure = annotate_text(&ctx, "some text").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Recognition);
        assert!(failure.message.contains("model exploded"));
    }

    #[tokio::test]
    async fn test_empty_text_skips_recognizer() {
        let recognizer = FixedRecognizer::failing(|| {
            RecognitionError::Backend("should not be called".to_string())
        });
        let ctx = context_with_recognizer(recognizer);
        assert!(annotate_text(&ctx, "").await.unwrap().is_empty());
    }
}
