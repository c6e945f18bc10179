//! Batch input models.
//!
//! A batch is an ordered list of heterogeneous inputs. Each input becomes an
//! [`AnnotationRequest`] at submission time, and the request index ties the
//! eventual result back to its position in the batch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of work: raw text or a reference to an image.
///
/// Image references are either local filesystem paths or http(s) URLs; the
/// fetcher decides which at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Input {
    Text(String),
    Image(String),
}

impl Input {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    /// Human-readable identifier for logs and progress output.
    pub fn describe(&self) -> String {
        match self {
            Self::Text(t) => {
                let preview: String = t.chars().take(40).collect();
                if t.chars().count() > 40 {
                    format!("text:{preview}…")
                } else {
                    format!("text:{preview}")
                }
            }
            Self::Image(r) => format!("image:{r}"),
        }
    }
}

/// An input item bound to its batch position.
///
/// Created per item at batch submission, immutable, and consumed when its
/// result is produced. Carries everything a per-item worker needs so that
/// processing functions stay pure over the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRequest {
    /// Unique id for this unit of work.
    pub id: Uuid,
    /// Position in the submitted batch.
    pub index: usize,
    /// The raw payload.
    pub input: Input,
}

impl AnnotationRequest {
    pub fn new(index: usize, input: Input) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            input,
        }
    }
}

/// Operations a pipeline run can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOperation {
    ExtractText,
    AnnotatePii,
}

impl PipelineOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractText => "extract_text",
            Self::AnnotatePii => "annotate_pii",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "extract_text" => Some(Self::ExtractText),
            "annotate_pii" => Some(Self::AnnotatePii),
            _ => None,
        }
    }
}

/// Ordered, de-duplicated set of pipeline operations.
///
/// Extraction always precedes annotation for image inputs, regardless of the
/// order operations were listed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet(Vec<PipelineOperation>);

impl OperationSet {
    /// Build a set from a list, dropping duplicates while keeping canonical
    /// order (extract before annotate). Returns `None` for an empty list.
    pub fn new(ops: &[PipelineOperation]) -> Option<Self> {
        if ops.is_empty() {
            return None;
        }
        let mut ordered = Vec::with_capacity(2);
        if ops.contains(&PipelineOperation::ExtractText) {
            ordered.push(PipelineOperation::ExtractText);
        }
        if ops.contains(&PipelineOperation::AnnotatePii) {
            ordered.push(PipelineOperation::AnnotatePii);
        }
        Some(Self(ordered))
    }

    /// Parse a comma-separated operation list (e.g. `"extract_text,annotate_pii"`).
    /// Returns `Err` with the offending token for unknown operation names.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut ops = Vec::new();
        for token in s.split(',').filter(|t| !t.trim().is_empty()) {
            match PipelineOperation::parse(token) {
                Some(op) => ops.push(op),
                None => return Err(token.trim().to_string()),
            }
        }
        Self::new(&ops).ok_or_else(|| "empty operation set".to_string())
    }

    pub fn annotate_pii() -> Self {
        Self(vec![PipelineOperation::AnnotatePii])
    }

    pub fn extract_text() -> Self {
        Self(vec![PipelineOperation::ExtractText])
    }

    pub fn contains(&self, op: PipelineOperation) -> bool {
        self.0.contains(&op)
    }

    /// Whether the recognizer should run at all.
    pub fn wants_annotation(&self) -> bool {
        self.contains(PipelineOperation::AnnotatePii)
    }

    /// Whether extracted text should be surfaced in results.
    pub fn wants_extraction(&self) -> bool {
        self.contains(PipelineOperation::ExtractText)
    }

    pub fn as_slice(&self) -> &[PipelineOperation] {
        &self.0
    }
}

impl Default for OperationSet {
    fn default() -> Self {
        Self::annotate_pii()
    }
}

impl std::fmt::Display for OperationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|op| op.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}
