//! Annotation result models.
//!
//! A pipeline run produces one [`AnnotationResult`] per input item, collected
//! into a [`BatchResult`] that is index-aligned with the submitted batch.
//! Results are immutable once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity labels known to the shipped recognizers.
///
/// Used only for `list-entities` style output; recognizers may report labels
/// outside this list and the pipeline passes them through unchanged.
pub const KNOWN_ENTITY_TYPES: &[&str] = &[
    "PERSON",
    "NORP",
    "FAC",
    "ORG",
    "GPE",
    "LOC",
    "PRODUCT",
    "EVENT",
    "WORK_OF_ART",
    "LAW",
    "LANGUAGE",
    "DATE",
    "TIME",
    "PERCENT",
    "MONEY",
    "QUANTITY",
    "ORDINAL",
    "CARDINAL",
    "EMAIL",
    "PHONE_NUMBER",
    "SSN",
    "CREDIT_CARD",
    "IP_ADDRESS",
    "URL",
];

/// PII category of a detected entity.
///
/// Open tag set: the common categories get named variants, anything else a
/// recognizer reports is carried through as [`EntityType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Person,
    Org,
    Gpe,
    Loc,
    Date,
    Time,
    Email,
    PhoneNumber,
    Ssn,
    CreditCard,
    IpAddress,
    Url,
    Other(String),
}

impl EntityType {
    pub fn label(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Loc => "LOC",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Email => "EMAIL",
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::Ssn => "SSN",
            Self::CreditCard => "CREDIT_CARD",
            Self::IpAddress => "IP_ADDRESS",
            Self::Url => "URL",
            Self::Other(s) => s,
        }
    }

    /// Whether this label is in the known-types registry.
    pub fn is_known(&self) -> bool {
        KNOWN_ENTITY_TYPES.contains(&self.label())
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PERSON" => Self::Person,
            "ORG" => Self::Org,
            "GPE" => Self::Gpe,
            "LOC" => Self::Loc,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "EMAIL" => Self::Email,
            "PHONE_NUMBER" => Self::PhoneNumber,
            "SSN" => Self::Ssn,
            "CREDIT_CARD" => Self::CreditCard,
            "IP_ADDRESS" => Self::IpAddress,
            "URL" => Self::Url,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.label().to_string()
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single entity detected in source text.
///
/// Spans are byte offsets into the source text with
/// `start <= end <= source.len()`. Overlapping entities may coexist;
/// consolidation resolves only identical-span duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEntity {
    pub label: EntityType,
    pub start: usize,
    pub end: usize,
    /// Substring of the source text covered by the span.
    pub text: String,
    /// Recognizer confidence in `[0.0, 1.0]`.
    pub score: f32,
    /// Name of the recognizer that produced this detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognizer: Option<String>,
}

impl DetectedEntity {
    pub fn new(label: impl Into<EntityType>, start: usize, end: usize, text: &str, score: f32) -> Self {
        Self {
            label: label.into(),
            start,
            end,
            text: text.to_string(),
            score,
            recognizer: None,
        }
    }

    pub fn with_recognizer(mut self, name: &str) -> Self {
        self.recognizer = Some(name.to_string());
        self
    }

    /// Shift the span by `offset` bytes (chunked annotation re-offsetting).
    pub fn offset_by(mut self, offset: usize) -> Self {
        self.start += offset;
        self.end += offset;
        self
    }
}

/// Why a single item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Extraction,
    Recognition,
    Timeout,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extraction => "extraction",
            Self::Recognition => "recognition",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Serializable error detail attached to a failed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ScanFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(stage: &str, secs: u64) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("{stage} stage timed out after {secs}s"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "batch cancelled before dispatch")
    }
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Outcome status of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Success,
    Failure,
}

/// Per-item annotation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationResult {
    /// Id of the request that produced this result.
    pub source_id: Uuid,
    /// Position in the submitted batch.
    pub index: usize,
    /// Image reference, when the item was an image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: ScanStatus,
    /// Consolidated detections, ordered by `(start, end, label)`.
    pub entities: Vec<DetectedEntity>,
    /// OCR output, populated when `extract_text` was requested on an image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ScanFailure>,
    pub completed_at: DateTime<Utc>,
}

impl AnnotationResult {
    /// Successful outcome.
    pub fn success(
        source_id: Uuid,
        index: usize,
        entities: Vec<DetectedEntity>,
        extracted_text: Option<String>,
    ) -> Self {
        Self {
            source_id,
            index,
            reference: None,
            status: ScanStatus::Success,
            entities,
            extracted_text,
            error: None,
            completed_at: Utc::now(),
        }
    }

    /// Failed outcome. Entities are always empty on failure.
    pub fn failure(source_id: Uuid, index: usize, error: ScanFailure) -> Self {
        Self {
            source_id,
            index,
            reference: None,
            status: ScanStatus::Failure,
            entities: Vec::new(),
            extracted_text: None,
            error: Some(error),
            completed_at: Utc::now(),
        }
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Success
    }
}

/// Ordered collection of per-item results, index-aligned with the input batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<AnnotationResult>,
}

impl BatchResult {
    pub fn new(results: Vec<AnnotationResult>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnnotationResult> {
        self.results.iter()
    }
}

impl IntoIterator for BatchResult {
    type Item = AnnotationResult;
    type IntoIter = std::vec::IntoIter<AnnotationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl std::ops::Index<usize> for BatchResult {
    type Output = AnnotationResult;

    fn index(&self, i: usize) -> &AnnotationResult {
        &self.results[i]
    }
}
