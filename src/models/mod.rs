//! Data models for DataFog.

mod annotation;
mod input;

pub use annotation::{
    AnnotationResult, BatchResult, DetectedEntity, EntityType, FailureKind, ScanFailure,
    ScanStatus, KNOWN_ENTITY_TYPES,
};
pub use input::{AnnotationRequest, Input, OperationSet, PipelineOperation};
