//! DataFog - PII detection and annotation for text and images.
//!
//! The [`DataFog`] orchestrator drives batches of heterogeneous inputs
//! through per-kind pipelines: plain text goes straight to entity
//! recognition, image references are fetched, OCR'd, and then annotated.
//! Every item is isolated; a batch always yields one result per input, in
//! input order.
//!
//! ```no_run
//! use datafog::{DataFog, Input, OperationSet};
//!
//! # async fn example() -> Result<(), datafog::ConfigError> {
//! let fog = DataFog::with_defaults()?;
//! let batch = fog
//!     .run(
//!         vec![Input::Text("email me at jane@example.com".into())],
//!         OperationSet::annotate_pii(),
//!     )
//!     .await;
//! for result in batch.iter() {
//!     println!("{:?}", result.entities);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod datafog;
pub mod fetch;
pub mod models;
pub mod ner;
pub mod ocr;
pub mod services;

pub use config::{ConfigError, DataFogConfig};
pub use datafog::{BatchHandle, DataFog};
pub use models::{
    AnnotationResult, BatchResult, DetectedEntity, EntityType, FailureKind, Input, OperationSet,
    PipelineOperation, ScanFailure, ScanStatus,
};
pub use services::{DistributedRunner, LocalRunner, ScanEvent};
