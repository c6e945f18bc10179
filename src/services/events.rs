//! Events emitted during batch processing.
//!
//! Consumers (the CLI progress display) subscribe via an `mpsc` channel;
//! library callers that don't attach a channel pay nothing.

/// Events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Batch dispatch started.
    BatchStarted { total_items: usize },
    /// One item started processing.
    ItemStarted { index: usize, description: String },
    /// One item completed successfully.
    ItemCompleted { index: usize, entity_count: usize },
    /// One item failed.
    ItemFailed { index: usize, error: String },
    /// All items accounted for.
    BatchComplete { succeeded: usize, failed: usize },
}
