use std::io;

use thiserror::Error;

use crate::types::{NativeId, SourceId};

/// Error type for malformed input, taxonomy/configuration, and store failures.
///
/// `MalformedInput` and `SourceUnavailable` are per-record/per-source and never
/// abort a batch. `TaxonomyLoad` and `Configuration` are batch-fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed posting '{source_id}/{native_id}': missing {field}")]
    MalformedInput {
        source_id: SourceId,
        native_id: NativeId,
        field: &'static str,
    },
    #[error("taxonomy load failed: {0}")]
    TaxonomyLoad(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("posting store failure: {0}")]
    Store(String),
    #[error("posting source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Returns `true` for errors scoped to a single record or source.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedInput { .. } | PipelineError::SourceUnavailable { .. }
        )
    }
}
