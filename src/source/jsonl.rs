use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::data::RawPosting;
use crate::errors::PipelineError;
use crate::source::{PostingSource, SourceCursor, SourceSnapshot, advance_cursor};
use crate::types::SourceId;

/// Reads one JSON-encoded [`RawPosting`] per line.
///
/// The cursor revision is the number of lines consumed, so appending lines to
/// the file makes them visible to the next fetch. Lines that fail to parse are
/// skipped with a warning.
#[derive(Clone, Debug)]
pub struct JsonLinesPostingSource {
    id: SourceId,
    path: PathBuf,
}

impl JsonLinesPostingSource {
    /// Create a source reading `path`.
    pub fn new(id: impl Into<SourceId>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// File this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> PipelineError {
        PipelineError::SourceUnavailable {
            source_id: self.id.clone(),
            reason: format!("{}: {reason}", self.path.display()),
        }
    }
}

impl PostingSource for JsonLinesPostingSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(
        &self,
        cursor: Option<&SourceCursor>,
        limit: Option<usize>,
    ) -> Result<SourceSnapshot, PipelineError> {
        let file = File::open(&self.path).map_err(|err| self.unavailable(err))?;
        let start = cursor.map(|cursor| cursor.revision as usize).unwrap_or(0);
        let max = limit.unwrap_or(usize::MAX);

        let mut postings = Vec::new();
        let mut consumed = 0usize;
        for (line_no, line) in BufReader::new(file).lines().enumerate().skip(start) {
            if postings.len() >= max {
                break;
            }
            let line = line.map_err(|err| self.unavailable(err))?;
            consumed += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawPosting>(&line) {
                Ok(posting) => postings.push(posting),
                Err(err) => warn!(
                    source_id = %self.id,
                    line = line_no + 1,
                    error = %err,
                    "skipping unparseable posting line"
                ),
            }
        }

        let mut next = advance_cursor(cursor, start, &postings);
        next.revision = (start + consumed) as u64;
        Ok(SourceSnapshot {
            postings,
            cursor: next,
        })
    }
}
