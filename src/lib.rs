#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Pipeline configuration types.
pub mod config;
/// Centralized constants used across extraction, dedup, trends, and the store.
pub mod constants;
/// Posting, skill, salary, and trend data types.
pub mod data;
/// Canonical posting index and raw-posting merge rules.
pub mod dedup;
/// Emerging-value detection over trend buckets.
pub mod emerging;
/// Reusable example runners shared by downstream crates.
pub mod example_apps;
mod hash;
/// Concurrent multi-source refresh.
pub mod ingestion;
/// Source coverage metrics.
pub mod metrics;
/// End-to-end processing pipeline.
pub mod pipeline;
/// Salary phrase parsing and normalization.
pub mod salary;
/// Taxonomy-driven skill extraction.
pub mod skills;
/// Posting source traits and built-in sources.
pub mod source;
/// Posting record stores and persistence helpers.
pub mod store;
/// Versioned skill taxonomy.
pub mod taxonomy;
/// Time windows and per-dimension trend aggregation.
pub mod trends;
/// Shared type aliases.
pub mod types;
/// Text normalization helpers.
pub mod utils;

mod errors;

pub use config::{
    DedupConfig, EmergingConfig, PipelineConfig, SalaryConfig, SkillMatchConfig, StatusConfig,
    TrendConfig,
};
pub use data::{
    CanonicalPosting, EmergingSignal, PostingRecord, PostingStatus, RawPosting, RawPostingId,
    SalaryPeriod, SalaryRange, SkillCategory, SkillTag, TimeWindow, TrendBucket,
};
pub use dedup::{BatchReport, Deduplicator, IngestDisposition, IngestOutcome};
pub use emerging::detect_emerging;
pub use errors::PipelineError;
pub use ingestion::{IngestionManager, SourceRefreshStats};
pub use metrics::{SourceCoverage, SourceShare, source_coverage};
pub use pipeline::{Pipeline, ProcessReport};
pub use salary::SalaryExtractor;
pub use skills::{SkillExtractor, categorize, extract_skills};
pub use source::{
    InMemoryPostingSource, JsonLinesPostingSource, PostingSource, SourceCursor, SourceSnapshot,
};
pub use store::{FilePostingStore, InMemoryPostingStore, PostingStore};
pub use taxonomy::{SalaryConventions, SkillEntry, Taxonomy};
pub use trends::{Dimension, TimeRange, TrendSeries, WindowSpec, aggregate};
pub use types::{
    AliasKey, CompanyName, CurrencyCode, DimensionValue, NativeId, PostingKey, RoleTitle,
    SkillName, SourceId, TaxonomyVersion,
};
