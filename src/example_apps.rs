use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, error::ErrorKind};
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{EmergingSignal, TrendBucket};
use crate::dedup::IngestDisposition;
use crate::ingestion::IngestionManager;
use crate::metrics::SourceCoverage;
use crate::pipeline::Pipeline;
use crate::source::JsonLinesPostingSource;
use crate::store::{FilePostingStore, InMemoryPostingStore, PostingStore};
use crate::taxonomy::Taxonomy;
use crate::trends::{Dimension, TimeRange};

#[derive(Debug, Parser)]
#[command(
    name = "trend_report",
    disable_help_subcommand = true,
    about = "Ingest JSON-lines postings and report hiring trends",
    long_about = "Deduplicate postings from one or more JSON-lines files, extract skills and salaries, and print trend buckets plus emerging values as JSON.",
    after_help = "Each input file becomes one source named after its file stem. Without a store path the run is in-memory only."
)]
/// CLI for `trend_report`.
///
/// Common usage:
/// - In-memory run over two scrapes: `--input greenhouse.jsonl --input lever.jsonl`
/// - Persist into the default store file: `--store-dir .jobtrends_store`
/// - Role trends for Q1: `--dimension role --from 2024-01-01T00:00:00Z --to 2024-04-01T00:00:00Z`
struct TrendReportCli {
    #[arg(
        long = "input",
        value_name = "PATH",
        required = true,
        help = "JSON-lines posting file, repeat as needed"
    )]
    inputs: Vec<PathBuf>,
    #[arg(
        long,
        default_value = "skill",
        value_parser = parse_dimension,
        help = "Aggregation dimension: skill, role, company, or skill_pair"
    )]
    dimension: Dimension,
    #[arg(long, value_name = "PATH", help = "Optional JSON pipeline configuration")]
    config: Option<PathBuf>,
    #[arg(
        long = "store-path",
        value_name = "PATH",
        conflicts_with = "store_dir",
        help = "Persist records into this store file"
    )]
    store_path: Option<PathBuf>,
    #[arg(
        long = "store-dir",
        value_name = "DIR",
        help = "Persist records into the default store file inside this directory"
    )]
    store_dir: Option<PathBuf>,
    #[arg(long, value_parser = parse_timestamp, help = "Inclusive RFC 3339 range start")]
    from: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_timestamp, help = "Exclusive RFC 3339 range end")]
    to: Option<DateTime<Utc>>,
    #[arg(
        long = "as-of",
        value_parser = parse_timestamp,
        help = "Reference time for status inference (defaults to now)"
    )]
    as_of: Option<DateTime<Utc>>,
}

/// Ingest counters reported by `trend_report`.
#[derive(Debug, Serialize)]
pub struct IngestSummary {
    /// New canonical postings.
    pub created: usize,
    /// Observations merged into existing postings.
    pub merged: usize,
    /// Re-observations of known raw postings.
    pub refreshed: usize,
    /// Rejected raw postings.
    pub rejected: usize,
}

/// JSON document printed by `trend_report`.
#[derive(Debug, Serialize)]
pub struct TrendReport {
    /// Aggregated dimension.
    pub dimension: String,
    /// Ingest counters for this run.
    pub ingest: IngestSummary,
    /// Trend buckets over the requested range.
    pub buckets: Vec<TrendBucket>,
    /// Values flagged as emerging.
    pub emerging: Vec<EmergingSignal>,
    /// Source coverage across all stored records.
    pub coverage: Option<SourceCoverage>,
}

/// Run the `trend_report` demo and print its report to stdout.
pub fn run_trend_report<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(report) = build_trend_report(args_iter)? else {
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Parse arguments and build a [`TrendReport`]; `None` when help was printed.
pub fn build_trend_report<I>(args_iter: I) -> Result<Option<TrendReport>, Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let Some(cli) = parse_cli::<TrendReportCli, _>(
        std::iter::once("trend_report".to_string()).chain(args_iter),
    )?
    else {
        return Ok(None);
    };

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    let taxonomy = Arc::new(match &config.taxonomy_path {
        Some(path) => Taxonomy::load(path)?,
        None => Taxonomy::builtin()?,
    });
    let store: Arc<dyn PostingStore> = match (&cli.store_path, &cli.store_dir) {
        (Some(path), _) => Arc::new(FilePostingStore::open(path.clone(), &taxonomy)?),
        (None, Some(dir)) => Arc::new(FilePostingStore::open(
            FilePostingStore::default_path_in_dir(dir),
            &taxonomy,
        )?),
        (None, None) => Arc::new(InMemoryPostingStore::new()),
    };
    let pipeline = Pipeline::new(config, taxonomy, store)?;

    let mut manager = IngestionManager::new(None);
    for input in &cli.inputs {
        manager.register_source(Box::new(JsonLinesPostingSource::new(
            source_id_for(input),
            input.clone(),
        )));
    }
    let processed = manager.refresh_into(&pipeline)?;
    pipeline.refresh_statuses(cli.as_of.unwrap_or_else(Utc::now))?;

    let range = TimeRange::new(
        cli.from.unwrap_or(DateTime::<Utc>::MIN_UTC),
        cli.to.unwrap_or(DateTime::<Utc>::MAX_UTC),
    )?;
    let buckets = pipeline.aggregate(cli.dimension, &range)?;
    let emerging = pipeline.detect_emerging(cli.dimension, &range)?;
    info!(
        buckets = buckets.len(),
        emerging = emerging.len(),
        "trend report built"
    );

    Ok(Some(TrendReport {
        dimension: cli.dimension.to_string(),
        ingest: IngestSummary {
            created: processed.batch.count(IngestDisposition::Created),
            merged: processed.batch.count(IngestDisposition::Merged),
            refreshed: processed.batch.count(IngestDisposition::Refreshed),
            rejected: processed.batch.rejected.len(),
        },
        buckets,
        emerging,
        coverage: pipeline.coverage()?,
    }))
}

fn source_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_dimension(raw: &str) -> Result<Dimension, String> {
    raw.parse::<Dimension>().map_err(|err| err.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("Could not parse '{raw}' as an RFC 3339 timestamp: {err}"))
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn line(id: &str, company: &str, body: &str, scraped_at: &str) -> String {
        serde_json::json!({
            "native_id": id,
            "company": company,
            "title": "Data Engineer",
            "body": body,
            "scraped_at": scraped_at,
        })
        .to_string()
    }

    #[test]
    fn report_counts_skills_per_window() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("board.jsonl");
        let lines = [
            line("1", "Acme", "Python and Airflow", "2024-03-05T10:00:00Z"),
            line("2", "Globex", "Airflow", "2024-03-13T10:00:00Z"),
            line("3", "Initech", "Airflow, dbt", "2024-03-14T10:00:00Z"),
        ];
        std::fs::write(&input, lines.join("\n")).unwrap();

        let report = build_trend_report(
            [
                "--input",
                input.to_str().unwrap(),
                "--as-of",
                "2024-03-15T00:00:00Z",
            ]
            .into_iter()
            .map(String::from),
        )
        .unwrap()
        .unwrap();

        assert_eq!(report.dimension, "skill");
        assert_eq!(report.ingest.created, 3);
        let airflow: Vec<u64> = report
            .buckets
            .iter()
            .filter(|bucket| bucket.value == "airflow")
            .map(|bucket| bucket.count)
            .collect();
        assert_eq!(airflow, vec![1, 2]);
        let coverage = report.coverage.unwrap();
        assert_eq!(coverage.per_source[0].source, "board");
    }

    #[test]
    fn store_dir_persists_between_runs() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("board.jsonl");
        std::fs::write(
            &input,
            line("1", "Acme", "Rust", "2024-03-05T10:00:00Z"),
        )
        .unwrap();
        let store_dir = dir.path().join("store");
        let args = || {
            [
                "--input".to_string(),
                input.display().to_string(),
                "--store-dir".to_string(),
                store_dir.display().to_string(),
                "--dimension".to_string(),
                "company".to_string(),
            ]
            .into_iter()
        };
        let first = build_trend_report(args()).unwrap().unwrap();
        assert_eq!(first.ingest.created, 1);
        let second = build_trend_report(args()).unwrap().unwrap();
        assert_eq!(second.ingest.refreshed, 1);
        assert_eq!(second.buckets.len(), 1);
        assert_eq!(second.buckets[0].value, "acme");
    }

    #[test]
    fn invalid_dimension_is_rejected() {
        let err = build_trend_report(
            ["--input", "x.jsonl", "--dimension", "planet"]
                .into_iter()
                .map(String::from),
        )
        .unwrap_err();
        assert!(err.to_string().contains("planet"));
    }
}
