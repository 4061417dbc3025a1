//! Parallel ingestion of many input files.
//!
//! Flow: cache lookup, then (on a miss) one parse task per file on a bounded
//! worker pool, then a merge of every activity into one table, then a cache
//! store. A file that cannot be parsed contributes no rows and a warning; its
//! siblings are unaffected.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{debug, info, warn};

use crate::cache::ActivityCache;
use crate::error::{ParseError, SchemaError};
use crate::parsers::{parse_file, SourceFormat};
use crate::{Activity, IngestConfig, NormalizedTable};

/// What happened during one pipeline run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Number of input paths supplied
    pub files: usize,
    /// Result came straight from the cache; no parser ran
    pub cache_hit: bool,
    /// Files with no matching parser
    pub unsupported: Vec<PathBuf>,
    /// Files whose parser failed, with the reason
    pub failed: Vec<(String, ParseError)>,
    /// Activities merged into the table (empty ones included)
    pub activities: usize,
    /// Rows in the returned table
    pub rows: usize,
}

enum FileOutcome {
    Parsed(Vec<Activity>),
    Unsupported(SchemaError),
    Failed(String, ParseError),
}

/// Run the pipeline and return only the table.
///
/// An empty table means nothing could be read; callers should treat it as
/// "no data to render".
pub fn process_data<S: AsRef<str> + Sync>(files: &[S], config: &IngestConfig) -> NormalizedTable {
    process_files(files, config).0
}

/// Run the pipeline over `files` (already expanded by the caller).
///
/// The cache key is the file list in the order given.
pub fn process_files<S: AsRef<str> + Sync>(
    files: &[S],
    config: &IngestConfig,
) -> (NormalizedTable, IngestReport) {
    let mut report = IngestReport {
        files: files.len(),
        ..IngestReport::default()
    };
    let cache = ActivityCache::new(&config.cache_dir);

    if config.use_cache {
        match cache.lookup(files) {
            Ok(Some(table)) => {
                report.cache_hit = true;
                report.rows = table.len();
                return (table, report);
            }
            Ok(None) => {}
            Err(e) => warn!("[pipeline] Ignoring cache: {}", e),
        }
    }

    let start = Instant::now();
    let outcomes = parse_all(files, config.workers);

    let mut activities = Vec::new();
    for outcome in outcomes {
        match outcome {
            FileOutcome::Parsed(parsed) => activities.extend(parsed),
            FileOutcome::Unsupported(e) => report.unsupported.push(e.0),
            FileOutcome::Failed(file, e) => report.failed.push((file, e)),
        }
    }

    report.activities = activities.len();
    let table = NormalizedTable::from_activities(activities);
    report.rows = table.len();

    info!(
        "[pipeline] {} files -> {} activities, {} rows in {:.2}s ({} unsupported, {} failed)",
        report.files,
        report.activities,
        report.rows,
        start.elapsed().as_secs_f64(),
        report.unsupported.len(),
        report.failed.len()
    );

    if config.use_cache && !table.is_empty() {
        if let Err(e) = cache.store(files, &table) {
            warn!("[pipeline] Skipping cache store: {}", e);
        }
    }

    (table, report)
}

/// Resolve the worker count: `None` or zero means available parallelism.
pub fn worker_count(workers: Option<usize>) -> usize {
    workers
        .filter(|&n| n > 0)
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
}

#[cfg(feature = "parallel")]
fn parse_all<S: AsRef<str> + Sync>(files: &[S], workers: Option<usize>) -> Vec<FileOutcome> {
    use rayon::prelude::*;

    let threads = worker_count(workers);
    let done = AtomicUsize::new(0);
    let total = files.len();

    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => {
            debug!("[pipeline] Parsing {} files on {} workers", total, threads);
            pool.install(|| {
                files
                    .par_iter()
                    .map(|f| parse_one(f.as_ref(), &done, total))
                    .collect()
            })
        }
        Err(e) => {
            warn!("[pipeline] Failed to build worker pool ({}), parsing sequentially", e);
            files.iter().map(|f| parse_one(f.as_ref(), &done, total)).collect()
        }
    }
}

#[cfg(not(feature = "parallel"))]
fn parse_all<S: AsRef<str> + Sync>(files: &[S], _workers: Option<usize>) -> Vec<FileOutcome> {
    let done = AtomicUsize::new(0);
    let total = files.len();
    debug!("[pipeline] Parsing {} files sequentially", total);
    files.iter().map(|f| parse_one(f.as_ref(), &done, total)).collect()
}

fn parse_one(file: &str, done: &AtomicUsize, total: usize) -> FileOutcome {
    let path = Path::new(file);

    let outcome = match SourceFormat::from_path(path) {
        Err(e) => {
            debug!("[pipeline] {}", e);
            FileOutcome::Unsupported(e)
        }
        Ok(format) => match parse_file(path, format) {
            Ok(activities) => {
                debug!("[pipeline] Parsed {} as {}", file, format.as_str());
                FileOutcome::Parsed(activities)
            }
            Err(e) => {
                warn!("Skipping {}: {}", file, e);
                FileOutcome::Failed(file.to_string(), e)
            }
        },
    };

    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
    info!("[Progress] {}/{} {}", n, total, file);
    outcome
}
