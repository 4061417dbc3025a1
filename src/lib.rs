//! # Stravavis Ingest
//!
//! Turns GPS activity recordings into one normalized, time-ordered table of
//! geographic samples for downstream rendering.
//!
//! This library provides:
//! - Parsers for GPX track logs, FIT device files and SQLite activity exports
//! - Planar cumulative distance per activity
//! - Elevation interpolation for sparse altitude series
//! - A disposable on-disk cache keyed by the input file list
//! - Parallel parsing across many input files
//!
//! ## Features
//!
//! - **`parallel`** - Parse files on a rayon thread pool (enabled by default)
//!
//! ## Quick Start
//!
//! ```no_run
//! use stravavis_ingest::{process_data, IngestConfig};
//!
//! let files = vec![
//!     "activities/morning_run.gpx".to_string(),
//!     "activities/evening_ride.fit".to_string(),
//! ];
//!
//! let table = process_data(&files, &IngestConfig::default());
//! if table.is_empty() {
//!     println!("No data to plot");
//! }
//! for name in table.activity_names() {
//!     println!("{}: {} samples", name, table.activity(name).count());
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod cache;
pub mod distance;
pub mod error;
pub mod interpolate;
pub mod parsers;
pub mod pipeline;

pub use cache::{cache_key, ActivityCache};
pub use distance::{cumulative_distance, planar_distance, CumulativeDistance};
pub use error::{CacheError, ParseError, SchemaError};
pub use interpolate::interpolate_elevation;
pub use parsers::{parse_file, SourceFormat};
pub use pipeline::{process_data, process_files, IngestReport};

// ============================================================================
// Core Types
// ============================================================================

/// One geographic reading within an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Longitude in degrees
    pub lon: f64,
    /// Latitude in degrees
    pub lat: f64,
    /// Elevation in meters, if recorded
    pub ele: Option<f64>,
    /// Recording instant, normalized to UTC
    pub time: Option<DateTime<Utc>>,
    /// Activity identifier (source file path or database run id)
    pub name: String,
    /// Cumulative planar distance from the start of the segment
    pub dist: f64,
}

/// An ordered sequence of samples produced from one input unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activity {
    pub name: String,
    pub samples: Vec<Sample>,
}

impl Activity {
    /// Create an activity with no samples.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The merged output of the pipeline.
///
/// Row order across activities carries no meaning. Row order within an
/// activity is the recording order and is always preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTable {
    rows: Vec<Sample>,
}

impl NormalizedTable {
    /// Concatenate activities into one table.
    pub fn from_activities<I>(activities: I) -> Self
    where
        I: IntoIterator<Item = Activity>,
    {
        let rows = activities
            .into_iter()
            .flat_map(|activity| activity.samples)
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Sample] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Sample> {
        self.rows
    }

    pub fn lon(&self) -> Vec<f64> {
        self.rows.iter().map(|s| s.lon).collect()
    }

    pub fn lat(&self) -> Vec<f64> {
        self.rows.iter().map(|s| s.lat).collect()
    }

    pub fn ele(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|s| s.ele).collect()
    }

    pub fn time(&self) -> Vec<Option<DateTime<Utc>>> {
        self.rows.iter().map(|s| s.time).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rows.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn dist(&self) -> Vec<f64> {
        self.rows.iter().map(|s| s.dist).collect()
    }

    /// Distinct activity identifiers in first-seen order.
    pub fn activity_names(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Rows belonging to one activity, in recording order.
    pub fn activity<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Sample> + 'a {
        self.rows.iter().filter(move |s| s.name == name)
    }
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Worker pool size. `None` uses the available hardware parallelism.
    pub workers: Option<usize>,

    /// Directory holding cache entries.
    /// Default: `<temp dir>/stravavis`
    pub cache_dir: PathBuf,

    /// Look up and store results in the cache.
    /// Default: true
    pub use_cache: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: None,
            cache_dir: cache::default_cache_dir(),
            use_cache: true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
