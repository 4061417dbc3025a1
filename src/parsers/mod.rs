//! Format-specific parsers.
//!
//! Every parser turns one input file into activities sharing the normalized
//! sample schema. Track-log and device files always yield exactly one
//! activity; a database export yields one activity per recorded run.

use std::path::Path;

use crate::error::{ParseError, SchemaError};
use crate::Activity;

pub mod fit;
pub mod gpx;
pub mod relational;

pub use self::fit::{activity_from_records, decode_fit, parse_fit, FitRecord};
pub use self::gpx::{parse_gpx, parse_gpx_bytes};
pub use self::relational::{activities_from_connection, parse_relational};

/// Input formats understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// GPX track log
    Gpx,
    /// Binary FIT device recording
    Fit,
    /// SQLite export with `coordinate`, `altitude` and `run` tables
    Relational,
}

impl SourceFormat {
    /// Pick the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("gpx") => Ok(SourceFormat::Gpx),
            Some("fit") => Ok(SourceFormat::Fit),
            Some("db") | Some("sqlite") | Some("sqlite3") => Ok(SourceFormat::Relational),
            _ => Err(SchemaError(path.to_path_buf())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Gpx => "gpx",
            SourceFormat::Fit => "fit",
            SourceFormat::Relational => "sqlite",
        }
    }
}

/// Parse one file with the parser matching its format.
///
/// The activity identifier for file-based formats is the path exactly as
/// supplied.
pub fn parse_file(path: &Path, format: SourceFormat) -> Result<Vec<Activity>, ParseError> {
    match format {
        SourceFormat::Gpx => parse_gpx(path).map(|a| vec![a]),
        SourceFormat::Fit => parse_fit(path).map(|a| vec![a]),
        SourceFormat::Relational => parse_relational(path),
    }
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>, ParseError> {
    std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(SourceFormat::from_path(Path::new("a/ride.gpx")), Ok(SourceFormat::Gpx));
        assert_eq!(SourceFormat::from_path(Path::new("RUN.FIT")), Ok(SourceFormat::Fit));
        assert_eq!(SourceFormat::from_path(Path::new("Meter.db")), Ok(SourceFormat::Relational));
        assert_eq!(SourceFormat::from_path(Path::new("x.sqlite3")), Ok(SourceFormat::Relational));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = SourceFormat::from_path(Path::new("activities.csv")).unwrap_err();
        assert_eq!(err, SchemaError(Path::new("activities.csv").to_path_buf()));
        assert!(SourceFormat::from_path(Path::new("ride.gpx.gz")).is_err());
        assert!(SourceFormat::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_missing_file_is_parse_error() {
        let err = parse_file(Path::new("/definitely/not/here.gpx"), SourceFormat::Gpx).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
