//! GPX track-log parser.
//!
//! Walks tracks, then segments, then points in document order. Each segment
//! is its own distance origin: `dist` restarts at zero on the first point of
//! every segment.

use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::distance::CumulativeDistance;
use crate::error::ParseError;
use crate::{Activity, Sample};

/// Parse a GPX file. The activity is named after the path.
pub fn parse_gpx(path: &Path) -> Result<Activity, ParseError> {
    let bytes = super::read_bytes(path)?;
    parse_gpx_bytes(&path.to_string_lossy(), &bytes)
}

/// Parse GPX content already in memory.
pub fn parse_gpx_bytes(name: &str, input: &[u8]) -> Result<Activity, ParseError> {
    let doc = ::gpx::read(Cursor::new(input)).map_err(|e| ParseError::Gpx(e.to_string()))?;

    let mut samples = Vec::new();
    let mut dist = CumulativeDistance::new();

    for track in doc.tracks {
        for segment in track.segments {
            dist.reset();
            for point in segment.points {
                let position = point.point();
                let (lon, lat) = (position.x(), position.y());
                let time = match point.time {
                    Some(t) => {
                        let iso = t.format().map_err(|e| ParseError::Gpx(e.to_string()))?;
                        Some(parse_time(&iso)?)
                    }
                    None => None,
                };

                samples.push(Sample {
                    lon,
                    lat,
                    ele: point.elevation,
                    time,
                    name: name.to_string(),
                    dist: dist.advance((lon, lat)),
                });
            }
        }
    }

    Ok(Activity {
        name: name.to_string(),
        samples,
    })
}

fn parse_time(iso: &str) -> Result<DateTime<Utc>, ParseError> {
    let parsed = DateTime::parse_from_rfc3339(iso).map_err(|e| ParseError::Gpx(e.to_string()))?;
    Ok(parsed.with_timezone(&Utc))
}
