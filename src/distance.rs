//! # Distance Accumulation
//!
//! Running distance along an activity, computed directly on raw
//! longitude/latitude degrees.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`planar_distance`] | Euclidean distance between two coordinates in degree space |
//! | [`cumulative_distance`] | Running distance for an ordered list of coordinates |
//! | [`CumulativeDistance`] | Incremental accumulator used by the parsers |
//!
//! ## Example
//!
//! ```rust
//! use stravavis_ingest::distance;
//!
//! let track = [(0.0, 0.0), (3.0, 4.0), (3.0, 5.0)];
//! let dist = distance::cumulative_distance(track);
//! assert_eq!(dist, vec![0.0, 5.0, 6.0]);
//! ```
//!
//! ## Algorithm Notes
//!
//! No geodesic correction or projection is applied. The result is a relative
//! progress metric for charting, not a ground distance: one "unit" is one
//! degree, whatever the latitude.
//!
//! The output depends only on the order and values of the points, so parsing
//! the same file on any worker gives the same column.

use geo::{Distance, Euclidean, Point};

/// Euclidean distance between two `(lon, lat)` pairs in degree space.
///
/// # Example
///
/// ```rust
/// use stravavis_ingest::distance::planar_distance;
///
/// assert_eq!(planar_distance((1.0, 1.0), (4.0, 5.0)), 5.0);
/// ```
#[inline]
pub fn planar_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    Euclidean::distance(Point::new(a.0, a.1), Point::new(b.0, b.1))
}

/// Cumulative distance for each point of an ordered `(lon, lat)` sequence.
///
/// `dist[0] = 0` and `dist[i] = dist[i - 1] + planar_distance(p[i - 1], p[i])`.
/// An empty input yields an empty output.
pub fn cumulative_distance<I>(points: I) -> Vec<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut acc = CumulativeDistance::new();
    points.into_iter().map(|p| acc.advance(p)).collect()
}

/// Incremental form of [`cumulative_distance`].
///
/// Parsers feed points one at a time and call [`reset`](Self::reset) when a
/// new distance origin begins (a new GPX segment).
#[derive(Debug, Clone, Default)]
pub struct CumulativeDistance {
    last: Option<(f64, f64)>,
    total: f64,
}

impl CumulativeDistance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point and return the running distance at that point.
    pub fn advance(&mut self, point: (f64, f64)) -> f64 {
        if let Some(prev) = self.last {
            self.total += planar_distance(prev, point);
        }
        self.last = Some(point);
        self.total
    }

    /// Start a new origin: the next point gets distance 0.
    pub fn reset(&mut self) {
        self.last = None;
        self.total = 0.0;
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

// =============================================================================
// Tests
// =============================================================================
