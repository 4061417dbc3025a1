//! Elevation interpolation for sources that record altitude on a sparser
//! clock than position.
//!
//! Both series carry time offsets from the same activity start. The
//! elevation series is interpolated linearly in time onto every position
//! offset. Offsets before the first or after the last elevation sample hold
//! the nearest observed value, so the output never leaves the observed
//! elevation range.

use std::cmp::Ordering;

/// Interpolate `elevation` (`(time_offset, altitude)` pairs) onto
/// `position_offsets`.
///
/// Returns one value per position offset. When the elevation series has no
/// usable samples every entry is `None`; the same holds for a position offset
/// that is not a finite number.
///
/// Interpolating over the union of both time axes and projecting back onto
/// the position axis reduces to bracketing each position offset between its
/// two neighbouring elevation samples, which is what this does.
///
/// # Example
///
/// ```rust
/// use stravavis_ingest::interpolate_elevation;
///
/// let ele = interpolate_elevation(&[0.0, 5.0, 10.0, 20.0], &[(5.0, 100.0), (15.0, 120.0)]);
/// assert_eq!(ele, vec![Some(100.0), Some(100.0), Some(110.0), Some(120.0)]);
/// ```
pub fn interpolate_elevation(position_offsets: &[f64], elevation: &[(f64, f64)]) -> Vec<Option<f64>> {
    let mut known: Vec<(f64, f64)> = elevation
        .iter()
        .copied()
        .filter(|(t, v)| t.is_finite() && v.is_finite())
        .collect();

    if known.is_empty() {
        return vec![None; position_offsets.len()];
    }

    // Stable: samples sharing an offset keep their recorded order
    known.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    position_offsets
        .iter()
        .map(|&t| value_at(&known, t))
        .collect()
}

fn value_at(known: &[(f64, f64)], t: f64) -> Option<f64> {
    if !t.is_finite() {
        return None;
    }

    let (first_t, first_v) = known[0];
    let (last_t, last_v) = known[known.len() - 1];

    if t <= first_t {
        return Some(first_v);
    }
    if t >= last_t {
        return Some(last_v);
    }

    // first_t < t < last_t, so 1 <= idx < known.len()
    let idx = known.partition_point(|&(kt, _)| kt <= t);
    let (t0, v0) = known[idx - 1];
    let (t1, v1) = known[idx];

    if t1 <= t0 {
        return Some(v0);
    }

    let ratio = (t - t0) / (t1 - t0);
    let value = v0 + ratio * (v1 - v0);
    Some(value.clamp(v0.min(v1), v0.max(v1)))
}
