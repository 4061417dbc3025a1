//! SQLite activity-export parser.
//!
//! The export stores each run as two series keyed by `runID`:
//!
//! - `coordinate(runID, sequenceID, timeOffset, latitude, longitude, distanceDelta)`:
//!   dense positions; the running distance is summed by the database
//! - `altitude(runID, sequenceID, timeOffset, altitude)`: sparse elevations
//!
//! plus `run(runID, startTime)`. Offsets are seconds from the run start.
//! Elevation is interpolated onto the position offsets one run at a time so
//! no run ever sees another run's samples.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use log::{debug, warn};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::error::ParseError;
use crate::interpolate::interpolate_elevation;
use crate::{Activity, Sample};

const POSITION_QUERY: &str = "
    SELECT runID, timeOffset, longitude, latitude, distance
    FROM (
        SELECT runID, sequenceID, timeOffset, longitude, latitude,
               SUM(COALESCE(distanceDelta, 0)) OVER (
                   PARTITION BY runID ORDER BY sequenceID
                   ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
               ) AS distance
        FROM coordinate
    )
    WHERE longitude IS NOT NULL AND latitude IS NOT NULL
    ORDER BY runID, sequenceID";

const ALTITUDE_QUERY: &str = "
    SELECT runID, timeOffset, altitude
    FROM altitude
    WHERE timeOffset IS NOT NULL AND altitude IS NOT NULL
    ORDER BY runID, sequenceID";

const RUN_QUERY: &str = "SELECT runID, startTime FROM run";

struct PositionRow {
    offset: Option<f64>,
    lon: f64,
    lat: f64,
    dist: f64,
}

/// Parse every run in an export database.
pub fn parse_relational(path: &Path) -> Result<Vec<Activity>, ParseError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    activities_from_connection(&conn)
}

/// Build one activity per run from an open connection.
///
/// Runs are returned in `runID` order. The activity name is the bare run id,
/// so two exports that both contain the same `runID` produce rows under the
/// same name once merged into a table; `dist` restarts at zero where the
/// second run's rows begin. Group by file as well as name when merging
/// several exports.
pub fn activities_from_connection(conn: &Connection) -> Result<Vec<Activity>, ParseError> {
    let start_times = load_start_times(conn)?;
    let elevations = load_elevations(conn)?;

    let mut order: Vec<String> = Vec::new();
    let mut positions: HashMap<String, Vec<PositionRow>> = HashMap::new();
    {
        let mut stmt = conn.prepare(POSITION_QUERY)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let run_id = run_id_string(row.get_ref(0)?);
            let position = PositionRow {
                offset: row.get(1)?,
                lon: row.get(2)?,
                lat: row.get(3)?,
                dist: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            };
            positions
                .entry(run_id.clone())
                .or_insert_with(|| {
                    order.push(run_id);
                    Vec::new()
                })
                .push(position);
        }
    }

    let activities = order
        .into_iter()
        .map(|run_id| {
            let rows = positions.remove(&run_id).unwrap_or_default();
            let start = start_times.get(&run_id).copied().flatten();
            let run_elevation = elevations.get(&run_id).map(Vec::as_slice).unwrap_or(&[]);
            build_activity(run_id, rows, start, run_elevation)
        })
        .collect::<Vec<_>>();

    debug!(
        "[relational] {} runs, {} samples",
        activities.len(),
        activities.iter().map(Activity::len).sum::<usize>()
    );

    Ok(activities)
}

fn build_activity(
    run_id: String,
    rows: Vec<PositionRow>,
    start: Option<DateTime<Utc>>,
    elevation: &[(f64, f64)],
) -> Activity {
    let offsets: Vec<f64> = rows.iter().map(|r| r.offset.unwrap_or(f64::NAN)).collect();
    let ele = interpolate_elevation(&offsets, elevation);

    let samples = rows
        .into_iter()
        .zip(ele)
        .map(|(row, ele)| Sample {
            lon: row.lon,
            lat: row.lat,
            ele,
            time: start.zip(row.offset).and_then(|(s, off)| offset_time(s, off)),
            name: run_id.clone(),
            dist: row.dist,
        })
        .collect();

    Activity {
        name: run_id,
        samples,
    }
}

fn load_start_times(conn: &Connection) -> Result<HashMap<String, Option<DateTime<Utc>>>, ParseError> {
    let mut stmt = conn.prepare(RUN_QUERY)?;
    let mut rows = stmt.query([])?;
    let mut out = HashMap::new();

    while let Some(row) = rows.next()? {
        let run_id = run_id_string(row.get_ref(0)?);
        let start = match parse_start_time(&run_id, row.get_ref(1)?) {
            Ok(start) => start,
            Err(e) => {
                warn!("[relational] {}; timestamps left empty", e);
                None
            }
        };
        out.insert(run_id, start);
    }

    Ok(out)
}

fn load_elevations(conn: &Connection) -> Result<HashMap<String, Vec<(f64, f64)>>, ParseError> {
    let mut stmt = conn.prepare(ALTITUDE_QUERY)?;
    let mut rows = stmt.query([])?;
    let mut out: HashMap<String, Vec<(f64, f64)>> = HashMap::new();

    while let Some(row) = rows.next()? {
        let run_id = run_id_string(row.get_ref(0)?);
        out.entry(run_id).or_default().push((row.get(1)?, row.get(2)?));
    }

    Ok(out)
}

/// Run start as stored: unix seconds, or text in RFC 3339 or
/// `YYYY-MM-DD HH:MM:SS[.fff]` (read as UTC).
fn parse_start_time(run_id: &str, value: ValueRef<'_>) -> Result<Option<DateTime<Utc>>, ParseError> {
    let invalid = |value: String| ParseError::StartTime {
        run_id: run_id.to_string(),
        value,
    };

    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0)
            .map(Some)
            .ok_or_else(|| invalid(secs.to_string())),
        ValueRef::Real(secs) => epoch_seconds(secs)
            .map(Some)
            .ok_or_else(|| invalid(secs.to_string())),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| Some(naive.and_utc()))
                .ok_or_else(|| invalid(text.to_string()))
        }
        ValueRef::Blob(_) => Err(invalid("<blob>".to_string())),
    }
}

fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn offset_time(start: DateTime<Utc>, offset_secs: f64) -> Option<DateTime<Utc>> {
    if !offset_secs.is_finite() {
        return None;
    }
    let micros = (offset_secs * 1e6).round() as i64;
    start.checked_add_signed(Duration::microseconds(micros))
}

fn run_id_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        ValueRef::Null => String::from("null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SCHEMA: &str = "
        CREATE TABLE run (runID INTEGER PRIMARY KEY, startTime);
        CREATE TABLE coordinate (
            runID INTEGER, sequenceID INTEGER, timeOffset REAL,
            latitude REAL, longitude REAL, distanceDelta REAL
        );
        CREATE TABLE altitude (
            runID INTEGER, sequenceID INTEGER, timeOffset REAL, altitude REAL
        );";

    fn export_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            "
            INSERT INTO run VALUES (1, '2020-05-01 08:00:00');
            INSERT INTO run VALUES (2, 1588406400);

            -- Inserted out of sequence order on purpose
            INSERT INTO coordinate VALUES (1, 2, 10.0, 51.001, -0.1, 5.0);
            INSERT INTO coordinate VALUES (1, 1, 0.0, 51.000, -0.1, 0.0);
            INSERT INTO coordinate VALUES (1, 3, 20.0, 51.002, -0.1, 7.5);
            INSERT INTO coordinate VALUES (1, 4, 30.0, 51.003, -0.1, 2.5);

            INSERT INTO altitude VALUES (1, 1, 5.0, 100.0);
            INSERT INTO altitude VALUES (1, 2, 25.0, 140.0);

            INSERT INTO coordinate VALUES (2, 1, 0.0, 40.0, -74.0, 0.0);
            INSERT INTO coordinate VALUES (2, 2, 60.0, 40.1, -74.0, 100.0);

            INSERT INTO altitude VALUES (2, 1, 30.0, 2000.0);
            ",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_one_activity_per_run() {
        let activities = activities_from_connection(&export_db()).unwrap();

        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].name, "1");
        assert_eq!(activities[0].len(), 4);
        assert_eq!(activities[1].name, "2");
        assert_eq!(activities[1].len(), 2);
        assert!(activities[0].samples.iter().all(|s| s.name == "1"));
    }

    #[test]
    fn test_positions_follow_sequence_order_with_summed_distance() {
        let activities = activities_from_connection(&export_db()).unwrap();
        let run = &activities[0];

        let lats: Vec<f64> = run.samples.iter().map(|s| s.lat).collect();
        assert_eq!(lats, vec![51.000, 51.001, 51.002, 51.003]);
        let dist: Vec<f64> = run.samples.iter().map(|s| s.dist).collect();
        assert_eq!(dist, vec![0.0, 5.0, 12.5, 15.0]);
    }

    #[test]
    fn test_distance_counts_rows_without_position() {
        let conn = export_db();
        conn.execute_batch(
            "INSERT INTO run VALUES (9, 0);
             INSERT INTO coordinate VALUES (9, 1, 0.0, 1.0, 2.0, 0.0);
             INSERT INTO coordinate VALUES (9, 2, 5.0, NULL, NULL, 5.0);
             INSERT INTO coordinate VALUES (9, 3, 10.0, 1.1, 2.0, 3.0);",
        )
        .unwrap();

        let activities = activities_from_connection(&conn).unwrap();
        let run = activities.iter().find(|a| a.name == "9").unwrap();
        let dist: Vec<f64> = run.samples.iter().map(|s| s.dist).collect();
        assert_eq!(dist, vec![0.0, 8.0]);
    }

    #[test]
    fn test_elevation_interpolated_and_held_at_edges() {
        let activities = activities_from_connection(&export_db()).unwrap();
        let ele: Vec<Option<f64>> = activities[0].samples.iter().map(|s| s.ele).collect();
        // offsets 0, 10, 20, 30 against samples at 5 -> 100 and 25 -> 140
        assert_eq!(ele, vec![Some(100.0), Some(110.0), Some(130.0), Some(140.0)]);
    }

    #[test]
    fn test_runs_do_not_share_elevation() {
        let activities = activities_from_connection(&export_db()).unwrap();
        let ele: Vec<Option<f64>> = activities[1].samples.iter().map(|s| s.ele).collect();
        assert_eq!(ele, vec![Some(2000.0), Some(2000.0)]);
        assert!(activities[0]
            .samples
            .iter()
            .all(|s| s.ele.map_or(false, |e| (100.0..=140.0).contains(&e))));
    }

    #[test]
    fn test_run_without_elevation() {
        let conn = export_db();
        conn.execute_batch(
            "INSERT INTO run VALUES (3, NULL);
             INSERT INTO coordinate VALUES (3, 1, 0.0, 1.0, 2.0, 0.0);",
        )
        .unwrap();

        let activities = activities_from_connection(&conn).unwrap();
        let run = activities.iter().find(|a| a.name == "3").unwrap();
        assert_eq!(run.samples[0].ele, None);
        assert_eq!(run.samples[0].time, None);
    }

    #[test]
    fn test_timestamps_are_start_plus_offset() {
        let activities = activities_from_connection(&export_db()).unwrap();

        assert_eq!(
            activities[0].samples[2].time,
            Some(Utc.with_ymd_and_hms(2020, 5, 1, 8, 0, 20).unwrap())
        );
        assert_eq!(
            activities[1].samples[1].time,
            Some(Utc.with_ymd_and_hms(2020, 5, 2, 8, 1, 0).unwrap())
        );
    }

    #[test]
    fn test_start_time_formats() {
        let expected = Utc.with_ymd_and_hms(2020, 5, 1, 8, 0, 0).unwrap();
        let parse = |v: ValueRef<'_>| parse_start_time("1", v).unwrap();

        assert_eq!(parse(ValueRef::Text(b"2020-05-01T10:00:00+02:00")), Some(expected));
        assert_eq!(parse(ValueRef::Text(b"2020-05-01 08:00:00.000")), Some(expected));
        assert_eq!(parse(ValueRef::Integer(expected.timestamp())), Some(expected));
        assert_eq!(parse(ValueRef::Real(expected.timestamp() as f64)), Some(expected));
        assert_eq!(parse(ValueRef::Null), None);
        assert!(parse_start_time("1", ValueRef::Text(b"yesterday")).is_err());
    }

    #[test]
    fn test_missing_tables_is_error() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            activities_from_connection(&conn),
            Err(ParseError::Database(_))
        ));
    }

    #[test]
    fn test_parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Meter.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(SCHEMA).unwrap();
            conn.execute_batch(
                "INSERT INTO run VALUES (7, 0);
                 INSERT INTO coordinate VALUES (7, 1, 0.0, 0.5, 0.5, 0.0);",
            )
            .unwrap();
        }

        let activities = parse_relational(&path).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].name, "7");
    }

    #[test]
    fn test_not_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, b"this is not sqlite, just some bytes that are long enough").unwrap();
        assert!(parse_relational(&path).is_err());
    }
}
