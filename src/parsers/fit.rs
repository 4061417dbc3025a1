//! FIT device-file parser.
//!
//! Decoding the binary message stream is left to `fitparser`; this module
//! picks the `record` messages out of it, maps them onto the sample schema
//! and runs distance accumulation once over the whole recording.

use std::path::Path;

use chrono::{DateTime, Utc};
use fitparser::profile::MesgNum;
use fitparser::Value;

use crate::distance::CumulativeDistance;
use crate::error::ParseError;
use crate::{Activity, Sample};

/// Degrees per semicircle (2^31 semicircles = 180 degrees).
const SEMICIRCLE_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

/// One decoded `record` message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitRecord {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub altitude: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Parse a FIT file. The activity is named after the path.
pub fn parse_fit(path: &Path) -> Result<Activity, ParseError> {
    let bytes = super::read_bytes(path)?;
    let records = decode_fit(&bytes)?;
    Ok(activity_from_records(&path.to_string_lossy(), records))
}

/// Decode the `record` messages of a FIT stream.
pub fn decode_fit(input: &[u8]) -> Result<Vec<FitRecord>, ParseError> {
    let messages = fitparser::de::from_bytes(input).map_err(|e| ParseError::Fit(e.to_string()))?;

    Ok(messages
        .iter()
        .filter(|message| message.kind() == MesgNum::Record)
        .map(|message| record_from_fields(message.fields().iter().map(|f| (f.name(), f.value()))))
        .collect())
}

/// Map the named fields of one `record` message onto a [`FitRecord`].
///
/// `enhanced_altitude` wins over `altitude` whichever comes first.
fn record_from_fields<'a, I>(fields: I) -> FitRecord
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut record = FitRecord::default();
    let mut enhanced_altitude = None;
    for (name, value) in fields {
        match name {
            "position_lat" => record.latitude = value_to_f64(value).map(semicircles_to_degrees),
            "position_long" => record.longitude = value_to_f64(value).map(semicircles_to_degrees),
            "altitude" => record.altitude = value_to_f64(value),
            "enhanced_altitude" => enhanced_altitude = value_to_f64(value),
            "timestamp" => {
                if let Value::Timestamp(ts) = value {
                    record.timestamp = Some(ts.with_timezone(&Utc));
                }
            }
            _ => {}
        }
    }
    if enhanced_altitude.is_some() {
        record.altitude = enhanced_altitude;
    }
    record
}

/// Build the activity for a decoded recording.
///
/// Records without a position fix are dropped; the remaining ones form a
/// single continuous series with one distance origin.
pub fn activity_from_records(name: &str, records: Vec<FitRecord>) -> Activity {
    let mut dist = CumulativeDistance::new();

    let samples = records
        .into_iter()
        .filter_map(|r| {
            let (lon, lat) = (r.longitude?, r.latitude?);
            Some(Sample {
                lon,
                lat,
                ele: r.altitude,
                time: r.timestamp,
                name: name.to_string(),
                dist: dist.advance((lon, lat)),
            })
        })
        .collect();

    Activity {
        name: name.to_string(),
        samples,
    }
}

fn semicircles_to_degrees(value: f64) -> f64 {
    value * SEMICIRCLE_TO_DEGREES
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        Value::SInt8(v) => Some(*v as f64),
        Value::SInt16(v) => Some(*v as f64),
        Value::SInt32(v) => Some(*v as f64),
        Value::SInt64(v) => Some(*v as f64),
        Value::UInt8(v) | Value::UInt8z(v) | Value::Byte(v) => Some(*v as f64),
        Value::UInt16(v) | Value::UInt16z(v) => Some(*v as f64),
        Value::UInt32(v) | Value::UInt32z(v) => Some(*v as f64),
        Value::UInt64(v) | Value::UInt64z(v) => Some(*v as f64),
        Value::Array(values) => values.iter().find_map(value_to_f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn record(lon: f64, lat: f64, secs: u32) -> FitRecord {
        FitRecord {
            longitude: Some(lon),
            latitude: Some(lat),
            altitude: Some(100.0 + secs as f64),
            timestamp: Some(Utc.with_ymd_and_hms(2022, 3, 4, 12, 0, secs).unwrap()),
        }
    }

    #[test]
    fn test_semicircle_conversion() {
        assert_eq!(semicircles_to_degrees(0.0), 0.0);
        assert_eq!(semicircles_to_degrees(1_073_741_824.0), 90.0);
        assert_eq!(semicircles_to_degrees(-2_147_483_648.0), -180.0);
    }

    #[test]
    fn test_activity_from_records() {
        let records = vec![record(0.0, 0.0, 0), record(3.0, 4.0, 1), record(3.0, 5.0, 2)];
        let activity = activity_from_records("ride.fit", records);

        assert_eq!(activity.name, "ride.fit");
        assert_eq!(activity.len(), 3);
        let dist: Vec<f64> = activity.samples.iter().map(|s| s.dist).collect();
        assert_eq!(dist, vec![0.0, 5.0, 6.0]);
        assert_eq!(activity.samples[1].ele, Some(101.0));
        assert_eq!(
            activity.samples[2].time,
            Some(Utc.with_ymd_and_hms(2022, 3, 4, 12, 0, 2).unwrap())
        );
        assert!(activity.samples.iter().all(|s| s.name == "ride.fit"));
    }

    #[test]
    fn test_records_without_position_are_dropped() {
        let mut no_fix = record(0.0, 0.0, 1);
        no_fix.latitude = None;
        let records = vec![record(0.0, 0.0, 0), no_fix, record(0.0, 2.0, 2)];

        let activity = activity_from_records("ride.fit", records);

        assert_eq!(activity.len(), 2);
        assert_eq!(activity.samples[1].dist, 2.0);
    }

    #[test]
    fn test_empty_recording() {
        assert!(activity_from_records("empty.fit", Vec::new()).is_empty());
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(value_to_f64(&Value::SInt32(-5)), Some(-5.0));
        assert_eq!(value_to_f64(&Value::Float64(1.5)), Some(1.5));
        assert_eq!(value_to_f64(&Value::Array(vec![Value::UInt16(7)])), Some(7.0));
        assert_eq!(value_to_f64(&Value::String("x".into())), None);
    }

    #[test]
    fn test_record_fields_mapped() {
        let ts = Utc.with_ymd_and_hms(2022, 3, 4, 12, 0, 7).unwrap();
        let lat = Value::SInt32(1_073_741_824);
        let lon = Value::SInt32(-536_870_912);
        let altitude = Value::Float64(250.0);
        let timestamp = Value::Timestamp(ts.with_timezone(&Local));
        let heart_rate = Value::UInt8(140);

        let record = record_from_fields([
            ("timestamp", &timestamp),
            ("position_lat", &lat),
            ("position_long", &lon),
            ("heart_rate", &heart_rate),
            ("altitude", &altitude),
        ]);

        assert_eq!(
            record,
            FitRecord {
                longitude: Some(-45.0),
                latitude: Some(90.0),
                altitude: Some(250.0),
                timestamp: Some(ts),
            }
        );
    }

    #[test]
    fn test_enhanced_altitude_preferred() {
        let altitude = Value::Float64(250.0);
        let enhanced = Value::Float64(251.4);

        let record = record_from_fields([("altitude", &altitude), ("enhanced_altitude", &enhanced)]);
        assert_eq!(record.altitude, Some(251.4));

        let record = record_from_fields([("enhanced_altitude", &enhanced), ("altitude", &altitude)]);
        assert_eq!(record.altitude, Some(251.4));
    }

    #[test]
    fn test_record_without_position_fields() {
        let altitude = Value::Float64(12.0);
        let record = record_from_fields([("altitude", &altitude)]);

        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
        assert_eq!(record.altitude, Some(12.0));
        assert!(activity_from_records("ride.fit", vec![record]).is_empty());
    }

    #[test]
    fn test_malformed_stream() {
        let err = decode_fit(b"definitely not a FIT file").unwrap_err();
        assert!(matches!(err, ParseError::Fit(_)));
    }
}
