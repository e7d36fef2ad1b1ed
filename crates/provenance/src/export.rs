//! CSV export of records and arcs.

use std::io::Write;

use crate::cluster::MapArc;
use crate::error::EngineError;
use crate::record::{GeoPoint, Record};

pub const RECORD_COLUMNS: [&str; 12] = [
    "id",
    "origin_place",
    "origin_city",
    "origin_country",
    "origin_longitude",
    "origin_latitude",
    "institution",
    "destination_place",
    "destination_city",
    "destination_country",
    "destination_longitude",
    "destination_latitude",
];

pub const ARC_COLUMNS: [&str; 8] = [
    "id",
    "granularity",
    "count",
    "source_longitude",
    "source_latitude",
    "target_longitude",
    "target_latitude",
    "distance_km",
];

fn coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn point_columns(point: Option<&GeoPoint>) -> [String; 2] {
    match point {
        Some(p) => [coordinate(p.longitude), coordinate(p.latitude)],
        None => [String::new(), String::new()],
    }
}

/// Write `records` as CSV with a header row. Missing values are empty cells.
pub fn write_records_csv<'a, I, W>(records: I, writer: W) -> Result<(), EngineError>
where
    I: IntoIterator<Item = &'a Record>,
    W: Write,
{
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(RECORD_COLUMNS)?;

    for r in records {
        let [origin_lon, origin_lat] = point_columns(r.origin.as_ref());
        let [dest_lon, dest_lat] = point_columns(r.destination.as_ref());
        csv.write_record([
            r.id.to_string().as_str(),
            r.origin_place().unwrap_or_default(),
            r.origin_city().unwrap_or_default(),
            r.origin_country().unwrap_or_default(),
            origin_lon.as_str(),
            origin_lat.as_str(),
            r.institution().unwrap_or_default(),
            r.destination_place().unwrap_or_default(),
            r.destination_city().unwrap_or_default(),
            r.destination_country().unwrap_or_default(),
            dest_lon.as_str(),
            dest_lat.as_str(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Write `arcs` as CSV with a header row; distance is great-circle km to one
/// decimal.
pub fn write_arcs_csv<W: Write>(arcs: &[MapArc<'_>], writer: W) -> Result<(), EngineError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(ARC_COLUMNS)?;

    for a in arcs {
        csv.write_record([
            a.id.clone(),
            a.granularity.to_string(),
            a.count.to_string(),
            a.source_position[0].to_string(),
            a.source_position[1].to_string(),
            a.target_position[0].to_string(),
            a.target_position[1].to_string(),
            format!("{:.1}", a.distance_km()),
        ])?;
    }

    csv.flush()?;
    Ok(())
}
