//! Folding records into weighted origin→destination arcs.
//!
//! Ordering contract:
//! - Arcs come out in the order their first member appeared in the input.
//! - When a cap applies, arcs are stably sorted by `count` descending, so
//!   equal counts keep first-seen order, and the list is truncated.

use std::str::FromStr;

use foundation::{LonLat, format_fixed, haversine_km};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::record::{Record, serialize_member_ids};
use crate::validate::valid_records;

/// Clustering resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One arc per distinct (rounded) coordinate pair.
    Object,
    /// One arc per (origin city, destination city) label pair.
    City,
    /// One arc per (origin country, destination country) label pair.
    Country,
}

impl Granularity {
    /// Decimal places used for object-level route keys (about 11 m).
    ///
    /// Used both for deduplication and for the no-displacement test.
    pub const OBJECT_KEY_DECIMALS: u32 = 4;

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Object => "object",
            Granularity::City => "city",
            Granularity::Country => "country",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "object" => Ok(Granularity::Object),
            "city" => Ok(Granularity::City),
            "country" => Ok(Granularity::Country),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown granularity: {other:?} (expected object, city or country)"
            ))),
        }
    }
}

/// A directed origin→destination connection standing for one or more records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapArc<'a> {
    pub id: String,
    /// `[longitude, latitude]` of the first member's origin.
    pub source_position: [f64; 2],
    /// `[longitude, latitude]` of the first member's destination.
    pub target_position: [f64; 2],
    pub count: usize,
    #[serde(rename = "memberIds", serialize_with = "serialize_member_ids")]
    pub members: Vec<&'a Record>,
    pub granularity: Granularity,
}

impl MapArc<'_> {
    pub fn source(&self) -> LonLat {
        LonLat::new(self.source_position[0], self.source_position[1])
    }

    pub fn target(&self) -> LonLat {
        LonLat::new(self.target_position[0], self.target_position[1])
    }

    pub fn distance_km(&self) -> f64 {
        haversine_km(self.source(), self.target())
    }
}

/// Quantised source/target grid cells at [`Granularity::OBJECT_KEY_DECIMALS`].
pub type RouteKey = ((i64, i64), (i64, i64));

/// Object-level key for a record, or `None` if the record is not
/// arc-eligible or has no displacement at key precision.
pub fn route_key(record: &Record) -> Option<RouteKey> {
    let source = record.origin_point()?.quantized(Granularity::OBJECT_KEY_DECIMALS);
    let target = record
        .destination_point()?
        .quantized(Granularity::OBJECT_KEY_DECIMALS);
    if source == target {
        return None;
    }
    Some((source, target))
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum ClusterKey<'a> {
    Route(RouteKey),
    Labels(&'a str, &'a str),
}

fn route_id(source: LonLat, target: LonLat) -> String {
    let d = Granularity::OBJECT_KEY_DECIMALS;
    format!(
        "{},{}->{},{}",
        format_fixed(source.longitude, d),
        format_fixed(source.latitude, d),
        format_fixed(target.longitude, d),
        format_fixed(target.latitude, d),
    )
}

fn label_pair<'a>(record: &'a Record, granularity: Granularity) -> Option<(&'a str, &'a str)> {
    let (origin, destination) = match granularity {
        Granularity::Object => return None,
        Granularity::City => (record.origin_city()?, record.destination_city()?),
        Granularity::Country => (record.origin_country()?, record.destination_country()?),
    };
    if origin == destination {
        return None;
    }
    Some((origin, destination))
}

/// Cluster `records` into arcs at `granularity`.
///
/// `max_arcs == 0` means uncapped. Otherwise, when more than `max_arcs` arcs
/// result, only the `max_arcs` heaviest are kept (ties in first-seen order).
pub fn cluster_arcs<'a, I>(records: I, granularity: Granularity, max_arcs: usize) -> Vec<MapArc<'a>>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut clusters: IndexMap<ClusterKey<'a>, MapArc<'a>> = IndexMap::new();

    for record in valid_records(records) {
        let key = match granularity {
            Granularity::Object => match route_key(record) {
                Some(k) => ClusterKey::Route(k),
                None => continue,
            },
            Granularity::City | Granularity::Country => match label_pair(record, granularity) {
                Some((o, d)) => ClusterKey::Labels(o, d),
                None => continue,
            },
        };

        if let Some(arc) = clusters.get_mut(&key) {
            arc.count += 1;
            arc.members.push(record);
            continue;
        }

        // Eligibility was checked by `valid_records`.
        let (Some(source), Some(target)) = (record.origin_point(), record.destination_point())
        else {
            continue;
        };
        let id = match &key {
            ClusterKey::Route(_) => route_id(source, target),
            ClusterKey::Labels(o, d) => format!("{granularity}:{o}->{d}"),
        };
        clusters.insert(
            key,
            MapArc {
                id,
                source_position: source.to_array(),
                target_position: target.to_array(),
                count: 1,
                members: vec![record],
                granularity,
            },
        );
    }

    let mut arcs: Vec<MapArc<'a>> = clusters.into_values().collect();
    if max_arcs > 0 && arcs.len() > max_arcs {
        // `sort_by` is stable: equal counts keep first-seen order.
        arcs.sort_by(|a, b| b.count.cmp(&a.count));
        arcs.truncate(max_arcs);
    }
    arcs
}

#[cfg(test)]
mod tests {
    use super::{Granularity, cluster_arcs, route_key};
    use crate::record::Record;
    use crate::validate::valid_records;
    use pretty_assertions::assert_eq;

    fn route(id: &str, from: (f64, f64), to: (f64, f64)) -> Record {
        Record::new(id)
            .with_origin(from.0, from.1)
            .with_destination(to.0, to.1)
    }

    #[test]
    fn folds_identical_routes_and_drops_stationary_records() {
        let records = vec![
            route("a", (10.0, 20.0), (30.0, 40.0)),
            route("b", (10.0, 20.0), (30.0, 40.0)),
            route("still", (5.0, 5.0), (5.0, 5.0)),
        ];
        let arcs = cluster_arcs(&records, Granularity::Object, 0);

        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].count, 2);
        assert_eq!(arcs[0].id, "10.0000,20.0000->30.0000,40.0000");
        assert_eq!(arcs[0].granularity, Granularity::Object);
        let members: Vec<String> = arcs[0].members.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(members, vec!["a", "b"]);
    }

    #[test]
    fn near_identical_routes_share_a_key_but_keep_first_endpoints() {
        let records = vec![
            route("a", (10.000_01, 20.0), (30.0, 40.0)),
            route("b", (10.000_02, 20.0), (30.0, 40.0)),
            route("c", (10.001, 20.0), (30.0, 40.0)),
        ];
        let arcs = cluster_arcs(&records, Granularity::Object, 0);

        assert_eq!(arcs.len(), 2);
        assert_eq!(arcs[0].count, 2);
        assert_eq!(arcs[0].source_position, [10.000_01, 20.0]);
        assert_eq!(arcs[1].count, 1);
    }

    #[test]
    fn rounding_to_same_cell_counts_as_stationary() {
        let records = vec![route("x", (1.000_01, 1.0), (1.000_02, 1.0))];
        assert!(cluster_arcs(&records, Granularity::Object, 0).is_empty());
        assert_eq!(route_key(&records[0]), None);
    }

    #[test]
    fn count_is_conserved_without_cap() {
        let mut records = Vec::new();
        for i in 0..60 {
            let lon = (i % 7) as f64;
            records.push(route(&format!("r{i}"), (lon, 1.0), (lon + 10.0, 2.0)));
        }
        records.push(route("still", (3.0, 3.0), (3.0, 3.0)));
        records.push(Record::new("invalid").with_origin(1.0, 1.0));

        let arcs = cluster_arcs(&records, Granularity::Object, 0);
        let total: usize = arcs.iter().map(|a| a.count).sum();
        let stationary = valid_records(&records)
            .into_iter()
            .filter(|r| route_key(r).is_none())
            .count();
        assert_eq!(total, valid_records(&records).len() - stationary);
        assert_eq!(total, 60);
        assert_eq!(arcs.len(), 7);
    }

    #[test]
    fn cap_keeps_heaviest_with_first_seen_ties() {
        // Route i appears weights[i] times.
        let weights = [1usize, 3, 2, 3, 1, 2];
        let mut records = Vec::new();
        for (i, w) in weights.iter().enumerate() {
            for j in 0..*w {
                records.push(route(
                    &format!("{i}-{j}"),
                    (i as f64, 0.0),
                    (i as f64, 10.0),
                ));
            }
        }

        let arcs = cluster_arcs(&records, Granularity::Object, 4);
        assert_eq!(arcs.len(), 4);
        let picked: Vec<(f64, usize)> = arcs.iter().map(|a| (a.source_position[0], a.count)).collect();
        assert_eq!(picked, vec![(1.0, 3), (3.0, 3), (2.0, 2), (5.0, 2)]);

        for k in 1..=weights.len() + 2 {
            assert!(cluster_arcs(&records, Granularity::Object, k).len() <= k);
        }
    }

    #[test]
    fn uncapped_output_keeps_first_seen_order() {
        let records = vec![
            route("a", (1.0, 0.0), (2.0, 0.0)),
            route("b", (3.0, 0.0), (4.0, 0.0)),
            route("c", (3.0, 0.0), (4.0, 0.0)),
        ];
        let arcs = cluster_arcs(&records, Granularity::Object, 0);
        let counts: Vec<usize> = arcs.iter().map(|a| a.count).collect();
        assert_eq!(counts, vec![1, 2]);

        // A cap that is not exceeded does not reorder either.
        let arcs = cluster_arcs(&records, Granularity::Object, 2);
        let counts: Vec<usize> = arcs.iter().map(|a| a.count).collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn city_level_groups_by_label_pair() {
        let records = vec![
            route("a", (2.35, 48.85), (-0.12, 51.5))
                .with_origin_city("Paris")
                .with_destination_city("London"),
            route("b", (2.30, 48.80), (-0.10, 51.4))
                .with_origin_city("Paris")
                .with_destination_city("London"),
            route("same", (2.30, 48.80), (2.31, 48.81))
                .with_origin_city("Paris")
                .with_destination_city("Paris"),
            route("unlabelled", (2.30, 48.80), (-0.10, 51.4)).with_origin_city("Paris"),
            Record::new("invalid")
                .with_origin_city("Paris")
                .with_destination_city("Berlin"),
        ];
        let arcs = cluster_arcs(&records, Granularity::City, 0);

        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].id, "city:Paris->London");
        assert_eq!(arcs[0].count, 2);
        assert_eq!(arcs[0].source_position, [2.35, 48.85]);
        assert_eq!(arcs[0].target_position, [-0.12, 51.5]);
        assert_eq!(arcs[0].granularity, Granularity::City);
    }

    #[test]
    fn country_level_groups_by_country_pair() {
        let records = vec![
            route("a", (3.4, 6.4), (-0.12, 51.5))
                .with_origin_country("Nigeria")
                .with_destination_country("United Kingdom"),
            route("b", (5.6, 6.3), (-1.25, 51.75))
                .with_origin_country("Nigeria")
                .with_destination_country("United Kingdom"),
            route("c", (5.6, 6.3), (13.4, 52.5))
                .with_origin_country("Nigeria")
                .with_destination_country("Germany"),
        ];
        let arcs = cluster_arcs(&records, Granularity::Country, 0);
        let ids: Vec<(&str, usize)> = arcs.iter().map(|a| (a.id.as_str(), a.count)).collect();
        assert_eq!(
            ids,
            vec![
                ("country:Nigeria->United Kingdom", 2),
                ("country:Nigeria->Germany", 1)
            ]
        );
    }

    #[test]
    fn empty_and_all_invalid_inputs_yield_nothing() {
        let empty: Vec<Record> = Vec::new();
        assert!(cluster_arcs(&empty, Granularity::Object, 100).is_empty());

        let invalid = vec![Record::new(1), Record::new(2).with_origin(1.0, 1.0)];
        assert!(cluster_arcs(&invalid, Granularity::Object, 100).is_empty());
        assert!(cluster_arcs(&invalid, Granularity::City, 100).is_empty());
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        assert_eq!("City".parse::<Granularity>().unwrap(), Granularity::City);
        assert_eq!(" object ".parse::<Granularity>().unwrap(), Granularity::Object);
        assert!("region".parse::<Granularity>().is_err());
    }
}
