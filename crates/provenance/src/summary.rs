use std::collections::HashSet;

use serde::Serialize;

use crate::cluster::route_key;
use crate::record::Record;

/// Scalar counts for the summary panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_records: usize,
    /// Records with all four coordinates.
    pub arc_eligible: usize,
    /// Arc-eligible records whose origin and destination differ at
    /// object-key precision.
    pub displaced: usize,
    /// Distinct object-level routes.
    pub unique_arcs: usize,
    /// Distinct origin countries.
    pub countries: usize,
    /// Distinct origin cities.
    pub cities: usize,
    /// Distinct holding institutions.
    pub institutions: usize,
}

pub fn summarize<'a, I>(records: I) -> Summary
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut summary = Summary::default();
    let mut routes = HashSet::new();
    let mut countries: HashSet<&str> = HashSet::new();
    let mut cities: HashSet<&str> = HashSet::new();
    let mut institutions: HashSet<&str> = HashSet::new();

    for record in records {
        summary.total_records += 1;
        if record.is_arc_eligible() {
            summary.arc_eligible += 1;
        }
        if let Some(key) = route_key(record) {
            summary.displaced += 1;
            routes.insert(key);
        }
        if let Some(c) = record.origin_country() {
            countries.insert(c);
        }
        if let Some(c) = record.origin_city() {
            cities.insert(c);
        }
        if let Some(i) = record.institution() {
            institutions.insert(i);
        }
    }

    summary.unique_arcs = routes.len();
    summary.countries = countries.len();
    summary.cities = cities.len();
    summary.institutions = institutions.len();
    summary
}

/// Number of distinct object-level arcs, i.e. the uncapped length of
/// `cluster_arcs(records, Granularity::Object, 0)`.
pub fn unique_arc_count<'a, I>(records: I) -> usize
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter_map(route_key)
        .collect::<HashSet<_>>()
        .len()
}
