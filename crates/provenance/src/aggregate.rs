//! Grouping records by a place or institution label.

use std::str::FromStr;

use foundation::LonLat;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::record::{Record, serialize_member_ids};

/// Which label a record is grouped by.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    OriginCountry,
    OriginCity,
    DestinationCountry,
    DestinationCity,
    Institution,
}

impl GroupKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::OriginCountry => "origin_country",
            GroupKey::OriginCity => "origin_city",
            GroupKey::DestinationCountry => "destination_country",
            GroupKey::DestinationCity => "destination_city",
            GroupKey::Institution => "institution",
        }
    }

    fn label<'a>(&self, record: &'a Record) -> Option<&'a str> {
        match self {
            GroupKey::OriginCountry => record.origin_country(),
            GroupKey::OriginCity => record.origin_city(),
            GroupKey::DestinationCountry => record.destination_country(),
            GroupKey::DestinationCity => record.destination_city(),
            GroupKey::Institution => record.institution(),
        }
    }

    /// Origin-side keys locate a record at its origin, the rest at the
    /// holding institution.
    fn point(&self, record: &Record) -> Option<LonLat> {
        match self {
            GroupKey::OriginCountry | GroupKey::OriginCity => record.origin_point(),
            GroupKey::DestinationCountry | GroupKey::DestinationCity | GroupKey::Institution => {
                record.destination_point()
            }
        }
    }
}

impl FromStr for GroupKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "origin_country" | "country" => Ok(GroupKey::OriginCountry),
            "origin_city" | "city" => Ok(GroupKey::OriginCity),
            "destination_country" => Ok(GroupKey::DestinationCountry),
            "destination_city" => Ok(GroupKey::DestinationCity),
            "institution" => Ok(GroupKey::Institution),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown aggregate key: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAggregate<'a> {
    /// The label value shared by every member (the country name for
    /// [`aggregate_by_country`]).
    pub key: String,
    pub count: usize,
    /// Running pairwise average of member points; `None` when no member has
    /// a usable point.
    pub centroid: Option<LonLat>,
    #[serde(rename = "memberIds", serialize_with = "serialize_member_ids")]
    pub members: Vec<&'a Record>,
}

pub type CountryAggregate<'a> = GroupAggregate<'a>;

/// Group `records` by `key`, in first-seen order.
///
/// All records take part, not just arc-eligible ones; records without the
/// label are left out entirely.
///
/// The centroid is seeded by the first member with a valid point and then
/// updated as `(centroid + p) / 2` for every later one. That is a running
/// pairwise average weighted toward recent members, not the arithmetic mean.
/// Consumers compare against it, so do not swap in a true mean.
pub fn aggregate_by<'a, I>(records: I, key: GroupKey) -> Vec<GroupAggregate<'a>>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut groups: IndexMap<&'a str, GroupAggregate<'a>> = IndexMap::new();

    for record in records {
        let Some(label) = key.label(record) else {
            continue;
        };
        let group = groups.entry(label).or_insert_with(|| GroupAggregate {
            key: label.to_string(),
            count: 0,
            centroid: None,
            members: Vec::new(),
        });

        group.count += 1;
        group.members.push(record);
        if let Some(p) = key.point(record) {
            group.centroid = Some(match group.centroid {
                Some(c) => c.midpoint(p),
                None => p,
            });
        }
    }

    groups.into_values().collect()
}

/// Group by origin country.
pub fn aggregate_by_country<'a, I>(records: I) -> Vec<CountryAggregate<'a>>
where
    I: IntoIterator<Item = &'a Record>,
{
    aggregate_by(records, GroupKey::OriginCountry)
}

#[cfg(test)]
mod tests {
    use super::{GroupKey, aggregate_by, aggregate_by_country};
    use crate::record::Record;
    use foundation::LonLat;
    use pretty_assertions::assert_eq;

    #[test]
    fn two_french_records_and_one_unlabelled() {
        let records = vec![
            Record::new(1).with_origin_country("France").with_origin(2.0, 48.0),
            Record::new(2).with_origin_country("France").with_origin(3.0, 49.0),
            Record::new(3).with_origin(1.0, 1.0),
        ];
        let groups = aggregate_by_country(&records);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "France");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].centroid, Some(LonLat::new(2.5, 48.5)));
    }

    #[test]
    fn centroid_is_a_running_pairwise_average() {
        let records = vec![
            Record::new(1).with_origin_country("Peru").with_origin(0.0, 0.0),
            Record::new(2).with_origin_country("Peru").with_origin(4.0, 0.0),
            Record::new(3).with_origin_country("Peru").with_origin(8.0, 0.0),
        ];
        let groups = aggregate_by_country(&records);
        // ((0 + 4) / 2 + 8) / 2 = 5, where the true mean would be 4.
        assert_eq!(groups[0].centroid, Some(LonLat::new(5.0, 0.0)));
    }

    #[test]
    fn records_without_points_count_but_do_not_move_the_centroid() {
        let records = vec![
            Record::new(1).with_origin_country("Ghana"),
            Record::new(2).with_origin_country("Ghana").with_origin(-1.0, 7.0),
            Record::new(3).with_origin_country("Ghana").with_origin(f64::NAN, 7.0),
        ];
        let groups = aggregate_by_country(&records);
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].centroid, Some(LonLat::new(-1.0, 7.0)));

        let only_unplaced = vec![Record::new(9).with_origin_country("Mali")];
        assert_eq!(aggregate_by_country(&only_unplaced)[0].centroid, None);
    }

    #[test]
    fn unlabelled_records_never_appear_as_members() {
        let records = vec![
            Record::new(1).with_origin_country(""),
            Record::new(2).with_origin_country("Japan"),
            Record::new(3),
            Record::new(4).with_origin_country("  "),
        ];
        let groups = aggregate_by_country(&records);
        let member_ids: Vec<String> = groups
            .iter()
            .flat_map(|g| g.members.iter().map(|r| r.id.to_string()))
            .collect();
        assert_eq!(member_ids, vec!["2"]);
    }

    #[test]
    fn keeps_first_seen_order() {
        let records = vec![
            Record::new(1).with_origin_country("Egypt"),
            Record::new(2).with_origin_country("China"),
            Record::new(3).with_origin_country("Egypt"),
            Record::new(4).with_origin_country("Benin"),
        ];
        let keys: Vec<(String, usize)> = aggregate_by_country(&records)
            .into_iter()
            .map(|g| (g.key, g.count))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Egypt".to_string(), 2),
                ("China".to_string(), 1),
                ("Benin".to_string(), 1)
            ]
        );
    }

    #[test]
    fn institution_groups_use_destination_points() {
        let records = vec![
            Record::new(1)
                .with_institution("British Museum")
                .with_origin(3.4, 6.4)
                .with_destination(-0.1270, 51.5194),
            Record::new(2)
                .with_institution("British Museum")
                .with_destination(-0.1270, 51.5194),
            Record::new(3).with_institution("Louvre").with_destination(2.3376, 48.8606),
        ];
        let groups = aggregate_by(&records, GroupKey::Institution);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].centroid, Some(LonLat::new(-0.1270, 51.5194)));
        assert_eq!(groups[1].key, "Louvre");
    }

    #[test]
    fn group_key_parses_aliases() {
        assert_eq!("country".parse::<GroupKey>().unwrap(), GroupKey::OriginCountry);
        assert_eq!("destination-city".parse::<GroupKey>().unwrap(), GroupKey::DestinationCity);
        assert!("continent".parse::<GroupKey>().is_err());
    }
}
