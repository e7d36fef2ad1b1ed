use crate::record::Record;

/// Records with usable origin and destination coordinates, in input order.
///
/// Never fails: records with missing or non-finite coordinates are simply
/// left out.
pub fn valid_records<'a, I>(records: I) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter(|r| r.is_arc_eligible())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::valid_records;
    use crate::record::{GeoPoint, Record};

    fn mixed() -> Vec<Record> {
        let mut half = Record::new("half").with_destination(1.0, 1.0);
        half.origin = Some(GeoPoint {
            longitude: Some(3.0),
            latitude: None,
        });
        vec![
            Record::new("a").with_origin(10.0, 20.0).with_destination(30.0, 40.0),
            Record::new("no-origin").with_destination(30.0, 40.0),
            half,
            Record::new("nan").with_origin(f64::NAN, 1.0).with_destination(2.0, 2.0),
            Record::new("b").with_origin(-1.0, -2.0).with_destination(-1.0, -2.0),
            Record::new("c").with_origin(0.0, 0.0).with_destination(5.0, 5.0),
        ]
    }

    #[test]
    fn keeps_only_complete_records_in_order() {
        let records = mixed();
        let ids: Vec<String> = valid_records(&records)
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        // Zero-displacement records are still valid; clustering drops them.
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn is_idempotent() {
        let records = mixed();
        let once = valid_records(&records);
        let twice = valid_records(once.iter().copied());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_in_empty_out() {
        let records: Vec<Record> = Vec::new();
        assert!(valid_records(&records).is_empty());
    }
}
