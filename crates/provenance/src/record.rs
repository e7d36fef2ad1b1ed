//! Provenance record model.
//!
//! A [`Record`] links one museum object to where it came from (`origin`) and
//! the institution that holds it (`destination`). Coordinates and labels are
//! all optional: upstream data is patchy, and the engine filters rather than
//! rejects.

use foundation::LonLat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Opaque record identifier. Upstream uses both numeric and string ids.
///
/// Integral floats (`3.0`) read as numbers; other numbers keep their JSON
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{n}"),
            RecordId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => {
                let integral = n.as_i64().or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                        .map(|f| f as i64)
                });
                Ok(match integral {
                    Some(i) => RecordId::Number(i),
                    None => RecordId::Text(n.to_string()),
                })
            }
            Value::String(s) => Ok(RecordId::Text(s)),
            other => Err(serde::de::Error::custom(format!(
                "record id must be a number or string, got {other}"
            ))),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Number(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Text(s)
    }
}

/// A possibly incomplete geographic point.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude: Some(longitude),
            latitude: Some(latitude),
        }
    }

    /// `Some` only when both components are present and finite.
    pub fn to_lon_lat(&self) -> Option<LonLat> {
        LonLat::try_new(self.longitude?, self.latitude?)
    }
}

/// Accepts a JSON number, a numeric string, or null. Anything else (and any
/// non-finite value) reads as missing.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let value = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

/// Strings pass through; numbers and booleans keep their JSON text. Arrays,
/// objects and null read as missing.
fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// A section of the wrong shape (null, a string, a broken object) reads as
/// its default instead of failing the whole record.
fn lenient_section<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|v| T::deserialize(v).ok())
        .unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginLabels {
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub place: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub city: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationLabels {
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub institution: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub place: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub city: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_label",
        skip_serializing_if = "Option::is_none"
    )]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    #[serde(
        default,
        deserialize_with = "lenient_section",
        skip_serializing_if = "Option::is_none"
    )]
    pub origin: Option<GeoPoint>,
    #[serde(
        default,
        deserialize_with = "lenient_section",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<GeoPoint>,
    #[serde(default, deserialize_with = "lenient_section")]
    pub origin_labels: OriginLabels,
    #[serde(default, deserialize_with = "lenient_section")]
    pub destination_labels: DestinationLabels,
}

/// Trimmed label, or `None` when missing or blank.
fn label(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            origin: None,
            destination: None,
            origin_labels: OriginLabels::default(),
            destination_labels: DestinationLabels::default(),
        }
    }

    pub fn with_origin(mut self, longitude: f64, latitude: f64) -> Self {
        self.origin = Some(GeoPoint::new(longitude, latitude));
        self
    }

    pub fn with_destination(mut self, longitude: f64, latitude: f64) -> Self {
        self.destination = Some(GeoPoint::new(longitude, latitude));
        self
    }

    pub fn with_origin_city(mut self, city: impl Into<String>) -> Self {
        self.origin_labels.city = Some(city.into());
        self
    }

    pub fn with_origin_country(mut self, country: impl Into<String>) -> Self {
        self.origin_labels.country = Some(country.into());
        self
    }

    pub fn with_destination_city(mut self, city: impl Into<String>) -> Self {
        self.destination_labels.city = Some(city.into());
        self
    }

    pub fn with_destination_country(mut self, country: impl Into<String>) -> Self {
        self.destination_labels.country = Some(country.into());
        self
    }

    pub fn with_institution(mut self, institution: impl Into<String>) -> Self {
        self.destination_labels.institution = Some(institution.into());
        self
    }

    pub fn origin_point(&self) -> Option<LonLat> {
        self.origin.as_ref()?.to_lon_lat()
    }

    pub fn destination_point(&self) -> Option<LonLat> {
        self.destination.as_ref()?.to_lon_lat()
    }

    /// All four coordinates present, finite and on the globe.
    pub fn is_arc_eligible(&self) -> bool {
        self.origin_point().is_some() && self.destination_point().is_some()
    }

    pub fn origin_place(&self) -> Option<&str> {
        label(&self.origin_labels.place)
    }

    pub fn origin_city(&self) -> Option<&str> {
        label(&self.origin_labels.city)
    }

    pub fn origin_country(&self) -> Option<&str> {
        label(&self.origin_labels.country)
    }

    pub fn institution(&self) -> Option<&str> {
        label(&self.destination_labels.institution)
    }

    pub fn destination_place(&self) -> Option<&str> {
        label(&self.destination_labels.place)
    }

    pub fn destination_city(&self) -> Option<&str> {
        label(&self.destination_labels.city)
    }

    pub fn destination_country(&self) -> Option<&str> {
        label(&self.destination_labels.country)
    }

    /// Case-insensitive substring match over the id and every label.
    ///
    /// `needle` must already be lowercase; an empty needle matches everything.
    pub fn matches_query(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        if self.id.to_string().to_lowercase().contains(needle) {
            return true;
        }
        [
            self.origin_place(),
            self.origin_city(),
            self.origin_country(),
            self.institution(),
            self.destination_place(),
            self.destination_city(),
            self.destination_country(),
        ]
        .into_iter()
        .flatten()
        .any(|l| l.to_lowercase().contains(needle))
    }
}

/// Serialises a member list as its record ids only.
pub(crate) fn serialize_member_ids<S>(members: &[&Record], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(members.iter().map(|r| &r.id))
}

#[cfg(test)]
mod tests {
    use super::{GeoPoint, OriginLabels, Record, RecordId};
    use foundation::LonLat;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_with_lenient_coordinates() {
        let value = json!({
            "id": 42,
            "origin": { "longitude": "2.35", "latitude": 48.85 },
            "destination": { "longitude": -0.12, "latitude": null },
            "originLabels": { "city": "Paris", "country": "France" },
            "destinationLabels": { "institution": "British Museum", "city": "London" }
        });
        let r: Record = serde_json::from_value(value).unwrap();

        assert_eq!(r.id, RecordId::Number(42));
        assert_eq!(r.origin_point(), Some(LonLat::new(2.35, 48.85)));
        assert_eq!(r.destination_point(), None);
        assert!(!r.is_arc_eligible());
        assert_eq!(r.origin_city(), Some("Paris"));
        assert_eq!(r.institution(), Some("British Museum"));
    }

    #[test]
    fn garbage_coordinates_read_as_missing() {
        let p: GeoPoint =
            serde_json::from_value(json!({ "longitude": "n/a", "latitude": true })).unwrap();
        assert_eq!(p, GeoPoint::default());

        let p: GeoPoint = serde_json::from_value(json!({ "longitude": "NaN", "latitude": 1 })).unwrap();
        assert_eq!(p.longitude, None);
        assert_eq!(p.latitude, Some(1.0));
    }

    #[test]
    fn missing_sections_default() {
        let r: Record = serde_json::from_value(json!({ "id": "obj-1" })).unwrap();
        assert_eq!(r, Record::new("obj-1"));
    }

    #[test]
    fn non_finite_points_are_not_eligible() {
        let r = Record::new(1).with_origin(f64::NAN, 0.0).with_destination(1.0, 1.0);
        assert!(!r.is_arc_eligible());
        let r = Record::new(2).with_origin(0.0, 0.0).with_destination(1.0, f64::INFINITY);
        assert!(!r.is_arc_eligible());
        let r = Record::new(3).with_origin(0.0, 0.0).with_destination(1.0, 1.0);
        assert!(r.is_arc_eligible());
    }

    #[test]
    fn ids_accept_integral_floats_and_reject_other_shapes() {
        let r: Record = serde_json::from_value(json!({ "id": 3.0 })).unwrap();
        assert_eq!(r.id, RecordId::Number(3));
        let r: Record = serde_json::from_value(json!({ "id": 2.5 })).unwrap();
        assert_eq!(r.id, RecordId::Text("2.5".to_string()));
        assert!(serde_json::from_value::<Record>(json!({ "id": null })).is_err());
        assert!(serde_json::from_value::<Record>(json!({ "id": [1] })).is_err());
    }

    #[test]
    fn mistyped_sections_and_labels_fall_back_to_defaults() {
        let r: Record = serde_json::from_value(json!({
            "id": 1,
            "origin": "somewhere",
            "destination": { "longitude": 30, "latitude": 40 },
            "originLabels": null,
            "destinationLabels": { "city": 75, "country": ["UK"], "institution": true }
        }))
        .unwrap();
        assert_eq!(r.origin, None);
        assert_eq!(r.destination_point(), Some(LonLat::new(30.0, 40.0)));
        assert_eq!(r.origin_labels, OriginLabels::default());
        assert_eq!(r.destination_city(), Some("75"));
        assert_eq!(r.destination_country(), None);
        assert_eq!(r.institution(), Some("true"));
    }

    #[test]
    fn points_off_the_globe_are_not_eligible() {
        let r = Record::new(1).with_origin(1e300, 0.0).with_destination(1.0, 1.0);
        assert!(!r.is_arc_eligible());
        let r = Record::new(2).with_origin(0.0, 0.0).with_destination(1.0, 95.0);
        assert!(!r.is_arc_eligible());
    }

    #[test]
    fn blank_labels_are_missing() {
        let r = Record::new(1).with_origin_country("   ").with_origin_city(" Lyon ");
        assert_eq!(r.origin_country(), None);
        assert_eq!(r.origin_city(), Some("Lyon"));
    }

    #[test]
    fn query_matches_labels_case_insensitively() {
        let r = Record::new("abc")
            .with_origin_city("Benin City")
            .with_institution("Pitt Rivers Museum");
        assert!(r.matches_query("benin"));
        assert!(r.matches_query("rivers"));
        assert!(r.matches_query("ab"));
        assert!(r.matches_query(""));
        assert!(!r.matches_query("louvre"));
    }
}
