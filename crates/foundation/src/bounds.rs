use crate::math::LonLat;

/// Map viewport as a latitude/longitude rectangle, in degrees.
///
/// Convention:
/// - `south <= north`.
/// - `west > east` means the viewport crosses the antimeridian; the visible
///   longitudes are then `[west, 180] ∪ [-180, east]`.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl ViewBounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Map libraries emit transient NaN/inf while animating; such bounds
    /// must not be used for filtering.
    pub fn is_finite(&self) -> bool {
        self.north.is_finite()
            && self.south.is_finite()
            && self.east.is_finite()
            && self.west.is_finite()
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Longitudinal extent in degrees, accounting for antimeridian crossing.
    pub fn lon_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            self.east - self.west + 360.0
        } else {
            self.east - self.west
        }
    }

    /// Strict containment: points on an edge are outside.
    pub fn contains_strict(&self, p: LonLat) -> bool {
        if !(p.latitude > self.south && p.latitude < self.north) {
            return false;
        }
        if self.crosses_antimeridian() {
            p.longitude > self.west || p.longitude < self.east
        } else {
            p.longitude > self.west && p.longitude < self.east
        }
    }

    /// Inclusive containment: points on an edge are inside.
    pub fn contains_inclusive(&self, p: LonLat) -> bool {
        if !(p.latitude >= self.south && p.latitude <= self.north) {
            return false;
        }
        if self.crosses_antimeridian() {
            p.longitude >= self.west || p.longitude <= self.east
        } else {
            p.longitude >= self.west && p.longitude <= self.east
        }
    }

    /// Grow the rectangle by `padding` degrees on every side.
    ///
    /// Latitude is clamped to the poles. Longitude wraps across the
    /// antimeridian; once the padded span reaches 360 degrees the result
    /// covers every longitude.
    pub fn expanded(&self, padding: f64) -> Self {
        let north = (self.north + padding).min(90.0);
        let south = (self.south - padding).max(-90.0);

        if self.lon_span() + 2.0 * padding >= 360.0 {
            return Self::new(north, south, 180.0, -180.0);
        }

        Self::new(
            north,
            south,
            wrap_longitude(self.east + padding),
            wrap_longitude(self.west - padding),
        )
    }
}

/// Single-step wrap into `[-180, 180]`; callers only ever overshoot by less
/// than a full turn.
fn wrap_longitude(lon: f64) -> f64 {
    if lon < -180.0 {
        lon + 360.0
    } else if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}
