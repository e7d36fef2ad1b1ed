use super::precision::quantize;

/// Mean Earth radius (IUGG), kilometres.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6_371.008_8;

/// Geographic position in decimal degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LonLat {
    pub longitude: f64,
    pub latitude: f64,
}

impl LonLat {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Returns `None` unless both components are finite and on the globe
    /// (`|longitude| <= 180`, `|latitude| <= 90`).
    pub fn try_new(longitude: f64, latitude: f64) -> Option<Self> {
        let on_globe =
            (-180.0..=180.0).contains(&longitude) && (-90.0..=90.0).contains(&latitude);
        on_globe.then(|| Self::new(longitude, latitude))
    }

    /// `[longitude, latitude]`, the order map renderers expect.
    pub fn to_array(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    /// Component-wise average of two points.
    ///
    /// Plain arithmetic in degree space; no great-circle interpolation and no
    /// antimeridian handling.
    pub fn midpoint(self, other: LonLat) -> LonLat {
        LonLat::new(
            (self.longitude + other.longitude) / 2.0,
            (self.latitude + other.latitude) / 2.0,
        )
    }

    /// Integer grid cell at `decimals` places, usable as a hash key.
    pub fn quantized(self, decimals: u32) -> (i64, i64) {
        (
            quantize(self.longitude, decimals),
            quantize(self.latitude, decimals),
        )
    }
}

/// Great-circle distance on a spherical Earth (haversine), kilometres.
pub fn haversine_km(a: LonLat, b: LonLat) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_KM * h.sqrt().min(1.0).asin()
}
