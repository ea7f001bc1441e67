//! Validated primitive types shared across the hoslink workspace.

/// Errors that can occur when creating validated types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// A latitude was outside the [-90, 90] range
    #[error("Latitude {0} is out of range (-90..=90)")]
    LatitudeOutOfRange(f64),
    /// A longitude was outside the [-180, 180] range
    #[error("Longitude {0} is out of range (-180..=180)")]
    LongitudeOutOfRange(f64),
    /// A coordinate was not a finite number
    #[error("Coordinate must be a finite number")]
    NonFiniteCoordinate,
}

/// A string type that guarantees non-empty content.
///
/// Wraps a `String` and ensures it contains at least one non-whitespace
/// character. The input is trimmed of leading and trailing whitespace
/// during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the
    /// trimmed result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypeError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A WGS84 coordinate pair validated at construction.
///
/// Latitude is bounded to [-90, 90] and longitude to [-180, 180]; both
/// components must be finite. Deserialisation applies the same checks, so a
/// `GeoPoint` read back from a store snapshot carries the same guarantees
/// as one built in code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    lat: f64,
    lng: f64,
}

impl GeoPoint {
    /// Creates a validated coordinate pair.
    pub fn new(lat: f64, lng: f64) -> Result<Self, TypeError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(TypeError::NonFiniteCoordinate);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(TypeError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(TypeError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Latitude in decimal degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in decimal degrees.
    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Returns true when this point lies within the axis-aligned bounding
    /// box spanned by `a` and `b` (inclusive).
    pub fn within_bounds(&self, a: GeoPoint, b: GeoPoint) -> bool {
        let (lat_min, lat_max) = min_max(a.lat, b.lat);
        let (lng_min, lng_max) = min_max(a.lng, b.lng);
        (lat_min..=lat_max).contains(&self.lat) && (lng_min..=lng_max).contains(&self.lng)
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lng)
    }
}

impl serde::Serialize for GeoPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("GeoPoint", 2)?;
        s.serialize_field("lat", &self.lat)?;
        s.serialize_field("lng", &self.lng)?;
        s.end()
    }
}

impl<'de> serde::Deserialize<'de> for GeoPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Wire {
            lat: f64,
            lng: f64,
        }
        let wire = Wire::deserialize(deserializer)?;
        GeoPoint::new(wire.lat, wire.lng).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Kisumu  ").unwrap();
        assert_eq!(text.as_str(), "Kisumu");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert!(matches!(NonEmptyText::new("   "), Err(TypeError::Empty)));
    }

    #[test]
    fn geo_point_accepts_kisumu_coordinates() {
        let point = GeoPoint::new(-0.0754, 34.7695).unwrap();
        assert_eq!(point.lat(), -0.0754);
        assert_eq!(point.lng(), 34.7695);
    }

    #[test]
    fn geo_point_rejects_out_of_range() {
        assert!(matches!(
            GeoPoint::new(-91.0, 34.0),
            Err(TypeError::LatitudeOutOfRange(_))
        ));
        assert!(matches!(
            GeoPoint::new(0.0, 181.0),
            Err(TypeError::LongitudeOutOfRange(_))
        ));
        assert!(matches!(
            GeoPoint::new(f64::NAN, 0.0),
            Err(TypeError::NonFiniteCoordinate)
        ));
    }

    #[test]
    fn geo_point_bounding_box() {
        let a = GeoPoint::new(-0.0754, 34.7695).unwrap();
        let b = GeoPoint::new(-0.1743, 34.9169).unwrap();
        let mid = GeoPoint::new(-0.12, 34.85).unwrap();
        let outside = GeoPoint::new(-0.5, 34.85).unwrap();
        assert!(mid.within_bounds(a, b));
        assert!(mid.within_bounds(b, a));
        assert!(!outside.within_bounds(a, b));
    }

    #[test]
    fn geo_point_round_trips_through_json() {
        let point = GeoPoint::new(-0.1743, 34.9169).unwrap();
        let json = serde_json::to_string(&point).unwrap();
        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(point, back);
    }

    #[test]
    fn geo_point_deserialisation_validates() {
        let result: Result<GeoPoint, _> = serde_json::from_str(r#"{"lat":123.0,"lng":0.0}"#);
        assert!(result.is_err());
    }
}
