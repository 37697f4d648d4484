use std::fmt;

use serde::Deserialize;

/// Earth's radius in meters, as used by the flat-earth helpers.
const EARTH_RADIUS: f64 = 6_373_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.latitude, self.longitude)
    }
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Initial bearing from this position to another, in degrees (0-360, 0 is North).
    pub fn bearing_to(&self, other: &Position) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let y = delta_lon.sin() * lat_to.cos();
        let x = lat_from.cos() * lat_to.sin() - lat_from.sin() * lat_to.cos() * delta_lon.cos();

        y.atan2(x).to_degrees().rem_euclid(360.0)
    }

    /// Distance in meters using an equirectangular (flat-earth) projection.
    /// Only meaningful over short ranges, which is all station keeping needs.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lat = lat_to - lat_from;
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let x = delta_lon * ((lat_from + lat_to) / 2.0).cos();

        (x * x + delta_lat * delta_lat).sqrt() * EARTH_RADIUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_new_and_display() {
        let pos = Position::new(49.69395, 10.82761);

        assert_eq!(pos.latitude, 49.69395);
        assert_eq!(pos.longitude, 10.82761);
        assert_eq!(format!("{}", pos), "(49.693950°, 10.827610°)");
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let pos = Position::new(49.69395, 10.82761);
        assert_eq!(pos.distance_to(&pos), 0.0);
    }

    #[test]
    fn test_distance_one_arc_minute_north() {
        // one arc minute of latitude is about one nautical mile
        let a = Position::new(49.0, 10.0);
        let b = Position::new(49.0 + 1.0 / 60.0, 10.0);
        let d = a.distance_to(&b);
        assert!((d - 1853.8).abs() < 1.0, "distance {}", d);
    }

    #[test]
    fn test_distance_shrinks_with_latitude() {
        let at_equator = Position::new(0.0, 0.0).distance_to(&Position::new(0.0, 0.01));
        let at_sixty = Position::new(60.0, 0.0).distance_to(&Position::new(60.0, 0.01));
        assert!((at_sixty / at_equator - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Position::new(49.0, 10.0);
        assert!(origin.bearing_to(&Position::new(49.01, 10.0)).abs() < 1e-6);
        assert!((origin.bearing_to(&Position::new(48.99, 10.0)) - 180.0).abs() < 1e-6);
        assert!((origin.bearing_to(&Position::new(49.0, 10.01)) - 90.0).abs() < 0.01);
        assert!((origin.bearing_to(&Position::new(49.0, 9.99)) - 270.0).abs() < 0.01);
    }
}
