//! Great-circle distance.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers between two points given in degrees.
/// NaN inputs yield NaN.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_symmetric() {
        let points = [
            (51.5074, -0.1278),
            (48.8566, 2.3522),
            (-33.8688, 151.2093),
            (40.7128, -74.0060),
            (0.0, 179.9),
        ];
        for &(a, b) in &points {
            for &(c, d) in &points {
                let forward = distance_km(a, b, c, d);
                let backward = distance_km(c, d, a, b);
                assert!((forward - backward).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(distance_km(12.5, -7.25, 12.5, -7.25), 0.0);
    }

    #[test]
    fn test_london_to_paris() {
        let km = distance_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((km - 343.5).abs() < 1.0, "got {}", km);
    }

    #[test]
    fn test_antipodal_is_half_circumference() {
        let km = distance_km(0.0, 0.0, 0.0, 180.0);
        assert!((km - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(distance_km(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }
}
