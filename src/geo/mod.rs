use serde::{Deserialize, Serialize};

/// 地球半径（公里），与数据库端的半径查询保持同一常量
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// 1度纬度约111.32公里
const KM_PER_DEGREE_LAT: f64 = 111.32;

/// 经纬度坐标，构造时校验范围，之后不可变
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, PartialEq)]
pub enum GeoError {
    InvalidLatitude(f64),
    InvalidLongitude(f64),
}

impl std::fmt::Display for GeoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoError::InvalidLatitude(v) => write!(f, "latitude out of range: {}", v),
            GeoError::InvalidLongitude(v) => write!(f, "longitude out of range: {}", v),
        }
    }
}

impl std::error::Error for GeoError {}

/// Haversine 大圆距离，单位公里
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// 半径判定的唯一入口，边界点算作在内。
/// 数据库端的范围预筛只能作为超集，最终都要回到这里复核。
pub fn within_radius(center: GeoPoint, point: GeoPoint, radius_km: f64) -> bool {
    distance_km(center, point) <= radius_km
}

/// 经纬度包围盒，用于数据库侧的粗筛（超集），不能替代 within_radius
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE_LAT;
        // 纬度越高经度越密，cos 接近 0 时放开到全范围
        let cos_lat = center.latitude.to_radians().cos();
        let lon_delta = if cos_lat.abs() < 1e-6 {
            180.0
        } else {
            radius_km / (KM_PER_DEGREE_LAT * cos_lat.abs())
        };

        Self {
            min_lat: (center.latitude - lat_delta).max(-90.0),
            max_lat: (center.latitude + lat_delta).min(90.0),
            min_lon: (center.longitude - lon_delta).max(-180.0),
            max_lon: (center.longitude + lon_delta).min(180.0),
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE_KM: f64 = 1e-9;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert_eq!(
            GeoPoint::new(90.1, 0.0),
            Err(GeoError::InvalidLatitude(90.1))
        );
        assert_eq!(
            GeoPoint::new(0.0, -180.5),
            Err(GeoError::InvalidLongitude(-180.5))
        );
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn distance_is_symmetric() {
        let a = p(51.5074, -0.1278);
        let b = p(48.8566, 2.3522);
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < TOLERANCE_KM);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = p(12.9716, 77.5946);
        assert!(distance_km(a, a).abs() < TOLERANCE_KM);
    }

    #[test]
    fn one_degree_longitude_at_equator() {
        let d = distance_km(p(0.0, 0.0), p(0.0, 1.0));
        assert!((d - 111.2).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn london_to_paris_fixture() {
        let d = distance_km(p(51.5074, -0.1278), p(48.8566, 2.3522));
        assert!((343.0..=344.5).contains(&d), "got {}", d);
    }

    #[test]
    fn triangle_inequality_holds() {
        let a = p(0.0, 0.0);
        let b = p(10.0, 10.0);
        let c = p(-5.0, 20.0);
        assert!(distance_km(a, c) <= distance_km(a, b) + distance_km(b, c) + TOLERANCE_KM);
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let center = p(0.0, 0.0);
        let point = p(0.0, 1.0);
        let exact = distance_km(center, point);
        assert!(within_radius(center, point, exact));
        assert!(!within_radius(center, point, exact - 0.001));
    }

    #[test]
    fn bounding_box_is_a_superset_of_the_radius() {
        let center = p(40.0, -74.0);
        let bb = BoundingBox::around(center, 10.0);
        // 半径内的点必须全部落在包围盒里
        for (lat, lon) in [(40.05, -74.0), (40.0, -74.1), (39.95, -73.95)] {
            let q = p(lat, lon);
            if within_radius(center, q, 10.0) {
                assert!(bb.contains(q));
            }
        }
    }
}
