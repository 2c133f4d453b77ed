use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{GeoPoint, within_radius};

pub const CONFIDENCE_LEVELS: [&str; 3] = ["LOW", "MEDIUM", "HIGH"];

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct MissingPersonCase {
    pub case_id: String,
    pub reporter_id: String,
    pub person_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub last_seen_address: Option<String>,
    pub last_seen_latitude: Option<f64>,
    pub last_seen_longitude: Option<f64>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub police_report_number: Option<String>,
    pub status: String,
    /// 案件自己声明的搜寻半径（公里），附近查询用的是它
    pub search_radius_km: f64,
    pub found_at: Option<DateTime<Utc>>,
    pub found_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReportCaseRequest {
    pub person_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub last_seen_address: Option<String>,
    pub last_seen_latitude: Option<f64>,
    pub last_seen_longitude: Option<f64>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub police_report_number: Option<String>,
    pub search_radius_km: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Sighting {
    pub sighting_id: String,
    pub case_id: String,
    pub reporter_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: String,
    pub description: Option<String>,
    pub confidence_level: String,
    pub is_verified: bool,
    pub sighted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReportSightingRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
    pub confidence_level: Option<String>,
    pub sighted_at: Option<DateTime<Utc>>,
}

const CASE_COLUMNS: &str = "case_id, reporter_id, person_name, age, gender, description, \
     photo_url, last_seen_address, last_seen_latitude, last_seen_longitude, \
     last_seen_at, contact_name, contact_phone, police_report_number, status, \
     search_radius_km, found_at, found_address, created_at";

const SIGHTING_COLUMNS: &str = "sighting_id, case_id, reporter_id, latitude, longitude, \
     location_address, description, confidence_level, is_verified, \
     sighted_at, created_at";

impl MissingPersonCase {
    pub fn last_seen(&self) -> Option<GeoPoint> {
        match (self.last_seen_latitude, self.last_seen_longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).ok(),
            _ => None,
        }
    }

    pub async fn create(
        pool: &PgPool,
        reporter_id: &str,
        req: &ReportCaseRequest,
    ) -> Result<Self, sqlx::Error> {
        let case_id = Uuid::new_v4().to_string();
        sqlx::query_as::<_, MissingPersonCase>(&format!(
            r#"
            INSERT INTO missing_person_cases (
                case_id, reporter_id, person_name, age, gender, description,
                photo_url, last_seen_address, last_seen_latitude,
                last_seen_longitude, last_seen_at, contact_name, contact_phone,
                police_report_number, status, search_radius_km, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    'ACTIVE', $15, NOW())
            RETURNING {CASE_COLUMNS}
            "#
        ))
        .bind(&case_id)
        .bind(reporter_id)
        .bind(&req.person_name)
        .bind(req.age)
        .bind(&req.gender)
        .bind(&req.description)
        .bind(&req.photo_url)
        .bind(&req.last_seen_address)
        .bind(req.last_seen_latitude)
        .bind(req.last_seen_longitude)
        .bind(req.last_seen_at)
        .bind(&req.contact_name)
        .bind(&req.contact_phone)
        .bind(&req.police_report_number)
        .bind(req.search_radius_km.unwrap_or(50.0))
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, case_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MissingPersonCase>(&format!(
            "SELECT {CASE_COLUMNS} FROM missing_person_cases WHERE case_id = $1"
        ))
        .bind(case_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MissingPersonCase>(&format!(
            r#"
            SELECT {CASE_COLUMNS} FROM missing_person_cases
            WHERE status = 'ACTIVE'
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(pool)
        .await
    }

    /// 查询点附近的 ACTIVE 案件。半径是每个案件自己声明的
    /// search_radius_km，所以在应用侧精筛，不走包围盒。
    pub async fn find_active_near(
        pool: &PgPool,
        point: GeoPoint,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let cases = sqlx::query_as::<_, MissingPersonCase>(&format!(
            r#"
            SELECT {CASE_COLUMNS} FROM missing_person_cases
            WHERE status = 'ACTIVE'
                AND last_seen_latitude IS NOT NULL
                AND last_seen_longitude IS NOT NULL
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(pool)
        .await?;

        Ok(cases
            .into_iter()
            .filter(|c| {
                c.last_seen()
                    .map(|seen| within_radius(seen, point, c.search_radius_km))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// 标记寻回：只对 ACTIVE 案件生效，记寻回时间与地点
    pub async fn mark_found(
        pool: &PgPool,
        case_id: &str,
        found_address: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MissingPersonCase>(&format!(
            r#"
            UPDATE missing_person_cases
            SET status = 'FOUND', found_at = NOW(), found_address = $2
            WHERE case_id = $1 AND status = 'ACTIVE'
            RETURNING {CASE_COLUMNS}
            "#
        ))
        .bind(case_id)
        .bind(found_address)
        .fetch_optional(pool)
        .await
    }

    pub async fn close(pool: &PgPool, case_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MissingPersonCase>(&format!(
            r#"
            UPDATE missing_person_cases
            SET status = 'CLOSED'
            WHERE case_id = $1 AND status IN ('ACTIVE', 'FOUND')
            RETURNING {CASE_COLUMNS}
            "#
        ))
        .bind(case_id)
        .fetch_optional(pool)
        .await
    }
}

impl Sighting {
    pub async fn create(
        pool: &PgPool,
        case_id: &str,
        reporter_id: &str,
        req: &ReportSightingRequest,
        location_address: &str,
    ) -> Result<Self, sqlx::Error> {
        let sighting_id = Uuid::new_v4().to_string();
        sqlx::query_as::<_, Sighting>(&format!(
            r#"
            INSERT INTO missing_person_sightings (
                sighting_id, case_id, reporter_id, latitude, longitude,
                location_address, description, confidence_level, is_verified,
                sighted_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, $9, NOW())
            RETURNING {SIGHTING_COLUMNS}
            "#
        ))
        .bind(&sighting_id)
        .bind(case_id)
        .bind(reporter_id)
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(location_address)
        .bind(&req.description)
        .bind(req.confidence_level.as_deref().unwrap_or("MEDIUM"))
        .bind(req.sighted_at)
        .fetch_one(pool)
        .await
    }

    /// 案件的目击记录，最新在前
    pub async fn find_for_case(pool: &PgPool, case_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sighting>(&format!(
            r#"
            SELECT {SIGHTING_COLUMNS} FROM missing_person_sightings
            WHERE case_id = $1
            ORDER BY sighted_at DESC NULLS LAST, created_at DESC
            "#
        ))
        .bind(case_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_at(lat: f64, lon: f64, radius_km: f64) -> MissingPersonCase {
        MissingPersonCase {
            case_id: "c1".into(),
            reporter_id: "u1".into(),
            person_name: "Test Person".into(),
            age: None,
            gender: None,
            description: None,
            photo_url: None,
            last_seen_address: None,
            last_seen_latitude: Some(lat),
            last_seen_longitude: Some(lon),
            last_seen_at: None,
            contact_name: None,
            contact_phone: None,
            police_report_number: None,
            status: "ACTIVE".into(),
            search_radius_km: radius_km,
            found_at: None,
            found_address: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn nearby_uses_case_own_search_radius() {
        // 查询点距最后目击地约 11 公里
        let point = GeoPoint::new(0.0, 0.0).unwrap();
        let wide = case_at(0.1, 0.0, 50.0);
        let narrow = case_at(0.1, 0.0, 5.0);

        let hit = |c: &MissingPersonCase| {
            c.last_seen()
                .map(|seen| within_radius(seen, point, c.search_radius_km))
                .unwrap_or(false)
        };
        assert!(hit(&wide));
        assert!(!hit(&narrow));
    }

    #[test]
    fn case_without_coordinates_never_matches_nearby() {
        let mut c = case_at(0.0, 0.0, 50.0);
        c.last_seen_latitude = None;
        assert!(c.last_seen().is_none());
    }
}
