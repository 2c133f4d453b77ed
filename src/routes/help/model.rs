use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{BoundingBox, GeoPoint, within_radius};
use crate::lifecycle::HelpStatus;

pub const HELP_CATEGORIES: [&str; 6] = [
    "GROCERY",
    "MEDICAL",
    "TRANSPORT",
    "HOUSEHOLD",
    "EMOTIONAL_SUPPORT",
    "OTHER",
];
pub const HELP_URGENCY_LEVELS: [&str; 4] = ["LOW", "MEDIUM", "HIGH", "CRITICAL"];

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct HelpRequest {
    pub request_id: String,
    pub requester_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub urgency: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: Option<String>,
    /// 求助方声明的可接受半径，志愿者匹配不用它，只存档
    pub max_distance_km: Option<f64>,
    pub required_skills: Vec<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub assigned_volunteer_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHelpRequestRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub urgency: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub max_distance_km: Option<f64>,
    pub required_skills: Option<Vec<String>>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

const HELP_COLUMNS: &str = "request_id, requester_id, title, description, category, urgency, \
     latitude, longitude, location_address, max_distance_km, required_skills, \
     scheduled_for, assigned_volunteer_id, status, created_at, assigned_at, \
     completed_at";

impl HelpRequest {
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.latitude, self.longitude).ok()
    }

    pub fn parsed_status(&self) -> Option<HelpStatus> {
        self.status.parse().ok()
    }

    pub async fn create(
        pool: &PgPool,
        requester_id: &str,
        req: &CreateHelpRequestRequest,
        location_address: &str,
    ) -> Result<Self, sqlx::Error> {
        let request_id = Uuid::new_v4().to_string();
        sqlx::query_as::<_, HelpRequest>(&format!(
            r#"
            INSERT INTO help_requests (
                request_id, requester_id, title, description, category, urgency,
                latitude, longitude, location_address, max_distance_km,
                required_skills, scheduled_for, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'OPEN', NOW())
            RETURNING {HELP_COLUMNS}
            "#
        ))
        .bind(&request_id)
        .bind(requester_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.category)
        .bind(req.urgency.as_deref().unwrap_or("MEDIUM"))
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(location_address)
        .bind(req.max_distance_km)
        .bind(req.required_skills.clone().unwrap_or_default())
        .bind(req.scheduled_for)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, request_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, HelpRequest>(&format!(
            "SELECT {HELP_COLUMNS} FROM help_requests WHERE request_id = $1"
        ))
        .bind(request_id)
        .fetch_optional(pool)
        .await
    }

    /// 认领求助，先到先得：只有仍为 OPEN 的行会被更新
    pub async fn assign(
        pool: &PgPool,
        request_id: &str,
        volunteer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, HelpRequest>(&format!(
            r#"
            UPDATE help_requests
            SET status = 'ASSIGNED', assigned_volunteer_id = $2, assigned_at = NOW()
            WHERE request_id = $1 AND status = 'OPEN'
            RETURNING {HELP_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(volunteer_id)
        .fetch_optional(pool)
        .await
    }

    /// 状态流转。合法性由调用方先用 HelpStatus::can_transition 判定，
    /// 这里只负责落库；COMPLETED 顺带记完成时间。
    pub async fn set_status(
        pool: &PgPool,
        request_id: &str,
        status: HelpStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, HelpRequest>(&format!(
            r#"
            UPDATE help_requests
            SET status = $2,
                completed_at = CASE WHEN $2 = 'COMPLETED' THEN NOW() ELSE completed_at END
            WHERE request_id = $1
            RETURNING {HELP_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(status.to_string())
        .fetch_optional(pool)
        .await
    }

    pub async fn find_open(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HelpRequest>(&format!(
            r#"
            SELECT {HELP_COLUMNS} FROM help_requests
            WHERE status = 'OPEN'
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(pool)
        .await
    }

    /// 半径内的 OPEN 求助。包围盒粗筛，within_radius 精筛。
    pub async fn find_open_within_radius(
        pool: &PgPool,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let bb = BoundingBox::around(center, radius_km);
        let requests = sqlx::query_as::<_, HelpRequest>(&format!(
            r#"
            SELECT {HELP_COLUMNS} FROM help_requests
            WHERE status = 'OPEN'
                AND latitude BETWEEN $1 AND $2
                AND longitude BETWEEN $3 AND $4
            ORDER BY created_at DESC
            "#
        ))
        .bind(bb.min_lat)
        .bind(bb.max_lat)
        .bind(bb.min_lon)
        .bind(bb.max_lon)
        .fetch_all(pool)
        .await?;

        Ok(requests
            .into_iter()
            .filter(|r| {
                r.location()
                    .map(|p| within_radius(center, p, radius_km))
                    .unwrap_or(false)
            })
            .collect())
    }

    pub async fn find_by_requester(
        pool: &PgPool,
        requester_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HelpRequest>(&format!(
            r#"
            SELECT {HELP_COLUMNS} FROM help_requests
            WHERE requester_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(requester_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_volunteer(
        pool: &PgPool,
        volunteer_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HelpRequest>(&format!(
            r#"
            SELECT {HELP_COLUMNS} FROM help_requests
            WHERE assigned_volunteer_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(volunteer_id)
        .fetch_all(pool)
        .await
    }
}
