use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{BoundingBox, GeoPoint};
use crate::lifecycle::VerificationStatus;
use crate::matching::VolunteerCandidate;
use crate::notify::Recipient;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Volunteer {
    pub volunteer_id: String,
    pub user_id: String,
    pub skills: Vec<String>,
    pub is_available: bool,
    pub verification_status: String,
    pub background_check_status: String,
    pub max_distance_km: f64,
    pub completed_tasks: i32,
    pub availability_hours: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVolunteerRequest {
    pub skills: Vec<String>,
    pub max_distance_km: Option<f64>,
    pub availability_hours: Option<String>,
}

/// 匹配用的候选行：志愿者档案连同属主位置与邮箱
#[derive(Debug, FromRow)]
pub struct VolunteerPoolRow {
    pub volunteer_id: String,
    pub user_id: String,
    pub email: String,
    pub skills: Vec<String>,
    pub is_available: bool,
    pub verification_status: String,
    pub max_distance_km: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl VolunteerPoolRow {
    pub fn as_candidate(&self) -> VolunteerCandidate {
        VolunteerCandidate {
            volunteer_id: self.volunteer_id.clone(),
            user_id: self.user_id.clone(),
            is_available: self.is_available,
            verification_status: self
                .verification_status
                .parse()
                .unwrap_or(VerificationStatus::Pending),
            max_distance_km: self.max_distance_km,
            skill_ids: self.skills.clone(),
            location: match (self.latitude, self.longitude) {
                (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).ok(),
                _ => None,
            },
        }
    }

    pub fn as_recipient(&self) -> Recipient {
        Recipient {
            user_id: self.user_id.clone(),
            email: Some(self.email.clone()),
        }
    }
}

const VOLUNTEER_COLUMNS: &str = "volunteer_id, user_id, skills, is_available, verification_status, \
     background_check_status, max_distance_km, completed_tasks, \
     availability_hours, created_at";

const POOL_COLUMNS: &str = "v.volunteer_id, v.user_id, u.email, v.skills, v.is_available, \
     v.verification_status, v.max_distance_km, u.latitude, u.longitude";

impl Volunteer {
    /// 新注册的志愿者一律 PENDING，审核通过前不参与匹配
    pub async fn register(
        pool: &PgPool,
        user_id: &str,
        req: &RegisterVolunteerRequest,
    ) -> Result<Self, sqlx::Error> {
        let volunteer_id = Uuid::new_v4().to_string();
        sqlx::query_as::<_, Volunteer>(&format!(
            r#"
            INSERT INTO volunteers (
                volunteer_id, user_id, skills, is_available, verification_status,
                background_check_status, max_distance_km, completed_tasks,
                availability_hours, created_at
            )
            VALUES ($1, $2, $3, true, 'PENDING', 'PENDING', $4, 0, $5, NOW())
            RETURNING {VOLUNTEER_COLUMNS}
            "#
        ))
        .bind(&volunteer_id)
        .bind(user_id)
        .bind(&req.skills)
        .bind(req.max_distance_km.unwrap_or(10.0))
        .bind(&req.availability_hours)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        volunteer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Volunteer>(&format!(
            "SELECT {VOLUNTEER_COLUMNS} FROM volunteers WHERE volunteer_id = $1"
        ))
        .bind(volunteer_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_user(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Volunteer>(&format!(
            "SELECT {VOLUNTEER_COLUMNS} FROM volunteers WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// 审核通过：只对 PENDING 档案生效，顺带完成背景核查
    pub async fn verify(pool: &PgPool, volunteer_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Volunteer>(&format!(
            r#"
            UPDATE volunteers
            SET verification_status = 'VERIFIED', background_check_status = 'COMPLETED'
            WHERE volunteer_id = $1 AND verification_status = 'PENDING'
            RETURNING {VOLUNTEER_COLUMNS}
            "#
        ))
        .bind(volunteer_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn reject(pool: &PgPool, volunteer_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Volunteer>(&format!(
            r#"
            UPDATE volunteers
            SET verification_status = 'REJECTED'
            WHERE volunteer_id = $1 AND verification_status = 'PENDING'
            RETURNING {VOLUNTEER_COLUMNS}
            "#
        ))
        .bind(volunteer_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_availability(
        pool: &PgPool,
        volunteer_id: &str,
        is_available: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Volunteer>(&format!(
            r#"
            UPDATE volunteers
            SET is_available = $2
            WHERE volunteer_id = $1
            RETURNING {VOLUNTEER_COLUMNS}
            "#
        ))
        .bind(volunteer_id)
        .bind(is_available)
        .fetch_optional(pool)
        .await
    }

    /// 完成一单帮助后累计任务数
    pub async fn increment_completed_tasks(
        pool: &PgPool,
        volunteer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Volunteer>(&format!(
            r#"
            UPDATE volunteers
            SET completed_tasks = completed_tasks + 1
            WHERE volunteer_id = $1
            RETURNING {VOLUNTEER_COLUMNS}
            "#
        ))
        .bind(volunteer_id)
        .fetch_optional(pool)
        .await
    }

    /// 技能有交集、可用且已审核的志愿者
    pub async fn find_by_skills(
        pool: &PgPool,
        skills: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Volunteer>(&format!(
            r#"
            SELECT {VOLUNTEER_COLUMNS} FROM volunteers
            WHERE skills && $1 AND is_available = true AND verification_status = 'VERIFIED'
            ORDER BY completed_tasks DESC
            "#
        ))
        .bind(skills)
        .fetch_all(pool)
        .await
    }

    /// 包围盒粗筛过的候选池。粗筛用的是全局最大半径，
    /// 志愿者各自的出行半径仍由匹配策略精筛。
    pub async fn pool_near(
        pool: &PgPool,
        center: GeoPoint,
        coarse_radius_km: f64,
    ) -> Result<Vec<VolunteerPoolRow>, sqlx::Error> {
        let bb = BoundingBox::around(center, coarse_radius_km);
        sqlx::query_as::<_, VolunteerPoolRow>(&format!(
            r#"
            SELECT {POOL_COLUMNS}
            FROM volunteers v
            JOIN users u ON v.user_id = u.user_id
            WHERE u.is_active = true
                AND u.latitude BETWEEN $1 AND $2
                AND u.longitude BETWEEN $3 AND $4
            "#
        ))
        .bind(bb.min_lat)
        .bind(bb.max_lat)
        .bind(bb.min_lon)
        .bind(bb.max_lon)
        .fetch_all(pool)
        .await
    }
}
