use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{BoundingBox, GeoPoint, within_radius};
use crate::notify::Recipient;
use crate::utils::hash_password;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

/// 半径查询返回的轻量用户行
#[derive(Debug, FromRow)]
pub struct NearbyUser {
    pub user_id: String,
    pub email: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl NearbyUser {
    pub fn as_recipient(&self) -> Recipient {
        Recipient {
            user_id: self.user_id.clone(),
            email: Some(self.email.clone()),
        }
    }
}

const USER_COLUMNS: &str = "user_id, username, email, full_name, phone, password_hash, \
     latitude, longitude, is_active, created_at";

impl User {
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).ok(),
            _ => None,
        }
    }

    pub fn as_recipient(&self) -> Recipient {
        Recipient {
            user_id: self.user_id.clone(),
            email: Some(self.email.clone()),
        }
    }

    pub async fn create(pool: &PgPool, req: RegisterRequest) -> Result<Self, sqlx::Error> {
        let user_id = Uuid::new_v4().to_string();
        let password_hash = hash_password(&req.password)
            .map_err(|e| sqlx::Error::Protocol(format!("Failed to hash password: {}", e)))?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (
                user_id, username, email, full_name, phone,
                password_hash, is_active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, true, NOW())
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user_id)
        .bind(&req.username)
        .bind(&req.email)
        .bind(&req.full_name)
        .bind(&req.phone)
        .bind(&password_hash)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_location(
        pool: &PgPool,
        user_id: &str,
        point: GeoPoint,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET latitude = $2, longitude = $3
            WHERE user_id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(point.latitude)
        .bind(point.longitude)
        .fetch_one(pool)
        .await
    }

    /// 半径内的活跃用户。数据库侧仅做包围盒粗筛，
    /// 结果回到 within_radius 精确复核。
    pub async fn find_within_radius(
        pool: &PgPool,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<NearbyUser>, sqlx::Error> {
        let bb = BoundingBox::around(center, radius_km);

        let rows = sqlx::query_as::<_, NearbyUser>(
            r#"
            SELECT user_id, email, latitude, longitude
            FROM users
            WHERE is_active = true
                AND latitude BETWEEN $1 AND $2
                AND longitude BETWEEN $3 AND $4
            "#,
        )
        .bind(bb.min_lat)
        .bind(bb.max_lat)
        .bind(bb.min_lon)
        .bind(bb.max_lon)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|u| {
                GeoPoint::new(u.latitude, u.longitude)
                    .map(|p| within_radius(center, p, radius_km))
                    .unwrap_or(false)
            })
            .collect())
    }
}
