use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::geo::{BoundingBox, GeoPoint, within_radius};
use crate::lifecycle::AlertStatus;

// 附近告警查询缓存：位置查询结果变化快，只缓存2分钟
const ALERT_LOCATION_CACHE_PREFIX: &str = "alert:loc:";
const ALERT_LOCATION_CACHE_EXPIRE: u64 = 120;

pub const ALERT_TYPES: [&str; 5] = ["EMERGENCY", "MEDICAL", "SAFETY", "FIRE", "ACCIDENT"];
pub const PRIORITY_LEVELS: [&str; 4] = ["LOW", "MEDIUM", "HIGH", "CRITICAL"];

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub alert_id: String,
    pub user_id: String,
    pub alert_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: String,
    pub alert_message: Option<String>,
    pub audio_file_url: Option<String>,
    pub is_voice_activated: bool,
    pub status: String,
    pub priority: String,
    pub responded_by: Option<String>,
    pub response_time: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// 外部分析器产出的不透明键值标注，正确性不依赖它
    pub ai_analysis: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAlertRequest {
    pub alert_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub alert_message: Option<String>,
    pub audio_file_url: Option<String>,
    pub is_voice_activated: Option<bool>,
    pub priority_level: Option<String>,
    pub ai_analysis: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub alert_id: String,
}

const ALERT_COLUMNS: &str = "alert_id, user_id, alert_type, latitude, longitude, location_address, \
     alert_message, audio_file_url, is_voice_activated, status, priority, \
     responded_by, response_time, resolved_at, ai_analysis, created_at";

impl Alert {
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.latitude, self.longitude).ok()
    }

    pub async fn create(
        pool: &PgPool,
        user_id: &str,
        req: &CreateAlertRequest,
        location_address: &str,
        priority: &str,
    ) -> Result<Self, sqlx::Error> {
        let alert_id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, Alert>(&format!(
            r#"
            INSERT INTO sos_alerts (
                alert_id, user_id, alert_type, latitude, longitude,
                location_address, alert_message, audio_file_url,
                is_voice_activated, status, priority, ai_analysis, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'ACTIVE', $10, $11, NOW())
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(&alert_id)
        .bind(user_id)
        .bind(&req.alert_type)
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(location_address)
        .bind(&req.alert_message)
        .bind(&req.audio_file_url)
        .bind(req.is_voice_activated.unwrap_or(false))
        .bind(priority)
        .bind(&req.ai_analysis)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, alert_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(&format!(
            "SELECT {ALERT_COLUMNS} FROM sos_alerts WHERE alert_id = $1"
        ))
        .bind(alert_id)
        .fetch_optional(pool)
        .await
    }

    /// 认领告警，先到先得：只有仍为 ACTIVE 的行会被更新，
    /// 并发认领时数据库侧保证只有一个成功。
    pub async fn respond(
        pool: &PgPool,
        alert_id: &str,
        responder_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            UPDATE sos_alerts
            SET status = 'RESPONDED', responded_by = $2, response_time = NOW()
            WHERE alert_id = $1 AND status = 'ACTIVE'
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(alert_id)
        .bind(responder_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn resolve(pool: &PgPool, alert_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            UPDATE sos_alerts
            SET status = 'RESOLVED', resolved_at = NOW()
            WHERE alert_id = $1 AND status IN ('ACTIVE', 'RESPONDED')
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(alert_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_false_alarm(
        pool: &PgPool,
        alert_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            UPDATE sos_alerts
            SET status = 'FALSE_ALARM', resolved_at = NOW()
            WHERE alert_id = $1 AND status IN ('ACTIVE', 'RESPONDED')
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(alert_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM sos_alerts
            WHERE status = 'ACTIVE'
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM sos_alerts
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// 半径内的 ACTIVE 告警，最新在前。
    /// 数据库包围盒粗筛，within_radius 精筛，结果短暂缓存。
    pub async fn find_active_within_radius(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        // 坐标取两位小数做缓存键
        let lat_rounded = (center.latitude * 100.0).round() / 100.0;
        let lon_rounded = (center.longitude * 100.0).round() / 100.0;
        let cache_key = format!(
            "{}{}:{}:{}",
            ALERT_LOCATION_CACHE_PREFIX, lat_rounded, lon_rounded, radius_km
        );

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
            if let Ok(json_str) = cached {
                if let Ok(alerts) = serde_json::from_str::<Vec<Alert>>(&json_str) {
                    tracing::debug!("Get nearby alerts from cache: {}", cache_key);
                    return Ok(alerts);
                }
            }
        }

        let bb = BoundingBox::around(center, radius_km);
        let alerts = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM sos_alerts
            WHERE status = 'ACTIVE'
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

        let filtered: Vec<Alert> = alerts
            .into_iter()
            .filter(|a| {
                a.location()
                    .map(|p| within_radius(center, p, radius_km))
                    .unwrap_or(false)
            })
            .collect();

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(&filtered) {
                let _: Result<(), redis::RedisError> = conn
                    .set_ex(&cache_key, json_str, ALERT_LOCATION_CACHE_EXPIRE)
                    .await;
            }
        }

        Ok(filtered)
    }

    pub fn parsed_status(&self) -> Option<AlertStatus> {
        self.status.parse().ok()
    }
}
