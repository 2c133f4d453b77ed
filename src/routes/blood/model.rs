use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{BoundingBox, GeoPoint};
use crate::lifecycle::{BloodRequestStatus, blood_status_for_units};
use crate::matching::{BloodType, DonorCandidate};
use crate::notify::Recipient;

pub const CONTACT_PREFERENCES: [&str; 3] = ["PHONE", "EMAIL", "APP"];
pub const URGENCY_LEVELS: [&str; 4] = ["LOW", "MEDIUM", "HIGH", "CRITICAL"];

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Donor {
    pub donor_id: String,
    pub user_id: String,
    pub blood_type: String,
    pub is_available: bool,
    pub last_donation_date: Option<NaiveDate>,
    pub medical_eligibility: bool,
    pub weight_kg: Option<f64>,
    pub health_conditions: Option<String>,
    pub emergency_donor: bool,
    pub contact_preference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterDonorRequest {
    pub blood_type: String,
    pub last_donation_date: Option<NaiveDate>,
    pub medical_eligibility: bool,
    pub weight_kg: Option<f64>,
    pub health_conditions: Option<String>,
    pub emergency_donor: Option<bool>,
    pub contact_preference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct BloodRequest {
    pub request_id: String,
    pub requester_id: String,
    pub patient_name: String,
    pub blood_type: String,
    pub units_needed: i32,
    pub fulfilled_units: i32,
    pub urgency: String,
    pub hospital_name: String,
    pub hospital_address: Option<String>,
    pub hospital_latitude: Option<f64>,
    pub hospital_longitude: Option<f64>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub needed_by: Option<DateTime<Utc>>,
    pub additional_requirements: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBloodRequestRequest {
    pub patient_name: String,
    pub blood_type: String,
    pub units_needed: i32,
    pub urgency: String,
    pub hospital_name: String,
    pub hospital_address: Option<String>,
    pub hospital_latitude: Option<f64>,
    pub hospital_longitude: Option<f64>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub needed_by: Option<DateTime<Utc>>,
    pub additional_requirements: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequestStatusRequest {
    pub status: Option<String>,
    pub fulfilled_units: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct EmergencyDonorQuery {
    pub blood_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
}

/// 匹配用的候选行：献血者档案连同属主位置与邮箱
#[derive(Debug, FromRow)]
pub struct DonorPoolRow {
    pub donor_id: String,
    pub user_id: String,
    pub email: String,
    pub blood_type: String,
    pub is_available: bool,
    pub medical_eligibility: bool,
    pub emergency_donor: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl DonorPoolRow {
    pub fn as_candidate(&self) -> Option<DonorCandidate> {
        let blood_type: BloodType = self.blood_type.parse().ok()?;
        Some(DonorCandidate {
            donor_id: self.donor_id.clone(),
            user_id: self.user_id.clone(),
            blood_type,
            is_available: self.is_available,
            medical_eligibility: self.medical_eligibility,
            emergency_donor: self.emergency_donor,
            location: match (self.latitude, self.longitude) {
                (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).ok(),
                _ => None,
            },
        })
    }

    pub fn as_recipient(&self) -> Recipient {
        Recipient {
            user_id: self.user_id.clone(),
            email: Some(self.email.clone()),
        }
    }
}

const DONOR_COLUMNS: &str = "donor_id, user_id, blood_type, is_available, last_donation_date, \
     medical_eligibility, weight_kg, health_conditions, emergency_donor, \
     contact_preference, created_at";

const REQUEST_COLUMNS: &str = "request_id, requester_id, patient_name, blood_type, units_needed, \
     fulfilled_units, urgency, hospital_name, hospital_address, \
     hospital_latitude, hospital_longitude, contact_person, contact_phone, \
     needed_by, additional_requirements, status, created_at";

impl Donor {
    pub async fn register(
        pool: &PgPool,
        user_id: &str,
        req: &RegisterDonorRequest,
    ) -> Result<Self, sqlx::Error> {
        let donor_id = Uuid::new_v4().to_string();
        sqlx::query_as::<_, Donor>(&format!(
            r#"
            INSERT INTO blood_donors (
                donor_id, user_id, blood_type, is_available, last_donation_date,
                medical_eligibility, weight_kg, health_conditions,
                emergency_donor, contact_preference, created_at
            )
            VALUES ($1, $2, $3, true, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING {DONOR_COLUMNS}
            "#
        ))
        .bind(&donor_id)
        .bind(user_id)
        .bind(&req.blood_type)
        .bind(req.last_donation_date)
        .bind(req.medical_eligibility)
        .bind(req.weight_kg)
        .bind(&req.health_conditions)
        .bind(req.emergency_donor.unwrap_or(false))
        .bind(req.contact_preference.as_deref().unwrap_or("APP"))
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, donor_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Donor>(&format!(
            "SELECT {DONOR_COLUMNS} FROM blood_donors WHERE donor_id = $1"
        ))
        .bind(donor_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_user(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Donor>(&format!(
            "SELECT {DONOR_COLUMNS} FROM blood_donors WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// 改可用状态；转为不可用且无捐献记录时顺带记今天
    pub async fn update_availability(
        pool: &PgPool,
        donor_id: &str,
        is_available: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Donor>(&format!(
            r#"
            UPDATE blood_donors
            SET is_available = $2,
                last_donation_date = CASE
                    WHEN $2 = false AND last_donation_date IS NULL THEN CURRENT_DATE
                    ELSE last_donation_date
                END
            WHERE donor_id = $1
            RETURNING {DONOR_COLUMNS}
            "#
        ))
        .bind(donor_id)
        .bind(is_available)
        .fetch_optional(pool)
        .await
    }

    /// 指定血型的候选池。数据库侧只按血型预筛（超集），
    /// 可用性等规则由匹配策略统一判定。
    pub async fn pool_by_blood_type(
        pool: &PgPool,
        blood_type: &str,
    ) -> Result<Vec<DonorPoolRow>, sqlx::Error> {
        sqlx::query_as::<_, DonorPoolRow>(
            r#"
            SELECT d.donor_id, d.user_id, u.email, d.blood_type,
                   d.is_available, d.medical_eligibility, d.emergency_donor,
                   u.latitude, u.longitude
            FROM blood_donors d
            JOIN users u ON d.user_id = u.user_id
            WHERE d.blood_type = $1 AND u.is_active = true
            "#,
        )
        .bind(blood_type)
        .fetch_all(pool)
        .await
    }

    /// 紧急献血者候选池：血型预筛加包围盒粗筛，精筛交给匹配策略
    pub async fn emergency_pool_near(
        pool: &PgPool,
        blood_type: &str,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<DonorPoolRow>, sqlx::Error> {
        let bb = BoundingBox::around(center, radius_km);
        sqlx::query_as::<_, DonorPoolRow>(
            r#"
            SELECT d.donor_id, d.user_id, u.email, d.blood_type,
                   d.is_available, d.medical_eligibility, d.emergency_donor,
                   u.latitude, u.longitude
            FROM blood_donors d
            JOIN users u ON d.user_id = u.user_id
            WHERE d.blood_type = $1 AND u.is_active = true
                AND u.latitude BETWEEN $2 AND $3
                AND u.longitude BETWEEN $4 AND $5
            "#,
        )
        .bind(blood_type)
        .bind(bb.min_lat)
        .bind(bb.max_lat)
        .bind(bb.min_lon)
        .bind(bb.max_lon)
        .fetch_all(pool)
        .await
    }
}

impl BloodRequest {
    pub async fn create(
        pool: &PgPool,
        requester_id: &str,
        req: &CreateBloodRequestRequest,
    ) -> Result<Self, sqlx::Error> {
        let request_id = Uuid::new_v4().to_string();
        sqlx::query_as::<_, BloodRequest>(&format!(
            r#"
            INSERT INTO blood_requests (
                request_id, requester_id, patient_name, blood_type, units_needed,
                fulfilled_units, urgency, hospital_name, hospital_address,
                hospital_latitude, hospital_longitude, contact_person,
                contact_phone, needed_by, additional_requirements, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'ACTIVE', NOW())
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(&request_id)
        .bind(requester_id)
        .bind(&req.patient_name)
        .bind(&req.blood_type)
        .bind(req.units_needed)
        .bind(&req.urgency)
        .bind(&req.hospital_name)
        .bind(&req.hospital_address)
        .bind(req.hospital_latitude)
        .bind(req.hospital_longitude)
        .bind(&req.contact_person)
        .bind(&req.contact_phone)
        .bind(req.needed_by)
        .bind(&req.additional_requirements)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, request_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BloodRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM blood_requests WHERE request_id = $1"
        ))
        .bind(request_id)
        .fetch_optional(pool)
        .await
    }

    pub fn parsed_status(&self) -> Option<BloodRequestStatus> {
        self.status.parse().ok()
    }

    /// 状态更新。带 fulfilled_units 时按单位数规则重算状态，
    /// 数值减小同样回退。CANCELLED / EXPIRED 不可复活，
    /// FULFILLED 只接受单位数重算；UPDATE 带同样的状态条件防并发改写。
    pub async fn update_status(
        pool: &PgPool,
        request_id: &str,
        status: Option<BloodRequestStatus>,
        fulfilled_units: Option<i32>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(current) = Self::find_by_id(pool, request_id).await? else {
            return Ok(None);
        };

        let allowed = current
            .parsed_status()
            .map(|s| {
                if fulfilled_units.is_some() {
                    s.can_update_units()
                } else {
                    s.can_set_status()
                }
            })
            .unwrap_or(false);
        if !allowed {
            return Ok(None);
        }

        let mut next_status = status.map(|s| s.to_string()).unwrap_or(current.status);
        let next_units = fulfilled_units.unwrap_or(current.fulfilled_units);
        if fulfilled_units.is_some() {
            next_status = blood_status_for_units(current.units_needed, next_units).to_string();
        }

        let frozen = if fulfilled_units.is_some() {
            "('EXPIRED', 'CANCELLED')"
        } else {
            "('FULFILLED', 'EXPIRED', 'CANCELLED')"
        };
        sqlx::query_as::<_, BloodRequest>(&format!(
            r#"
            UPDATE blood_requests
            SET status = $2, fulfilled_units = $3
            WHERE request_id = $1 AND status NOT IN {frozen}
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(&next_status)
        .bind(next_units)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_active(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BloodRequest>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM blood_requests
            WHERE status = 'ACTIVE'
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn find_critical(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BloodRequest>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM blood_requests
            WHERE urgency = 'CRITICAL' AND status IN ('ACTIVE', 'PARTIALLY_FULFILLED')
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(pool)
        .await
    }
}
