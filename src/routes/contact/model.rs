use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::notify::CascadeContact;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct EmergencyContact {
    pub contact_id: String,
    pub user_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub relationship: Option<String>,
    pub is_primary: bool,
    pub notify_on_sos: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub contact_name: String,
    pub contact_phone: String,
    pub relationship: Option<String>,
    pub is_primary: Option<bool>,
    pub notify_on_sos: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub relationship: Option<String>,
    pub is_primary: Option<bool>,
    pub notify_on_sos: Option<bool>,
}

const CONTACT_COLUMNS: &str = "contact_id, user_id, contact_name, contact_phone, relationship, \
     is_primary, notify_on_sos, created_at";

impl EmergencyContact {
    pub fn as_cascade_contact(&self) -> CascadeContact {
        CascadeContact {
            contact_name: self.contact_name.clone(),
            contact_phone: self.contact_phone.clone(),
        }
    }

    pub async fn create(
        pool: &PgPool,
        user_id: &str,
        req: CreateContactRequest,
    ) -> Result<Self, sqlx::Error> {
        let contact_id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, EmergencyContact>(&format!(
            r#"
            INSERT INTO emergency_contacts (
                contact_id, user_id, contact_name, contact_phone,
                relationship, is_primary, notify_on_sos, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(&contact_id)
        .bind(user_id)
        .bind(&req.contact_name)
        .bind(&req.contact_phone)
        .bind(&req.relationship)
        .bind(req.is_primary.unwrap_or(false))
        .bind(req.notify_on_sos.unwrap_or(true))
        .fetch_one(pool)
        .await
    }

    pub async fn find_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmergencyContact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS} FROM emergency_contacts
            WHERE user_id = $1
            ORDER BY is_primary DESC, created_at
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// SOS 级联要通知的联系人（notify_on_sos 为真）
    pub async fn sos_contacts_for(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmergencyContact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS} FROM emergency_contacts
            WHERE user_id = $1 AND notify_on_sos = true
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// 只有联系人的属主可以修改，WHERE 同时带两个键
    pub async fn update(
        pool: &PgPool,
        contact_id: &str,
        user_id: &str,
        req: UpdateContactRequest,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EmergencyContact>(&format!(
            r#"
            UPDATE emergency_contacts SET
                contact_name = COALESCE($3, contact_name),
                contact_phone = COALESCE($4, contact_phone),
                relationship = COALESCE($5, relationship),
                is_primary = COALESCE($6, is_primary),
                notify_on_sos = COALESCE($7, notify_on_sos)
            WHERE contact_id = $1 AND user_id = $2
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(contact_id)
        .bind(user_id)
        .bind(&req.contact_name)
        .bind(&req.contact_phone)
        .bind(&req.relationship)
        .bind(req.is_primary)
        .bind(req.notify_on_sos)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(
        pool: &PgPool,
        contact_id: &str,
        user_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM emergency_contacts WHERE contact_id = $1 AND user_id = $2",
        )
        .bind(contact_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
