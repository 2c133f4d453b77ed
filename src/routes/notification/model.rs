use sqlx::PgPool;

use crate::notify::Notification;

const NOTIFICATION_COLUMNS: &str = "notification_id, recipient_id, title, body, category, \
     priority, related_id, is_read, sent_via, expires_at, created_at";

/// 收件箱查询，记录本身由 Notifier 写入
pub struct Inbox;

impl Inbox {
    pub async fn find_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_unread_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE recipient_id = $1 AND is_read = false
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn unread_count(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// 标记已读，属主校验在 WHERE 里
    pub async fn mark_read(
        pool: &PgPool,
        notification_id: &str,
        user_id: &str,
    ) -> Result<Option<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET is_read = true
            WHERE notification_id = $1 AND recipient_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// 全部标记已读，返回改动条数
    pub async fn mark_all_read(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE recipient_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// 过期未读一律转已读，后台任务周期调用
    pub async fn sweep_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE is_read = false AND expires_at < NOW()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
