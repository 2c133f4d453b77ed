use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

// 实时推送使用的 Redis 频道前缀
const USER_CHANNEL_PREFIX: &str = "notify:user:";
const TOPIC_CHANNEL_PREFIX: &str = "notify:topic:";

/// 通知类别，类别决定优先级与是否走带外渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    SosAlert,
    HelpRequest,
    BloodRequest,
    MissingPerson,
    System,
    Reminder,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::SosAlert,
        Category::HelpRequest,
        Category::BloodRequest,
        Category::MissingPerson,
        Category::System,
        Category::Reminder,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::SosAlert => "SOS_ALERT",
            Category::HelpRequest => "HELP_REQUEST",
            Category::BloodRequest => "BLOOD_REQUEST",
            Category::MissingPerson => "MISSING_PERSON",
            Category::System => "SYSTEM",
            Category::Reminder => "REMINDER",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOS_ALERT" => Ok(Category::SosAlert),
            "HELP_REQUEST" => Ok(Category::HelpRequest),
            "BLOOD_REQUEST" => Ok(Category::BloodRequest),
            "MISSING_PERSON" => Ok(Category::MissingPerson),
            "SYSTEM" => Ok(Category::System),
            "REMINDER" => Ok(Category::Reminder),
            _ => Err(InvalidCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCategory(pub String);

impl fmt::Display for InvalidCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid notification category: {}", self.0)
    }
}

impl std::error::Error for InvalidCategory {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// 类别到优先级的固定映射，全定义且确定
pub fn priority_for(category: Category) -> Priority {
    match category {
        Category::SosAlert => Priority::Critical,
        Category::BloodRequest => Priority::High,
        Category::HelpRequest => Priority::Medium,
        Category::MissingPerson | Category::System | Category::Reminder => Priority::Low,
    }
}

/// 高优先级通知额外走邮件渠道
fn wants_email(priority: Priority) -> bool {
    priority >= Priority::High
}

/// 通知的持久化记录。只要 send 返回成功该记录必然存在，
/// 创建后只有已读标记会变化，不会重投。
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub notification_id: String,
    pub recipient_id: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub priority: String,
    pub related_id: Option<String>,
    pub is_read: bool,
    pub sent_via: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 通知接收方：用户ID加可选邮箱（邮件渠道用）
#[derive(Debug, Clone)]
pub struct Recipient {
    pub user_id: String,
    pub email: Option<String>,
}

/// 邮件中继：POST 到配置的 HTTP 端点，失败只记日志
#[derive(Debug)]
pub struct MailRelay {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl MailRelay {
    pub fn new(endpoint: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            from,
        }
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// 短信中继，紧急联系人级联使用；未配置时只记日志
#[derive(Debug)]
pub struct SmsRelay {
    client: reqwest::Client,
    endpoint: String,
}

impl SmsRelay {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    pub async fn send(&self, phone: &str, message: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "to": phone,
                "message": message,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// 通知分发器。构造时显式注入各渠道句柄，随 AppState 传递，
/// 不从任何全局状态查找。
#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
    redis: Arc<RedisClient>,
    mailer: Option<Arc<MailRelay>>,
    sms: Option<Arc<SmsRelay>>,
}

impl Notifier {
    pub fn new(
        pool: PgPool,
        redis: Arc<RedisClient>,
        mailer: Option<MailRelay>,
        sms: Option<SmsRelay>,
    ) -> Self {
        Self {
            pool,
            redis,
            mailer: mailer.map(Arc::new),
            sms: sms.map(Arc::new),
        }
    }

    /// 给单个接收方发通知。
    /// 持久化记录同步写入，写成功后才派生实时推送与邮件任务；
    /// 渠道失败只记日志，不回滚记录也不影响返回值。
    /// 保证：本方法返回 Ok 当且仅当落库成功，
    /// 即使所有投递渠道全部失败，记录依然存在且可查询。
    pub async fn send(
        &self,
        recipient: &Recipient,
        category: Category,
        title: &str,
        body: &str,
        related_id: Option<&str>,
    ) -> Result<Notification, sqlx::Error> {
        let priority = priority_for(category);
        let notification_id = Uuid::new_v4().to_string();

        let record = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                notification_id, recipient_id, title, body, category,
                priority, related_id, is_read, sent_via, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, false, 'APP', NOW())
            RETURNING
                notification_id, recipient_id, title, body, category,
                priority, related_id, is_read, sent_via, expires_at, created_at
            "#,
        )
        .bind(&notification_id)
        .bind(&recipient.user_id)
        .bind(title)
        .bind(body)
        .bind(category.to_string())
        .bind(priority.to_string())
        .bind(related_id)
        .fetch_one(&self.pool)
        .await?;

        self.push_realtime(&recipient.user_id, &record);

        if wants_email(priority) {
            if let (Some(mailer), Some(email)) = (self.mailer.clone(), recipient.email.clone()) {
                let subject = title.to_string();
                let text = body.to_string();
                tokio::spawn(async move {
                    if let Err(e) = mailer.send(&email, &subject, &text).await {
                        tracing::warn!("Email delivery to {} failed: {}", email, e);
                    }
                });
            }
        }

        Ok(record)
    }

    /// 向一批接收方独立扇出。持久化写并发执行，互不阻塞，
    /// 单个接收方失败不影响其余；空列表直接成功。
    /// 返回成功写入的条数。
    pub async fn fan_out(
        &self,
        recipients: &[Recipient],
        category: Category,
        title: &str,
        body: &str,
        related_id: Option<&str>,
    ) -> usize {
        if recipients.is_empty() {
            return 0;
        }

        let sends = recipients
            .iter()
            .map(|r| self.send(r, category, title, body, related_id));

        let mut delivered = 0;
        for (recipient, result) in recipients.iter().zip(join_all(sends).await) {
            match result {
                Ok(_) => delivered += 1,
                Err(e) => {
                    tracing::error!(
                        "Failed to store notification for {}: {}",
                        recipient.user_id,
                        e
                    );
                }
            }
        }
        delivered
    }

    /// 向主题频道广播（如 SOS 实时流），即发即忘
    pub fn broadcast_topic(&self, topic: &str, payload: serde_json::Value) {
        let redis = self.redis.clone();
        let channel = format!("{}{}", TOPIC_CHANNEL_PREFIX, topic);
        tokio::spawn(async move {
            match redis.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let msg = payload.to_string();
                    if let Err(e) = redis::cmd("PUBLISH")
                        .arg(&channel)
                        .arg(&msg)
                        .query_async::<()>(&mut conn)
                        .await
                    {
                        tracing::warn!("Broadcast to {} failed: {}", channel, e);
                    }
                }
                Err(e) => tracing::warn!("Realtime transport unavailable: {}", e),
            }
        });
    }

    /// 紧急联系人级联：对每个 notify_on_sos 的联系人走短信渠道，
    /// 与地理扇出互相独立，失败互不影响。无联系人是正常情况。
    pub fn cascade_contacts(&self, contacts: Vec<CascadeContact>, message: String) {
        for contact in contacts {
            match self.sms.clone() {
                Some(sms) => {
                    let msg = message.clone();
                    tokio::spawn(async move {
                        if let Err(e) = sms.send(&contact.contact_phone, &msg).await {
                            tracing::warn!(
                                "SMS to emergency contact {} failed: {}",
                                contact.contact_name,
                                e
                            );
                        }
                    });
                }
                None => {
                    tracing::info!(
                        "SMS relay not configured, would notify emergency contact {} at {}",
                        contact.contact_name,
                        contact.contact_phone
                    );
                }
            }
        }
    }

    // 实时推送派生为后台任务，断连的接收方静默错过，落库记录兜底
    fn push_realtime(&self, user_id: &str, record: &Notification) {
        let redis = self.redis.clone();
        let channel = format!("{}{}", USER_CHANNEL_PREFIX, user_id);
        let payload = match serde_json::to_string(record) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Failed to encode notification payload: {}", e);
                return;
            }
        };
        tokio::spawn(async move {
            match redis.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    if let Err(e) = redis::cmd("PUBLISH")
                        .arg(&channel)
                        .arg(&payload)
                        .query_async::<()>(&mut conn)
                        .await
                    {
                        tracing::warn!("Realtime push to {} failed: {}", channel, e);
                    }
                }
                Err(e) => tracing::warn!("Realtime transport unavailable: {}", e),
            }
        });
    }
}

/// 级联通知需要的联系人信息
#[derive(Debug, Clone)]
pub struct CascadeContact {
    pub contact_name: String,
    pub contact_phone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_mapping_is_total_and_deterministic() {
        for category in Category::ALL {
            let first = priority_for(category);
            let second = priority_for(category);
            assert_eq!(first, second);
        }
        assert_eq!(priority_for(Category::SosAlert), Priority::Critical);
        assert_eq!(priority_for(Category::BloodRequest), Priority::High);
        assert_eq!(priority_for(Category::HelpRequest), Priority::Medium);
        assert_eq!(priority_for(Category::MissingPerson), Priority::Low);
        assert_eq!(priority_for(Category::System), Priority::Low);
        assert_eq!(priority_for(Category::Reminder), Priority::Low);
    }

    #[test]
    fn email_channel_only_for_high_and_critical() {
        assert!(wants_email(priority_for(Category::SosAlert)));
        assert!(wants_email(priority_for(Category::BloodRequest)));
        assert!(!wants_email(priority_for(Category::HelpRequest)));
        assert!(!wants_email(priority_for(Category::Reminder)));
    }

    #[test]
    fn category_strings_round_trip() {
        for category in Category::ALL {
            let s = category.to_string();
            assert_eq!(s.parse::<Category>().unwrap(), category);
        }
        assert!("SOS".parse::<Category>().is_err());
    }

    #[test]
    fn priority_ordering_matches_severity() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }
}
