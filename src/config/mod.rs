use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    /// 附近查询的最大搜索半径（公里），请求超过该值时截断
    pub max_search_radius_km: f64,
    /// SOS 告警向周边用户广播的半径（公里）
    pub sos_notify_radius_km: f64,
    /// 反向地理编码服务地址，未配置时直接降级为坐标文本
    pub geocode_url: Option<String>,
    pub geocode_timeout_secs: u64,
    /// 邮件中继地址，未配置时高优先级通知只写应用内记录
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    /// 短信中继地址，未配置时紧急联系人级联只记录日志
    pub sms_relay_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")?
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            max_search_radius_km: env::var("MAX_SEARCH_RADIUS_KM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(25.0),
            sos_notify_radius_km: env::var("SOS_NOTIFY_RADIUS_KM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5.0),
            geocode_url: env::var("GEOCODE_URL").ok().filter(|v| !v.is_empty()),
            geocode_timeout_secs: env::var("GEOCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            mail_relay_url: env::var("MAIL_RELAY_URL").ok().filter(|v| !v.is_empty()),
            mail_from: env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@safenet.local".into()),
            sms_relay_url: env::var("SMS_RELAY_URL").ok().filter(|v| !v.is_empty()),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }
}
