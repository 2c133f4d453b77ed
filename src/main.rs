use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use backend::{
    AppState,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    notify::{MailRelay, Notifier, SmsRelay},
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'safenet_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 设置通知分发器，各渠道按配置可选
    let mailer = config
        .mail_relay_url
        .clone()
        .map(|url| MailRelay::new(url, config.mail_from.clone()));
    if mailer.is_none() {
        tracing::warn!("MAIL_RELAY_URL not set, email channel disabled");
    }
    let sms = config.sms_relay_url.clone().map(SmsRelay::new);
    if sms.is_none() {
        tracing::warn!("SMS_RELAY_URL not set, emergency contact SMS disabled");
    }
    let notifier = Notifier::new(pool.clone(), redis_arc.clone(), mailer, sms);

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        notifier,
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 周期清理过期未读通知
    {
        let pool = state.pool.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(600));
            loop {
                ticker.tick().await;
                match routes::notification::Inbox::sweep_expired(&pool).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Swept {} expired notifications", n),
                    Err(e) => tracing::error!("Notification sweep failed: {}", e),
                }
            }
        });
    }

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login));

    let protected_routes = Router::new()
        // 用户路由
        .route("/users/profile", get(routes::user::profile))
        .route("/users/location", put(routes::user::update_location))
        // 紧急联系人路由
        .route("/contacts", post(routes::contact::add_contact))
        .route("/contacts", get(routes::contact::list_contacts))
        .route(
            "/contacts/{contact_id}",
            put(routes::contact::update_contact),
        )
        .route(
            "/contacts/{contact_id}",
            delete(routes::contact::delete_contact),
        )
        // SOS 告警路由
        .route("/alerts", post(routes::alert::create_alert))
        .route("/alerts/respond", post(routes::alert::respond_to_alert))
        .route(
            "/alerts/{alert_id}/resolve",
            put(routes::alert::resolve_alert),
        )
        .route(
            "/alerts/{alert_id}/false-alarm",
            put(routes::alert::mark_false_alarm),
        )
        .route("/alerts/active", get(routes::alert::get_active_alerts))
        .route("/alerts/nearby", get(routes::alert::get_nearby_alerts))
        .route("/alerts/mine", get(routes::alert::get_my_alerts))
        // 献血路由
        .route("/blood/donors", post(routes::blood::register_donor))
        .route("/blood/donors/me", get(routes::blood::get_my_donor_profile))
        .route(
            "/blood/donors/{donor_id}/availability",
            put(routes::blood::update_donor_availability),
        )
        .route(
            "/blood/donors/by-type/{blood_type}",
            get(routes::blood::get_available_donors),
        )
        .route(
            "/blood/donors/emergency",
            get(routes::blood::get_emergency_donors_near),
        )
        .route("/blood/requests", post(routes::blood::create_blood_request))
        .route(
            "/blood/requests/{request_id}/status",
            put(routes::blood::update_blood_request_status),
        )
        .route(
            "/blood/requests/active",
            get(routes::blood::get_active_blood_requests),
        )
        .route(
            "/blood/requests/critical",
            get(routes::blood::get_critical_blood_requests),
        )
        // 志愿者路由
        .route("/volunteers", post(routes::volunteer::register_volunteer))
        .route(
            "/volunteers/me",
            get(routes::volunteer::get_my_volunteer_profile),
        )
        .route(
            "/volunteers/{volunteer_id}/verify",
            put(routes::volunteer::verify_volunteer),
        )
        .route(
            "/volunteers/{volunteer_id}/reject",
            put(routes::volunteer::reject_volunteer),
        )
        .route(
            "/volunteers/{volunteer_id}/availability",
            put(routes::volunteer::update_volunteer_availability),
        )
        .route(
            "/volunteers/by-skills",
            get(routes::volunteer::get_volunteers_by_skills),
        )
        .route(
            "/volunteers/nearby",
            get(routes::volunteer::get_volunteers_near),
        )
        // 求助路由
        .route("/help/requests", post(routes::help::create_help_request))
        .route(
            "/help/requests/assign",
            post(routes::help::assign_help_request),
        )
        .route(
            "/help/requests/{request_id}/status",
            put(routes::help::update_help_request_status),
        )
        .route(
            "/help/requests/open",
            get(routes::help::get_open_help_requests),
        )
        .route(
            "/help/requests/nearby",
            get(routes::help::get_nearby_help_requests),
        )
        .route(
            "/help/requests/mine",
            get(routes::help::get_my_help_requests),
        )
        .route(
            "/help/assignments/mine",
            get(routes::help::get_my_assignments),
        )
        // 失踪人口路由
        .route("/missing-persons", post(routes::missing::report_case))
        .route(
            "/missing-persons/active",
            get(routes::missing::get_active_cases),
        )
        .route(
            "/missing-persons/nearby",
            get(routes::missing::get_nearby_cases),
        )
        .route(
            "/missing-persons/{case_id}/sightings",
            post(routes::missing::report_sighting),
        )
        .route(
            "/missing-persons/{case_id}/sightings",
            get(routes::missing::get_case_sightings),
        )
        .route(
            "/missing-persons/{case_id}/found",
            put(routes::missing::mark_case_found),
        )
        .route(
            "/missing-persons/{case_id}/close",
            put(routes::missing::close_case),
        )
        // 通知路由
        .route(
            "/notifications",
            get(routes::notification::get_my_notifications),
        )
        .route(
            "/notifications/unread",
            get(routes::notification::get_unread_notifications),
        )
        .route(
            "/notifications/unread/count",
            get(routes::notification::get_unread_count),
        )
        .route(
            "/notifications/{notification_id}/read",
            put(routes::notification::mark_notification_read),
        )
        .route(
            "/notifications/read-all",
            put(routes::notification::mark_all_notifications_read),
        )
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        let cors = CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
