use config::Config;
use notify::Notifier;
use redis::Client as RedisClient;
use sqlx::PgPool;
use std::sync::Arc;

pub mod config;
pub mod geo;
pub mod geocode;
pub mod lifecycle;
pub mod matching;
pub mod middleware;
pub mod notify;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub notifier: Notifier,
}
