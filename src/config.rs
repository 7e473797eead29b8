use std::{env, fmt::Display, str::FromStr, time::Duration};

use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::error::{CacheError, QueryError};

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    pub media_root: String,
    pub media_url: String,
    pub jwt_secret: String,
    pub database_max_connections: u32,
    pub database_acquire_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: String,
    pub info: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid {} value: {}", self.key, self.info)
    }
}

impl std::error::Error for ConfigError {}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_url: try_load(&lookup, "DATABASE_URL", "postgres://localhost/foodgram")?,
            redis_url: try_load(&lookup, "REDIS_URL", "redis://127.0.0.1/")?,
            media_root: try_load(&lookup, "MEDIA_ROOT", "media")?,
            media_url: try_load(&lookup, "MEDIA_URL", "/media/")?,
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            database_acquire_timeout: Duration::from_secs(try_load(
                &lookup,
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                "5",
            )?),
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            log::warn!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError {
            key: key.to_string(),
            info: e.to_string(),
        })
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError {
            key: key.to_string(),
            info: String::from("not set"),
        })
}

pub async fn connect_database(settings: &Settings) -> Result<Pool<Postgres>, potion::Error> {
    PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .acquire_timeout(settings.database_acquire_timeout)
        .connect(&settings.database_url)
        .await
        .map_err(|e| QueryError::from(e).into())
}

pub async fn connect_cache(settings: &Settings) -> Result<MultiplexedConnection, potion::Error> {
    let client = redis::Client::open(settings.redis_url.as_str())
        .map_err(|e| CacheError::from(e).into())?;

    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| CacheError::from(e).into())
}

pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), potion::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| QueryError::from(sqlx::Error::from(e)).into())
}
