use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// Caching - keys

/// Every catalog value is stored together with the bind current at write
/// time; bumping the bind invalidates all of them at once.
pub const CATALOG_BIND_KEY: &str = "catalog-cache-key";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tags,
    Ingredients,
}

impl CacheKeyType {
    pub fn new<T: ToString>(self, key: T) -> CacheKey {
        CacheKey {
            _value: key.to_string(),
            _type: self,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    _value: String,
    _type: CacheKeyType,
}

impl CacheKey {
    pub fn to_string(&self) -> String {
        self.into()
    }
}

impl Into<String> for &CacheKey {
    fn into(self) -> String {
        match self._type {
            CacheKeyType::Tags => format!("catalog-tags-{}", self._value),
            CacheKeyType::Ingredients => format!("catalog-ingredients-{}", self._value.to_lowercase()),
        }
    }
}

// Cache - wrappers

#[derive(Serialize, serde::Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct RedisValue<T: serde::Serialize + Send + Sync + Clone> {
    pub value: T,
    _bind: Option<String>,
}

impl<T> RedisValue<T>
where
    T: serde::Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>,
{
    /// Returns the cached value when its bind is still current, otherwise
    /// runs `callback` and stores the result. Cache failures are logged and
    /// fall through to `callback`.
    pub async fn get_or<F, Fut>(
        key: CacheKey,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<T, potion::Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, potion::Error>>,
    {
        let bind = match get_cache_value::<&str, String>(CATALOG_BIND_KEY, cache).await {
            Ok(bind) => bind,
            Err(e) => {
                log::error!("> Cache unavailable, reading {} from database: {e:?}", key.to_string());
                return callback().await;
            }
        };

        match get_cache_value::<String, RedisValue<T>>((&key).into(), cache).await {
            Ok(Some(cached)) if cached._bind == bind => {
                log::trace!("> Found {}", key.to_string());
                return Ok(cached.value);
            }
            Ok(Some(_)) => log::trace!("> Invalidated {}", key.to_string()),
            Ok(None) => {}
            Err(e) => {
                log::error!("> Failed to read cached value {}: {e:?}", key.to_string());
                if let Err(e) = delete_cache_value(key.to_string(), cache).await {
                    log::error!("> Failed to delete cached value! {e:?}");
                }
            }
        }

        log::trace!("> Fetching {}", key.to_string());
        let value = callback().await?;

        let cached = RedisValue {
            value: value.clone(),
            _bind: bind,
        };
        if let Err(e) = set_cache_value::<String, RedisValue<T>>((&key).into(), cached, cache).await {
            log::error!("> Failed to cache {}: {e:?}", key.to_string());
        }

        Ok(value)
    }
}

pub async fn invalidate_catalog(cache: &mut MultiplexedConnection) -> Result<(), potion::Error> {
    let bind: i64 = cache
        .incr(CATALOG_BIND_KEY, 1)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    log::trace!("> Catalog cache bind is now {bind}");

    Ok(())
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .set(key, value)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .del(key)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, potion::Error> {
    let value: Option<V> = cache
        .get(key)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_catalog() {
        assert_eq!(CacheKeyType::Tags.new("all").to_string(), "catalog-tags-all");
        assert_eq!(
            CacheKeyType::Ingredients.new("Fl").to_string(),
            "catalog-ingredients-fl"
        );
    }
}
