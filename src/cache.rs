//! Redis cache for the public food list.
//!
//! The list is read on every page load and changes only on food or review
//! writes, so it is stored whole under one key as bincode and dropped on
//! every write. Any cache failure falls through to the store.

use std::ops::DerefMut;
use std::time::Duration;

use log::{debug, warn};
use r2d2_redis::r2d2;
use r2d2_redis::redis::{Commands, RedisError};
use r2d2_redis::RedisConnectionManager;
use thiserror::Error;

use crate::models::Food;

pub type RedisPool = r2d2::Pool<RedisConnectionManager>;

const CACHE_POOL_MAX_OPEN: u32 = 16;
const CACHE_POOL_MIN_IDLE: u32 = 8;
const CACHE_POOL_EXPIRE_SECONDS: u64 = 60;

const GET_ALL_FOOD_KEY: &str = "foods:all";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("redis pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[derive(Clone)]
pub struct FoodCache {
    pool: Option<RedisPool>,
    ttl_seconds: usize,
}

impl FoodCache {
    pub fn disabled() -> Self {
        Self {
            pool: None,
            ttl_seconds: 0,
        }
    }

    pub fn connect(redis_url: &str, ttl_seconds: usize) -> Result<Self, CacheError> {
        let manager = RedisConnectionManager::new(redis_url)?;
        let pool = r2d2::Pool::builder()
            .max_size(CACHE_POOL_MAX_OPEN)
            .max_lifetime(Some(Duration::from_secs(CACHE_POOL_EXPIRE_SECONDS)))
            .min_idle(Some(CACHE_POOL_MIN_IDLE))
            .build(manager)?;
        Ok(Self {
            pool: Some(pool),
            ttl_seconds,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Cached food list, or `None` on a miss or any cache failure.
    pub fn get_foods(&self) -> Option<Vec<Food>> {
        let pool = self.pool.as_ref()?;
        let mut redis_conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("redis unavailable, reading foods from the store: {e}");
                return None;
            }
        };

        let cached: Result<Option<Vec<u8>>, RedisError> =
            redis_conn.deref_mut().get(GET_ALL_FOOD_KEY);
        match cached {
            Ok(Some(bytes)) if !bytes.is_empty() => match Food::list_from_u8(&bytes) {
                Ok(foods) => Some(foods),
                Err(e) => {
                    warn!("discarding undecodable food cache entry: {e}");
                    self.invalidate();
                    None
                }
            },
            Ok(_) => {
                debug!("food cache miss");
                None
            }
            Err(e) => {
                warn!("redis read failed: {e}");
                None
            }
        }
    }

    pub fn put_foods(&self, foods: &[Food]) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let value = match Food::list_to_u8(foods) {
            Ok(value) => value,
            Err(e) => {
                warn!("could not encode food list for caching: {e}");
                return;
            }
        };

        let stored = pool.get().map_err(CacheError::from).and_then(|mut redis_conn| {
            redis_conn
                .deref_mut()
                .set_ex::<_, _, ()>(GET_ALL_FOOD_KEY, value, self.ttl_seconds)
                .map_err(CacheError::from)
        });
        if let Err(e) = stored {
            warn!("redis write failed: {e}");
        }
    }

    pub fn invalidate(&self) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let removed = pool.get().map_err(CacheError::from).and_then(|mut redis_conn| {
            redis_conn
                .deref_mut()
                .del::<_, ()>(GET_ALL_FOOD_KEY)
                .map_err(CacheError::from)
        });
        if let Err(e) = removed {
            // entries still expire after ttl_seconds
            warn!("redis invalidation failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_cache_always_misses() {
        let cache = FoodCache::disabled();
        assert!(!cache.is_enabled());
        cache.put_foods(&[]);
        assert!(cache.get_foods().is_none());
        cache.invalidate();
    }

    #[test]
    fn test_connect_rejects_malformed_url() {
        assert!(FoodCache::connect("not a redis url", 60).is_err());
    }
}
