use deadpool_redis::redis::{AsyncCommands, RedisError};
use deadpool_redis::{Connection, Pool};

use crate::domain::repository::EphemeralStore;
use crate::error::StoreError;

/// [`EphemeralStore`] over a deadpool Redis pool.
///
/// Every operation maps to a single Redis command so counters stay atomic across replicas.
#[derive(Clone)]
pub struct RedisStore {
    pub pool: Pool,
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

impl RedisStore {
    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(unavailable)
    }

    /// `SET key value EX ttl NX|XX`; the reply is `OK` when written and nil otherwise.
    async fn set_if(&self, key: &str, value: &str, ttl_secs: u64, cond: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = deadpool_redis::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .arg(cond)
            .query_async(&mut conn)
            .await
            .map_err(|e: RedisError| unavailable(e))?;
        Ok(reply.is_some())
    }

    /// Round-trip used by the readiness probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e: RedisError| unavailable(e))?;
        Ok(())
    }
}

impl EphemeralStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(|e: RedisError| unavailable(e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let (): () = conn
            .set_ex(key, value, ttl_secs.max(1))
            .await
            .map_err(|e: RedisError| unavailable(e))?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        self.set_if(key, value, ttl_secs, "NX").await
    }

    async fn set_xx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        self.set_if(key, value, ttl_secs, "XX").await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.incr(key, 1_i64)
            .await
            .map_err(|e: RedisError| unavailable(e))
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.decr(key, 1_i64)
            .await
            .map_err(|e: RedisError| unavailable(e))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        conn.expire(key, secs)
            .await
            .map_err(|e: RedisError| unavailable(e))
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn().await?;
        // -2 = missing key, -1 = no expiry
        let secs: i64 = conn
            .ttl(key)
            .await
            .map_err(|e: RedisError| unavailable(e))?;
        Ok(u64::try_from(secs).ok())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await.map_err(|e: RedisError| unavailable(e))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.exists(key)
            .await
            .map_err(|e: RedisError| unavailable(e))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .sadd(key, member)
            .await
            .map_err(|e: RedisError| unavailable(e))?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .srem(key, member)
            .await
            .map_err(|e: RedisError| unavailable(e))?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.smembers(key)
            .await
            .map_err(|e: RedisError| unavailable(e))
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        conn.scard(key)
            .await
            .map_err(|e: RedisError| unavailable(e))
    }

    async fn lpush_trim(&self, key: &str, value: &str, keep: usize) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let stop = isize::try_from(keep).unwrap_or(isize::MAX).saturating_sub(1);
        let (): () = deadpool_redis::redis::pipe()
            .atomic()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, stop)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e: RedisError| unavailable(e))?;
        Ok(())
    }

    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let stop = isize::try_from(count).unwrap_or(isize::MAX) - 1;
        conn.lrange(key, 0, stop)
            .await
            .map_err(|e: RedisError| unavailable(e))
    }
}
