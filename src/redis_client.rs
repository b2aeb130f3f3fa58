use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};
use std::time::Duration;

use crate::kv::{CacheStore, CoordinationStore, KvError};

const COMPARE_AND_DELETE: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

const COMPARE_AND_PEXPIRE: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("PEXPIRE", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(RedisClient { conn })
    }
}

#[async_trait]
impl CoordinationStore for RedisClient {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();

        // SET NX PX - one round trip, no window between set and expire
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn expire_if_equals(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let extended: i64 = Script::new(COMPARE_AND_PEXPIRE)
            .key(key)
            .arg(value)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }
}

#[async_trait]
impl CacheStore for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, value, millis(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(10)), 10_000);
    }
}
