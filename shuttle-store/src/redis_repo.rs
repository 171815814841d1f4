use redis::{AsyncCommands, RedisResult};
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns true while `key` is within `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }

    /// PUBLISH to a channel; returns the number of subscribers that received it.
    pub async fn publish(&self, channel: &str, payload: &str) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!(channel, receivers, "published");
        Ok(receivers)
    }
}
