use async_trait::async_trait;
use shuttle_core::notify::EventNotifier;
use shuttle_shared::PlatformEvent;
use tokio::sync::broadcast;
use tracing::info;

use crate::redis_repo::RedisClient;

type PublishResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Publishes post-commit events on Redis channels named after the event topic,
/// e.g. `shuttle.booking.confirmed`.
#[derive(Clone)]
pub struct RedisEventPublisher {
    redis: RedisClient,
    channel_prefix: String,
}

impl RedisEventPublisher {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis, channel_prefix: "shuttle".to_string() }
    }

    pub fn channel(&self, event: &PlatformEvent) -> String {
        format!("{}.{}", self.channel_prefix, event.topic())
    }
}

#[async_trait]
impl EventNotifier for RedisEventPublisher {
    async fn publish(&self, event: &PlatformEvent) -> PublishResult {
        let channel = self.channel(event);
        let payload = serde_json::to_string(event)?;
        let receivers = self.redis.publish(&channel, &payload).await?;
        info!(channel = %channel, trip_id = %event.trip_id(), receivers, "event published");
        Ok(())
    }
}

/// In-process fan-out of events; subscribers get every event sent after they
/// subscribed.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<PlatformEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventNotifier for BroadcastNotifier {
    async fn publish(&self, event: &PlatformEvent) -> PublishResult {
        // No receivers is not an error.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
