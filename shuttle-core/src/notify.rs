use async_trait::async_trait;
use shuttle_shared::PlatformEvent;

/// Sink for post-commit notifications (push, live tracking).
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn publish(
        &self,
        event: &PlatformEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Notifier that discards everything; used when no broker is configured.
pub struct NoopNotifier;

#[async_trait]
impl EventNotifier for NoopNotifier {
    async fn publish(
        &self,
        event: &PlatformEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(topic = event.topic(), "event dropped, no notifier configured");
        Ok(())
    }
}
